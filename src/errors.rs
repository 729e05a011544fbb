//! Error types for the hashnotes application.
//!
//! This module defines the error type shared by the store, the persistence
//! backends, the background writer and the command-line front end.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the hashnotes application.
#[derive(Error, Debug)]
pub enum NoteError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored collection could not be understood.
    #[error("Invalid note format: {message}")]
    InvalidFormat { message: String },

    /// The stored collection was written by a newer schema.
    #[error("Unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// The latest snapshot could not be made durable.
    #[error("Persistence failed: {message}")]
    PersistFailed { message: String },

    /// The background writer is no longer running.
    #[error("Background writer has stopped")]
    WriterStopped,

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    #[error("{message}")]
    EditorError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}
