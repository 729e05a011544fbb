//! Hashnotes note-taking library
//!
//! This library keeps a collection of titled notes with hashtags in one local
//! JSON file. Tags are derived from the notes, search is a case-insensitive
//! substring match, and changes are saved either before a mutation returns or
//! by a background writer.

mod cli;
mod config;
mod errors;
mod helper;
mod note;
mod search;
mod storage;
mod store;
mod tags;
mod types;
mod writer;

// Re-export key components
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use note::*;
pub use search::*;
pub use storage::*;
pub use store::*;
pub use tags::*;
pub use types::*;
pub use writer::*;
