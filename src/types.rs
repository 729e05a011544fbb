//! Shared data structures for the hashnotes application.
//!
//! This module contains the result alias, the snapshot and status types the
//! store publishes, and the command-line subcommands.
use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use clap::Subcommand;

use crate::{Note, NoteError};

/// A specialized Result type for hashnotes operations.
pub type Result<T> = std::result::Result<T, NoteError>;

/// An immutable view of the collection at one revision.
///
/// Snapshots are shared between subscribers and the persistence layer, so
/// cloning one never copies the notes.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Incremented by every mutation; 0 is the state loaded at startup
    pub revision: u64,
    pub notes: Arc<Vec<Note>>,
}

/// Where the persisted copy stands relative to the in-memory collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistenceStatus {
    /// Latest revision known to be durable
    pub saved_revision: u64,
    /// Latest revision handed to the persistence layer
    pub pending_revision: u64,
    /// Message of the most recent failed write, cleared on success
    pub last_error: Option<String>,
    /// Consecutive failed writes
    pub failed_attempts: u32,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl PersistenceStatus {
    /// True while the in-memory collection is ahead of storage.
    pub fn is_dirty(&self) -> bool {
        self.saved_revision < self.pending_revision
    }

    pub(crate) fn mark_pending(&mut self, revision: u64) {
        self.pending_revision = self.pending_revision.max(revision);
    }

    pub(crate) fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = self.saved_revision.max(revision);
        self.last_error = None;
        self.failed_attempts = 0;
        self.last_saved_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, message: String) {
        self.last_error = Some(message);
        self.failed_attempts = self.failed_attempts.saturating_add(1);
    }
}

/// Available subcommands for the hashnotes application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new note
    Create {
        /// Title of the note
        #[clap(short = 'T', long)]
        title: String,

        /// Content of the note
        #[clap(short, long)]
        content: Option<String>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Tags to associate with the note (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Path to a file containing the note's content
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Add a tag naming the current date and time
        #[clap(short, long)]
        stamp: bool,
    },

    /// View a note by ID
    View {
        /// ID of the note to view
        id: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },

    /// List notes, optionally only those carrying a tag
    List {
        /// Filter notes by tag
        #[clap(short, long)]
        tag: Option<String>,

        /// Limit the number of notes returned (0 shows all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,

        /// Only show note IDs and titles
        #[clap(short, long)]
        brief: bool,
    },

    /// Search notes by title, content or tags
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results (0 shows all)
        #[clap(short = 'n', long, default_value_t = 0)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Edit an existing note
    Edit {
        /// ID of the note to edit
        id: String,

        /// New title for the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// New content for the note
        #[clap(short, long)]
        content: Option<String>,

        /// Open content in editor before saving
        #[clap(short, long)]
        edit: bool,

        /// Replace all tags (comma-separated)
        #[clap(short = 't', long)]
        tags: Option<String>,

        /// Tags to add (comma-separated)
        #[clap(short, long)]
        add: Option<String>,

        /// Tags to remove (comma-separated)
        #[clap(short, long)]
        remove: Option<String>,

        /// Path to a file containing the new note content
        #[clap(short, long)]
        file: Option<PathBuf>,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Show tags derived from all notes
    Tags {
        /// Order by number of notes and keep only the most used
        #[clap(short, long)]
        popular: bool,

        /// How many popular tags to show (defaults to the configured limit)
        #[clap(short = 'n', long)]
        limit: Option<usize>,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Update a configuration setting (key=value)
        #[clap(short, long)]
        set: Option<String>,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
