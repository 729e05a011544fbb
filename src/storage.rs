//! Persistence backends for the note collection.
//!
//! The whole collection is stored as one JSON blob:
//!
//! ```text
//! { "version": 1, "notes": [ { "id": ..., "createdAt": ..., ... } ] }
//! ```
//!
//! A bare JSON array is the legacy (version 0) layout and is migrated on load.
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::{normalize_tag, Note, NoteError, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Whole-collection storage.
///
/// `save` must replace the persisted collection atomically from the caller's
/// point of view; partial collections are never written.
pub trait NoteBackend: Send + Sync {
    /// Returns the stored collection, or `None` if nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<Note>>>;

    fn save(&self, notes: &[Note]) -> Result<()>;
}

#[derive(Serialize)]
struct StoredCollection<'a> {
    version: u32,
    notes: &'a [Note],
}

/// A stored record with every field optional, so one bad field does not
/// cost the whole collection.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredNote {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Serializes the collection in the current schema.
pub fn encode_collection(notes: &[Note]) -> Result<String> {
    let stored = StoredCollection {
        version: SCHEMA_VERSION,
        notes,
    };
    Ok(serde_json::to_string_pretty(&stored)?)
}

/// Parses a stored blob, migrating older layouts.
///
/// The blob as a whole must be well formed; individual records that cannot
/// be repaired are skipped with a warning.
pub fn decode_collection(raw: &str) -> Result<Vec<Note>> {
    let value: Value = serde_json::from_str(raw)?;

    let (version, records) = match value {
        Value::Array(records) => (0, records),
        Value::Object(mut map) => {
            let version = map
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| NoteError::InvalidFormat {
                    message: "missing schema version".to_string(),
                })?;

            if version > u64::from(SCHEMA_VERSION) {
                return Err(NoteError::UnsupportedVersion {
                    found: version,
                    supported: SCHEMA_VERSION,
                });
            }

            match map.remove("notes") {
                Some(Value::Array(records)) => (version, records),
                _ => {
                    return Err(NoteError::InvalidFormat {
                        message: "missing notes array".to_string(),
                    })
                }
            }
        }
        _ => {
            return Err(NoteError::InvalidFormat {
                message: "expected an object or an array".to_string(),
            })
        }
    };

    if version < u64::from(SCHEMA_VERSION) {
        info!(
            "Migrating {} stored notes from schema version {} to {}",
            records.len(),
            version,
            SCHEMA_VERSION
        );
    }

    let mut notes = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match decode_record(record, version) {
            Ok(note) => notes.push(note),
            Err(reason) => warn!("Skipping stored note #{}: {}", index, reason),
        }
    }

    trace!("Decoded {} notes", notes.len());
    Ok(notes)
}

fn decode_record(record: Value, version: u64) -> std::result::Result<Note, String> {
    let stored: StoredNote = serde_json::from_value(record).map_err(|e| e.to_string())?;

    if stored.id.trim().is_empty() {
        return Err("missing id".to_string());
    }

    let (created_at, updated_at) = match (stored.created_at, stored.updated_at) {
        (Some(created), Some(updated)) => (created, updated.max(created)),
        (Some(at), None) | (None, Some(at)) => (at, at),
        (None, None) => return Err(format!("note {} has no timestamps", stored.id)),
    };

    // Version 0 kept the `#` marker inside the tag string.
    let tags = if version == 0 {
        stored
            .tags
            .iter()
            .filter_map(|t| normalize_tag(t))
            .collect()
    } else {
        stored.tags
    };

    Ok(Note {
        id: stored.id,
        title: stored.title,
        content: stored.content,
        tags,
        created_at,
        updated_at,
    })
}

/// Stores the collection in a single JSON file.
///
/// A file written by a newer schema is left in place, and this backend then
/// refuses to replace it.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    /// Set when `load` found a newer schema version
    newer_schema: AtomicBool,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            newer_schema: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves an unreadable file out of the way so the next save cannot
    /// overwrite it.
    fn quarantine(&self) -> Option<PathBuf> {
        let file_name = self.path.file_name()?.to_string_lossy().into_owned();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let target = self
            .path
            .with_file_name(format!("{}.corrupt-{}", file_name, timestamp));

        match fs::rename(&self.path, &target) {
            Ok(_) => Some(target),
            Err(e) => {
                error!(
                    "Failed to move unreadable file {} aside: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

impl NoteBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Vec<Note>>> {
        if !self.path.exists() {
            debug!("No notes file at {}", self.path.display());
            return Ok(None);
        }

        debug!("Loading notes from file: {}", self.path.display());
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            error!("Failed to open notes file {}: {}", self.path.display(), e);
            NoteError::Io(e)
        })?;

        match decode_collection(&raw) {
            Ok(notes) => {
                info!("Loaded {} notes from {}", notes.len(), self.path.display());
                Ok(Some(notes))
            }
            Err(e @ NoteError::UnsupportedVersion { .. }) => {
                error!("Notes file {} left untouched: {}", self.path.display(), e);
                self.newer_schema.store(true, Ordering::SeqCst);
                Err(e)
            }
            Err(e) => {
                error!("Notes file {} is unreadable: {}", self.path.display(), e);
                if let Some(moved) = self.quarantine() {
                    warn!("Unreadable notes file kept at {}", moved.display());
                }
                Err(e)
            }
        }
    }

    fn save(&self, notes: &[Note]) -> Result<()> {
        if self.newer_schema.load(Ordering::SeqCst) {
            return Err(NoteError::PersistFailed {
                message: format!(
                    "{} was written by a newer version and is not replaced",
                    self.path.display()
                ),
            });
        }

        debug!("Saving {} notes to {}", notes.len(), self.path.display());

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        if !dir.exists() {
            debug!("Creating parent directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {}", dir.display(), e);
                NoteError::DirectoryError {
                    path: dir.to_path_buf(),
                }
            })?;
        }

        // Create a temporary file in the same directory (for atomic operation)
        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            NoteError::Io(e)
        })?;

        trace!("Serializing notes to JSON");
        let json = encode_collection(notes)?;

        temp_file.write_all(json.as_bytes()).map_err(|e| {
            error!("Failed to write to temporary file: {}", e);
            NoteError::Io(e)
        })?;

        temp_file.flush().map_err(|e| {
            error!("Failed to flush temporary file: {}", e);
            NoteError::Io(e)
        })?;

        temp_file.as_file().sync_all().map_err(|e| {
            error!("Failed to sync temporary file: {}", e);
            NoteError::Io(e)
        })?;

        // Atomically move the temporary file to the target location
        temp_file.persist(&self.path).map_err(|e| {
            error!(
                "Failed to persist file {}: {}",
                self.path.display(),
                e.error
            );
            NoteError::Io(e.error)
        })?;

        debug!("Notes saved to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the encoded blob in memory. Used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an already stored blob, which need not be valid.
    pub fn with_blob(raw: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(raw.into())),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn blob(&self) -> Option<String> {
        match self.blob.lock() {
            Ok(blob) => blob.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl NoteBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Vec<Note>>> {
        match self.blob() {
            Some(raw) => decode_collection(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, notes: &[Note]) -> Result<()> {
        let json = encode_collection(notes)?;
        let mut blob = self
            .blob
            .lock()
            .map_err(|_| NoteError::ApplicationError {
                message: "Failed to acquire lock on in-memory blob".to_string(),
            })?;
        *blob = Some(json);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
