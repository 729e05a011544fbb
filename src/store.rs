use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use log::{debug, error, info, trace, warn};
use tokio::sync::watch;

use crate::{
    IdGenerator, Note, NoteBackend, NoteDraft, NoteWriter, PersistenceStatus, Result,
    RetryPolicy, Snapshot, WritePolicy,
};

/// How snapshots reach the backend.
enum Persistence {
    WriteThrough {
        backend: Arc<dyn NoteBackend>,
        status: PersistenceStatus,
    },
    WriteBehind(NoteWriter),
}

/// Owns the canonical, insertion-ordered collection of notes.
///
/// Every mutation publishes a new [`Snapshot`] to subscribers and hands it to
/// the persistence layer. A failed write never fails the mutation; it shows up
/// in [`NoteStore::persistence_status`] and in [`NoteStore::flush`].
pub struct NoteStore {
    /// The collection, in insertion order
    notes: Vec<Note>,

    ids: IdGenerator,

    revision: u64,

    /// Latest snapshot, for subscribers
    changes: watch::Sender<Snapshot>,

    persistence: Persistence,
}

impl NoteStore {
    /// Loads the collection from `backend` and starts persistence.
    ///
    /// A missing or unreadable collection starts the store empty. The
    /// write-behind policy spawns a task and must be called inside a tokio
    /// runtime.
    pub fn open(backend: Arc<dyn NoteBackend>, policy: WritePolicy, retry: RetryPolicy) -> Self {
        let notes = load_collection(backend.as_ref());
        info!(
            "Opened note store with {} notes ({:?})",
            notes.len(),
            policy
        );

        let persistence = match policy {
            WritePolicy::WriteThrough => Persistence::WriteThrough {
                backend,
                status: PersistenceStatus::default(),
            },
            WritePolicy::WriteBehind => {
                Persistence::WriteBehind(NoteWriter::spawn(backend, retry))
            }
        };

        let (changes, _) = watch::channel(Snapshot {
            revision: 0,
            notes: Arc::new(notes.clone()),
        });

        Self {
            notes,
            ids: IdGenerator::new(),
            revision: 0,
            changes,
            persistence,
        }
    }

    /// Adds a note built from `draft` and returns it.
    pub fn create(&mut self, draft: NoteDraft) -> Note {
        let now = Utc::now();
        let mut id = self.ids.next_id(now);
        while self.contains(&id) {
            trace!("Id {} already taken", id);
            id = self.ids.next_id(now);
        }

        let note = Note::from_draft(id, draft, now);
        info!("Creating note: {}", note.id);
        self.notes.push(note.clone());
        self.publish();
        note
    }

    /// Replaces title, content and tags of the note with the same id.
    ///
    /// `id` and `created_at` of the stored note are kept whatever `note`
    /// carries. Returns false, changing nothing, if the id is unknown.
    pub fn update(&mut self, note: Note) -> bool {
        let Some(existing) = self.notes.iter_mut().find(|n| n.id == note.id) else {
            debug!("Update ignored, note not found: {}", note.id);
            return false;
        };

        existing.title = note.title;
        existing.content = note.content;
        existing.tags = note.tags;
        existing.updated_at = Utc::now().max(existing.updated_at);

        info!("Updated note: {}", existing.id);
        self.publish();
        true
    }

    /// Removes the note with this id. Returns false if there was none.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != id);
        if self.notes.len() == before {
            debug!("Delete ignored, note not found: {}", id);
            return false;
        }

        info!("Deleted note: {}", id);
        self.publish();
        true
    }

    /// All notes in insertion order.
    pub fn list(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Notes carrying exactly this tag, in insertion order.
    pub fn find_by_tag(&self, tag: &str) -> Vec<&Note> {
        self.notes.iter().filter(|note| note.has_tag(tag)).collect()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> Snapshot {
        self.changes.borrow().clone()
    }

    /// Receives the latest snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.changes.subscribe()
    }

    pub fn write_policy(&self) -> WritePolicy {
        match self.persistence {
            Persistence::WriteThrough { .. } => WritePolicy::WriteThrough,
            Persistence::WriteBehind(_) => WritePolicy::WriteBehind,
        }
    }

    pub fn persistence_status(&self) -> PersistenceStatus {
        match &self.persistence {
            Persistence::WriteThrough { status, .. } => status.clone(),
            Persistence::WriteBehind(writer) => writer.status(),
        }
    }

    /// Makes the latest snapshot durable, retrying a failed write once more.
    pub async fn flush(&mut self) -> Result<()> {
        let snapshot = self.snapshot();
        match &mut self.persistence {
            Persistence::WriteThrough { backend, status } => {
                if !status.is_dirty() {
                    return Ok(());
                }
                let result = backend.save(&snapshot.notes);
                record_write(status, snapshot.revision, &result);
                result
            }
            Persistence::WriteBehind(writer) => writer.flush().await,
        }
    }

    /// Flushes and stops the background writer, if any.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down note store at revision {}", self.revision);
        if let Persistence::WriteBehind(writer) = &mut self.persistence {
            return writer.stop().await;
        }
        self.flush().await
    }

    fn publish(&mut self) {
        self.revision += 1;
        let snapshot = Snapshot {
            revision: self.revision,
            notes: Arc::new(self.notes.clone()),
        };
        self.changes.send_replace(snapshot.clone());

        match &mut self.persistence {
            Persistence::WriteThrough { backend, status } => {
                status.mark_pending(snapshot.revision);
                let result = backend.save(&snapshot.notes);
                record_write(status, snapshot.revision, &result);
            }
            Persistence::WriteBehind(writer) => writer.submit(snapshot),
        }
    }
}

fn record_write(status: &mut PersistenceStatus, revision: u64, result: &Result<()>) {
    match result {
        Ok(()) => {
            trace!("Revision {} written", revision);
            status.mark_saved(revision);
        }
        Err(e) => {
            warn!("Failed to save revision {}: {}", revision, e);
            status.mark_failed(e.to_string());
        }
    }
}

/// Reads the stored collection, falling back to empty on any failure.
fn load_collection(backend: &dyn NoteBackend) -> Vec<Note> {
    let notes = match backend.load() {
        Ok(Some(notes)) => notes,
        Ok(None) => {
            debug!("No stored notes, starting empty");
            return Vec::new();
        }
        Err(e) => {
            error!("Failed to load notes, starting empty: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::with_capacity(notes.len());
    let mut unique = Vec::with_capacity(notes.len());
    for note in notes {
        if seen.insert(note.id.clone()) {
            unique.push(note);
        } else {
            warn!("Dropping stored note with duplicate id: {}", note.id);
        }
    }
    unique
}
