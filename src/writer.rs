// src/writer.rs - Background writer for the write-behind policy
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, Duration};

use crate::{NoteBackend, NoteError, PersistenceStatus, Result, Snapshot};

/// Backoff between attempts to write a snapshot that failed to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug)]
pub enum WriterCommand {
    /// Persist this snapshot; newer snapshots replace queued older ones
    Save(Snapshot),
    /// Attempt any pending write now and report whether storage is current
    Flush(oneshot::Sender<Result<()>>),
    /// Attempt any pending write, report, then exit
    Stop(oneshot::Sender<Result<()>>),
}

pub struct NoteWriter {
    /// Channel to send commands to the writer task
    command_tx: mpsc::UnboundedSender<WriterCommand>,

    /// Handle to the writer task
    task: Option<JoinHandle<()>>,

    /// Shared with the writer task
    status: Arc<Mutex<PersistenceStatus>>,
}

fn lock_status(status: &Mutex<PersistenceStatus>) -> MutexGuard<'_, PersistenceStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NoteWriter {
    /// Spawns the writer task on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn NoteBackend>, retry: RetryPolicy) -> Self {
        info!("Starting background writer with retry policy: {:?}", retry);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(PersistenceStatus::default()));

        let worker = WriterTask {
            backend,
            status: Arc::clone(&status),
            retry,
            pending: None,
            attempts: 0,
        };
        let task = tokio::spawn(worker.run(command_rx));

        Self {
            command_tx,
            task: Some(task),
            status,
        }
    }

    /// Queues a snapshot without waiting for it to be written.
    pub fn submit(&self, snapshot: Snapshot) {
        let revision = snapshot.revision;
        lock_status(&self.status).mark_pending(revision);

        if self.command_tx.send(WriterCommand::Save(snapshot)).is_err() {
            error!(
                "Background writer has stopped; revision {} will not be saved",
                revision
            );
        }
    }

    /// Waits for queued snapshots to be written.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(WriterCommand::Flush(reply_tx))
            .map_err(|_| NoteError::WriterStopped)?;

        match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(NoteError::WriterStopped),
        }
    }

    pub fn status(&self) -> PersistenceStatus {
        lock_status(&self.status).clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Newest revision that would be lost if the writer were dropped now.
    pub fn unsaved_revision(&self) -> Option<u64> {
        let status = self.status();
        (self.is_running() && status.is_dirty()).then_some(status.pending_revision)
    }

    /// Writes anything pending and stops the writer task.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            debug!("Background writer is not running");
            return Ok(());
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.command_tx.send(WriterCommand::Stop(reply_tx)).is_err() {
            error!("Failed to send stop command to background writer");
        }

        let outcome = match reply_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(NoteError::WriterStopped),
        };

        if let Err(e) = task.await {
            let error_msg = format!("Failed to stop background writer: {}", e);
            error!("{}", error_msg);
            return Err(NoteError::ApplicationError { message: error_msg });
        }

        info!("Background writer stopped");
        outcome
    }
}

// Dropping only closes the channel; the task may be cancelled with the
// runtime before it writes. `flush` or `stop` are the durable paths.
impl Drop for NoteWriter {
    fn drop(&mut self) {
        if let Some(revision) = self.unsaved_revision() {
            warn!(
                "Background writer dropped before revision {} was saved; call stop() first",
                revision
            );
        }
    }
}

struct WriterTask {
    backend: Arc<dyn NoteBackend>,
    status: Arc<Mutex<PersistenceStatus>>,
    retry: RetryPolicy,
    /// Newest snapshot not yet written
    pending: Option<Snapshot>,
    /// Consecutive failures for the pending snapshot
    attempts: u32,
}

impl WriterTask {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<WriterCommand>) {
        loop {
            let command = if self.pending.is_some() {
                let delay = self.retry.delay_for(self.attempts);
                tokio::select! {
                    command = command_rx.recv() => command,
                    _ = time::sleep(delay) => {
                        debug!("Retrying pending write after {:?}", delay);
                        self.write_pending().await;
                        continue;
                    }
                }
            } else {
                command_rx.recv().await
            };

            let Some(command) = command else {
                debug!("Writer channel closed, writing what is pending");
                self.write_pending().await;
                break;
            };

            let mut replies = Vec::new();
            let mut stopping = self.absorb(command, &mut replies);
            while let Ok(command) = command_rx.try_recv() {
                stopping |= self.absorb(command, &mut replies);
            }

            self.write_pending().await;

            for reply in replies {
                // The caller may have given up waiting
                let _ = reply.send(self.outcome());
            }

            if stopping {
                info!("Background writer stopping...");
                break;
            }
        }
    }

    /// Records a command; returns true for `Stop`.
    fn absorb(
        &mut self,
        command: WriterCommand,
        replies: &mut Vec<oneshot::Sender<Result<()>>>,
    ) -> bool {
        match command {
            WriterCommand::Save(snapshot) => {
                let newer = self
                    .pending
                    .as_ref()
                    .map_or(true, |pending| snapshot.revision >= pending.revision);
                if newer {
                    if let Some(replaced) = &self.pending {
                        trace!(
                            "Revision {} supersedes queued revision {}",
                            snapshot.revision,
                            replaced.revision
                        );
                    }
                    self.pending = Some(snapshot);
                    self.attempts = 0;
                }
                false
            }
            WriterCommand::Flush(reply) => {
                replies.push(reply);
                false
            }
            WriterCommand::Stop(reply) => {
                replies.push(reply);
                true
            }
        }
    }

    async fn write_pending(&mut self) {
        let Some(snapshot) = self.pending.take() else {
            return;
        };

        let backend = Arc::clone(&self.backend);
        let notes = Arc::clone(&snapshot.notes);
        let result = match task::spawn_blocking(move || backend.save(&notes)).await {
            Ok(result) => result,
            Err(e) => Err(NoteError::ApplicationError {
                message: format!("Writer task failed: {}", e),
            }),
        };

        match result {
            Ok(()) => {
                debug!("Saved revision {}", snapshot.revision);
                self.attempts = 0;
                lock_status(&self.status).mark_saved(snapshot.revision);
            }
            Err(e) => {
                self.attempts = self.attempts.saturating_add(1);
                warn!(
                    "Failed to save revision {} (attempt {}): {}",
                    snapshot.revision, self.attempts, e
                );
                lock_status(&self.status).mark_failed(e.to_string());
                self.pending = Some(snapshot);
            }
        }
    }

    fn outcome(&self) -> Result<()> {
        if self.pending.is_none() {
            return Ok(());
        }

        let message = lock_status(&self.status)
            .last_error
            .clone()
            .unwrap_or_else(|| "write still pending".to_string());
        Err(NoteError::PersistFailed { message })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::storage::test_support::FlakyBackend;
    use crate::{MemoryBackend, Note};

    fn snapshot(revision: u64, titles: &[&str]) -> Snapshot {
        let now = Utc::now();
        let notes = titles
            .iter()
            .enumerate()
            .map(|(i, title)| Note {
                id: format!("{}-{}", revision, i),
                title: title.to_string(),
                content: String::new(),
                tags: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        Snapshot {
            revision,
            notes: Arc::new(notes),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for(4), Duration::from_millis(500));
        assert_eq!(retry.delay_for(60), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_flush_writes_latest_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());

        writer.submit(snapshot(1, &["one"]));
        writer.submit(snapshot(2, &["one", "two"]));
        assert!(writer.status().is_dirty());

        writer.flush().await.unwrap();

        let saved = backend.load().unwrap().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(writer.status().saved_revision, 2);
        assert!(!writer.status().is_dirty());

        writer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_queued_snapshots_coalesce_into_one_write() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());

        for revision in 1..=50 {
            writer.submit(snapshot(revision, &["note"]));
        }
        writer.submit(snapshot(51, &["last"]));
        writer.flush().await.unwrap();

        // Nothing ran until the flush was awaited, so one write covers all.
        assert_eq!(backend.save_count(), 1);
        let saved = backend.load().unwrap().unwrap();
        assert_eq!(saved[0].title, "last");

        writer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_is_retried() {
        let backend = Arc::new(FlakyBackend::failing(2));
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());

        writer.submit(snapshot(1, &["keep me"]));
        let first = writer.flush().await;
        assert!(matches!(first, Err(NoteError::PersistFailed { .. })));
        assert!(writer.status().is_dirty());
        assert!(writer.status().last_error.is_some());

        for _ in 0..100 {
            if !writer.status().is_dirty() {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }

        writer.flush().await.unwrap();
        assert_eq!(backend.inner.load().unwrap().unwrap()[0].title, "keep me");
        assert_eq!(writer.status().failed_attempts, 0);

        writer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_writes_pending_and_rejects_later_flush() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());

        writer.submit(snapshot(1, &["pending"]));
        writer.stop().await.unwrap();
        assert!(!writer.is_running());

        assert_eq!(backend.save_count(), 1);
        assert!(matches!(
            writer.flush().await,
            Err(NoteError::WriterStopped)
        ));
    }

    #[tokio::test]
    async fn test_stop_reports_unwritten_snapshot() {
        let backend = Arc::new(FlakyBackend::failing(1));
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());

        writer.submit(snapshot(1, &["lost"]));
        assert!(writer.stop().await.is_err());
        assert!(backend.inner.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsaved_revision_tracks_what_drop_would_lose() {
        let backend = Arc::new(MemoryBackend::new());
        let mut writer = NoteWriter::spawn(backend.clone(), fast_retry());
        assert_eq!(writer.unsaved_revision(), None);

        writer.submit(snapshot(1, &["a"]));
        writer.submit(snapshot(2, &["a", "b"]));
        assert_eq!(writer.unsaved_revision(), Some(2));

        writer.flush().await.unwrap();
        assert_eq!(writer.unsaved_revision(), None);

        writer.submit(snapshot(3, &["c"]));
        writer.stop().await.unwrap();
        assert_eq!(writer.unsaved_revision(), None);
    }

    #[test]
    fn test_dropped_writer_does_not_promise_durability() {
        let backend = Arc::new(MemoryBackend::new());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let writer = NoteWriter::spawn(backend.clone(), fast_retry());
            writer.submit(snapshot(1, &["dropped"]));
            assert_eq!(writer.unsaved_revision(), Some(1));
            drop(writer);
        });
        drop(runtime);

        assert!(backend.load().unwrap().is_none());
    }
}
