use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::CheckpointRecord;
use tokio::sync::Mutex;

use crate::{AtomicFileWriter, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint write failed after {attempts} attempts: {source}")]
    CheckpointWriteFailure {
        attempts: u32,
        #[source]
        source: PersistError,
    },
    #[error("checkpoint could not be serialized: {0}")]
    Serialize(String),
    #[error("checkpoint {path:?} is unreadable: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Reads and writes the run checkpoint as RON next to the harvested records.
#[derive(Debug)]
pub struct CheckpointManager {
    writer: AtomicFileWriter,
    file_name: String,
    retry_attempts: u32,
    retry_base: Duration,
    /// Serializes saves; holds the `written_at` of the newest checkpoint written.
    save_lock: Mutex<Option<DateTime<Utc>>>,
}

impl CheckpointManager {
    pub fn new(dir: PathBuf, file_name: impl Into<String>) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
            file_name: file_name.into(),
            retry_attempts: 3,
            retry_base: Duration::from_millis(100),
            save_lock: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, attempts: u32, base: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_base = base;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.writer.dir().join(&self.file_name)
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Writes `record` atomically. Concurrent callers are serialized; a failed
    /// write is retried with exponential backoff before giving up. A record
    /// older than the last one written is skipped.
    pub async fn save(&self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        let mut last_written = self.save_lock.lock().await;
        self.write_locked(&mut last_written, record).await
    }

    /// Takes the save lock, then builds the record with `snapshot` and writes
    /// it, so a snapshot is never written after a newer one.
    pub async fn save_with(
        &self,
        snapshot: impl FnOnce() -> CheckpointRecord,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let mut last_written = self.save_lock.lock().await;
        let record = snapshot();
        self.write_locked(&mut last_written, &record).await?;
        Ok(record)
    }

    async fn write_locked(
        &self,
        last_written: &mut Option<DateTime<Utc>>,
        record: &CheckpointRecord,
    ) -> Result<(), CheckpointError> {
        if last_written.is_some_and(|last| record.written_at < last) {
            engine_debug!(
                "skipping checkpoint taken at {}; a newer one is already written",
                record.written_at
            );
            return Ok(());
        }
        let content = ron::ser::to_string_pretty(record, ron::ser::PrettyConfig::new())
            .map_err(|err| CheckpointError::Serialize(err.to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.writer.write(&self.file_name, &content) {
                Ok(path) => {
                    engine_debug!(
                        "checkpoint written to {:?} ({} completed, {} in flight)",
                        path,
                        record.completed_target_ids.len(),
                        record.in_flight.len()
                    );
                    *last_written = Some(record.written_at);
                    return Ok(());
                }
                Err(err) if attempt < self.retry_attempts => {
                    let backoff = self.retry_base.saturating_mul(1u32 << (attempt - 1).min(16));
                    engine_warn!(
                        "checkpoint write attempt {attempt} failed: {err}; retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(CheckpointError::CheckpointWriteFailure {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// The last saved checkpoint, `None` when no run has saved one yet.
    pub fn load(&self) -> Result<Option<CheckpointRecord>, CheckpointError> {
        let Some(content) = self.writer.read(&self.file_name)? else {
            return Ok(None);
        };
        let record: CheckpointRecord =
            ron::from_str(&content).map_err(|err| CheckpointError::Corrupt {
                path: self.path(),
                message: err.to_string(),
            })?;
        engine_info!(
            "loaded checkpoint from {:?}: {} targets done, {} in flight, {} records",
            self.path(),
            record.completed_target_ids.len(),
            record.in_flight.len(),
            record.total_harvested
        );
        Ok(Some(record))
    }

    /// Removes the checkpoint so the next run starts from scratch.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        self.writer.remove(&self.file_name)?;
        Ok(())
    }
}
