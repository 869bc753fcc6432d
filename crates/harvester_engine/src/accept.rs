use std::sync::{Mutex, MutexGuard, PoisonError};

use engine_logging::engine_error;
use harvester_core::{DedupPipeline, RawRecord, Rejection};

use crate::RecordWriter;

/// What became of one page's raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub accepted: u64,
    pub rejected: Vec<Rejection>,
    /// Records that passed dedup but could not be stored.
    pub write_failures: u64,
}

/// The run-wide seen-set and the storage writer behind one lock, so acceptance
/// order is write order and a hash is only kept once its record is stored.
pub struct AcceptStage {
    inner: Mutex<Inner>,
}

struct Inner {
    dedup: DedupPipeline,
    writer: Box<dyn RecordWriter>,
}

impl AcceptStage {
    pub fn new(dedup: DedupPipeline, writer: Box<dyn RecordWriter>) -> Self {
        Self {
            inner: Mutex::new(Inner { dedup, writer }),
        }
    }

    pub fn accept(&self, records: &[RawRecord]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut inner = self.lock();
        let Inner { dedup, writer } = &mut *inner;
        for raw in records {
            let record = match dedup.process(raw) {
                Ok(record) => record,
                Err(reason) => {
                    outcome.rejected.push(reason);
                    continue;
                }
            };
            match writer.write(&record) {
                Ok(()) => outcome.accepted += 1,
                Err(err) => {
                    engine_error!("record {} not stored: {err}", record.content_hash);
                    dedup.forget(&record.content_hash);
                    outcome.write_failures += 1;
                }
            }
        }
        outcome
    }

    /// Hashes currently in the seen-set.
    pub fn seen_count(&self) -> usize {
        self.lock().dedup.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
