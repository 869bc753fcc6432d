use std::collections::HashSet;

use crate::normalize::normalize;
use crate::{CanonicalRecord, RawRecord, Rejection};

/// Normalization plus the run-wide seen-set of content hashes.
///
/// `process` is a test-and-insert; callers sharing one pipeline between workers
/// must hold exclusive access (the engine keeps it behind a mutex).
#[derive(Debug, Clone, Default)]
pub struct DedupPipeline {
    seen: HashSet<String>,
}

impl DedupPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the seen-set with hashes already flushed to storage by earlier sessions.
    pub fn rehydrate<I>(&mut self, hashes: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen.extend(hashes);
    }

    pub fn process(&mut self, raw: &RawRecord) -> Result<CanonicalRecord, Rejection> {
        let record = normalize(raw)?;
        if !self.seen.insert(record.content_hash.clone()) {
            return Err(Rejection::DuplicateRecord);
        }
        Ok(record)
    }

    /// Drops a hash whose record never reached storage so a later copy can be accepted.
    pub fn forget(&mut self, content_hash: &str) {
        self.seen.remove(content_hash);
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        self.seen.contains(content_hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
