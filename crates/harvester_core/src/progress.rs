use std::collections::BTreeMap;
use std::time::Duration;

use crate::{Rejection, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStats {
    pub enqueued: usize,
    pub skipped: usize,
}

/// Counters accumulated during one session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressCounters {
    pub targets_completed: u64,
    pub targets_failed: u64,
    pub targets_exhausted: u64,
    pub targets_interrupted: u64,
    pub records_accepted: u64,
    pub rejected: BTreeMap<Rejection, u64>,
}

impl ProgressCounters {
    pub fn records_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: Rejection) -> u64 {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn targets_finished(&self) -> u64 {
        self.targets_completed + self.targets_failed + self.targets_exhausted
    }
}

/// What the progress sink receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub session: SessionState,
    pub targets_total: usize,
    pub targets_pending: usize,
    pub targets_in_progress: usize,
    pub counters: ProgressCounters,
    /// Accepted records including earlier sessions of the same logical run.
    pub total_harvested: u64,
    pub current_delay: Duration,
    pub governor_failures: u32,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn records_per_target(&self) -> f64 {
        let finished = self.counters.targets_finished().max(1);
        self.counters.records_accepted as f64 / finished as f64
    }
}
