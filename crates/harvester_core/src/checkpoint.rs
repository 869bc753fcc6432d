use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PageState, TargetId};

/// Pacing state of the governor, persisted so a resumed run does not start at full speed
/// against a host that was already pushing back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorState {
    pub current_delay: Duration,
    pub consecutive_failures: u32,
}

impl Default for GovernorState {
    fn default() -> Self {
        Self {
            current_delay: Duration::from_secs(1),
            consecutive_failures: 0,
        }
    }
}

/// Durable snapshot of run progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Targets that completed or were exhausted. Failed targets are left out and
    /// retried by the next run.
    pub completed_target_ids: BTreeSet<TargetId>,
    /// Targets started but not finished, with the page state to resume from.
    pub in_flight: BTreeMap<TargetId, PageState>,
    pub total_harvested: u64,
    pub governor: GovernorState,
    pub written_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn is_completed(&self, target_id: &str) -> bool {
        self.completed_target_ids.contains(target_id)
    }
}
