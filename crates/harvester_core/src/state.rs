use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::progress::{LoadStats, ProgressCounters, ProgressSnapshot};
use crate::{
    CheckpointRecord, GovernorState, PageState, Rejection, Target, TargetId, TargetOutcome,
    TargetStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Stopping,
    Stopped,
    Finished,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Save a checkpoint after this many targets reach a terminal status.
    pub checkpoint_every: u32,
    /// Abort the run after this many consecutive target failures.
    pub max_consecutive_failures: u32,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            checkpoint_every: 20,
            max_consecutive_failures: 10,
        }
    }
}

/// Run-level bookkeeping: which targets remain, which are in flight, what the
/// next checkpoint contains. Mutated only through `update`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunState {
    settings: RunSettings,
    session: SessionState,
    targets: Vec<Target>,
    index: HashMap<TargetId, usize>,
    pending: VecDeque<usize>,
    completed: BTreeSet<TargetId>,
    in_flight: BTreeMap<TargetId, PageState>,
    total_harvested: u64,
    governor: GovernorState,
    consecutive_failures: u32,
    finished_since_checkpoint: u32,
    counters: ProgressCounters,
    last_load: Option<LoadStats>,
    dirty: bool,
}

impl RunState {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn target(&self, target_id: &str) -> Option<&Target> {
        self.index.get(target_id).map(|&i| &self.targets[i])
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_completed(&self, target_id: &str) -> bool {
        self.completed.contains(target_id)
    }

    pub fn in_flight_page(&self, target_id: &str) -> Option<&PageState> {
        self.in_flight.get(target_id)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_load(&self) -> Option<LoadStats> {
        self.last_load
    }

    /// Returns whether anything observable changed since the last call.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn checkpoint_record(&self, written_at: DateTime<Utc>) -> CheckpointRecord {
        CheckpointRecord {
            completed_target_ids: self.completed.clone(),
            in_flight: self.in_flight.clone(),
            total_harvested: self.total_harvested,
            governor: self.governor,
            written_at,
        }
    }

    pub fn progress(&self, elapsed: Duration) -> ProgressSnapshot {
        let in_progress = self
            .targets
            .iter()
            .filter(|t| t.status() == TargetStatus::InProgress)
            .count();
        ProgressSnapshot {
            session: self.session,
            targets_total: self.targets.len(),
            targets_pending: self.pending.len(),
            targets_in_progress: in_progress,
            counters: self.counters.clone(),
            total_harvested: self.total_harvested,
            current_delay: self.governor.current_delay,
            governor_failures: self.governor.consecutive_failures,
            elapsed,
        }
    }

    pub(crate) fn resume_from(&mut self, checkpoint: CheckpointRecord) {
        self.completed = checkpoint.completed_target_ids;
        self.in_flight = checkpoint.in_flight;
        self.total_harvested = checkpoint.total_harvested;
        self.governor = checkpoint.governor;
        self.dirty = true;
    }

    pub(crate) fn load_targets(&mut self, targets: Vec<Target>) -> LoadStats {
        let mut stats = LoadStats::default();
        for target in targets {
            if self.completed.contains(target.id()) || self.index.contains_key(target.id()) {
                stats.skipped += 1;
                continue;
            }
            let position = self.targets.len();
            self.index.insert(target.id().to_string(), position);
            self.targets.push(target);
            self.pending.push_back(position);
            stats.enqueued += 1;
        }
        if self.session == SessionState::Idle {
            // Resume state for targets missing from this run's list.
            let index = &self.index;
            self.in_flight.retain(|id, _| index.contains_key(id));
            if !self.targets.is_empty() {
                self.session = SessionState::Running;
            }
        }
        self.last_load = Some(stats);
        self.dirty = true;
        stats
    }

    /// Pops the next pending target and marks it in progress.
    pub(crate) fn start_next(&mut self) -> Option<(TargetId, String, Option<PageState>)> {
        if self.session != SessionState::Running {
            return None;
        }
        let position = self.pending.pop_front()?;
        let target = &mut self.targets[position];
        target.transition(TargetStatus::InProgress).ok()?;
        let id = target.id().to_string();
        let url = target.url().to_string();
        let resume = self.in_flight.get(&id).cloned();
        self.in_flight.entry(id.clone()).or_default();
        self.dirty = true;
        Some((id, url, resume))
    }

    pub(crate) fn record_page(&mut self, target_id: TargetId, page: PageState) {
        if let Some(slot) = self.in_flight.get_mut(&target_id) {
            *slot = page;
        }
    }

    pub(crate) fn record_batch(&mut self, accepted: u64, rejected: &[Rejection]) {
        self.total_harvested += accepted;
        self.counters.records_accepted += accepted;
        for reason in rejected {
            *self.counters.rejected.entry(*reason).or_default() += 1;
        }
        self.dirty = true;
    }

    /// Applies a target outcome; returns whether a terminal status was reached.
    pub(crate) fn finish_target(&mut self, target_id: &str, outcome: &TargetOutcome) -> bool {
        let Some(&position) = self.index.get(target_id) else {
            return false;
        };
        let target = &mut self.targets[position];
        self.dirty = true;
        match outcome.terminal_status() {
            Some(status) => {
                if target.transition(status).is_err() {
                    return false;
                }
                self.in_flight.remove(target_id);
                // Failed targets stay out of the checkpoint so the next run retries them.
                if status != TargetStatus::Failed {
                    self.completed.insert(target_id.to_string());
                }
                match status {
                    TargetStatus::Failed => {
                        self.counters.targets_failed += 1;
                        self.consecutive_failures += 1;
                    }
                    TargetStatus::Exhausted => {
                        self.counters.targets_exhausted += 1;
                        self.consecutive_failures = 0;
                    }
                    _ => {
                        self.counters.targets_completed += 1;
                        self.consecutive_failures = 0;
                    }
                }
                self.finished_since_checkpoint += 1;
                true
            }
            None => {
                if let TargetOutcome::Interrupted { page } = outcome {
                    self.in_flight.insert(target_id.to_string(), page.clone());
                }
                let _ = target.transition(TargetStatus::Pending);
                self.counters.targets_interrupted += 1;
                false
            }
        }
    }

    pub(crate) fn checkpoint_due(&mut self) -> bool {
        if self.finished_since_checkpoint >= self.settings.checkpoint_every.max(1) {
            self.finished_since_checkpoint = 0;
            true
        } else {
            false
        }
    }

    pub(crate) fn failure_limit_reached(&self) -> bool {
        self.consecutive_failures >= self.settings.max_consecutive_failures.max(1)
    }

    pub(crate) fn set_governor(&mut self, governor: GovernorState) {
        if self.governor != governor {
            self.governor = governor;
            self.dirty = true;
        }
    }

    pub(crate) fn set_session(&mut self, session: SessionState) {
        if self.session != session {
            self.session = session;
            self.dirty = true;
        }
    }
}
