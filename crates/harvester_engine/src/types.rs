use std::fmt;
use std::sync::mpsc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use harvester_core::{ProgressSnapshot, StructureType, TargetId, TargetOutcome};

/// Decoded page content handed from the fetch capability to the classifier and extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    /// Locator that was requested.
    pub locator: String,
    /// Locator after redirects; relative links resolve against this.
    pub final_url: String,
    pub html: String,
}

impl PageContent {
    pub fn new(locator: impl Into<String>, html: impl Into<String>) -> Self {
        let locator = locator.into();
        Self {
            final_url: locator.clone(),
            locator,
            html: html.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    /// Rate limited, forbidden or served an empty page.
    Blocked,
    NotFound,
    Transport,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::Blocked => write!(f, "blocked"),
            FetchErrorKind::NotFound => write!(f, "not found"),
            FetchErrorKind::Transport => write!(f, "transport error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Run counters changed.
    Progress(ProgressSnapshot),
    TargetStarted {
        target_id: TargetId,
        url: String,
    },
    Classified {
        target_id: TargetId,
        structure: StructureType,
    },
    TargetFinished {
        target_id: TargetId,
        outcome: TargetOutcome,
    },
    CheckpointSaved {
        completed_targets: usize,
        total_harvested: u64,
    },
    /// Checkpoint could not be written after all retries; harvesting continues.
    CheckpointWriteFailure {
        message: String,
    },
    RunAborted {
        consecutive_failures: u32,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log. Progress snapshots go to debug level only.
#[derive(Debug, Default)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(p) => engine_debug!(
                "progress: {}/{} targets finished, {} accepted, {} rejected, delay {:?}",
                p.counters.targets_finished(),
                p.targets_total,
                p.counters.records_accepted,
                p.counters.records_rejected(),
                p.current_delay
            ),
            EngineEvent::TargetStarted { target_id, url } => {
                engine_info!("target {target_id} started: {url}")
            }
            EngineEvent::Classified {
                target_id,
                structure,
            } => engine_debug!("target {target_id} classified as {structure:?}"),
            EngineEvent::TargetFinished { target_id, outcome } => match outcome {
                TargetOutcome::Failed { reason } => {
                    engine_warn!("target {target_id} failed: {reason}")
                }
                TargetOutcome::Exhausted { reason, page } => engine_info!(
                    "target {target_id} done ({reason:?}) after {} cycles",
                    page.cycles
                ),
                TargetOutcome::Interrupted { page } => engine_info!(
                    "target {target_id} interrupted at cycle {}",
                    page.cycles
                ),
            },
            EngineEvent::CheckpointSaved {
                completed_targets,
                total_harvested,
            } => engine_info!(
                "checkpoint saved: {completed_targets} targets done, {total_harvested} records"
            ),
            EngineEvent::CheckpointWriteFailure { message } => {
                engine_error!("checkpoint write failed: {message}")
            }
            EngineEvent::RunAborted {
                consecutive_failures,
            } => engine_error!("run aborted after {consecutive_failures} consecutive failures"),
        }
    }
}
