use crate::{CheckpointRecord, GovernorState, PageState, Rejection, Target, TargetId, TargetOutcome};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Restore progress from the last checkpoint. Must precede `TargetsLoaded`.
    Resume(CheckpointRecord),
    /// Targets discovered for this run, in processing order.
    TargetsLoaded(Vec<Target>),
    /// A worker is free and asks for the next target.
    WorkerReady,
    /// The driver advanced a target's cursor.
    PageProgress { target_id: TargetId, page: PageState },
    /// Outcome of one extraction cycle after the dedup pipeline.
    RecordsProcessed {
        accepted: u64,
        rejected: Vec<Rejection>,
    },
    /// A worker finished (or was interrupted on) a target.
    TargetFinished {
        target_id: TargetId,
        outcome: TargetOutcome,
    },
    /// Latest pacing state, folded into progress and checkpoints.
    GovernorObserved(GovernorState),
    /// External stop signal: no new targets are handed out.
    StopRequested,
    /// All workers have exited.
    WorkersDrained,
}
