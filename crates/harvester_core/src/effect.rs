use crate::{PageState, TargetId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartTarget {
        target_id: TargetId,
        url: String,
        /// Saved page state when the target was in flight in an earlier session.
        resume: Option<PageState>,
    },
    /// Persist `RunState::checkpoint_record` now.
    SaveCheckpoint,
    /// Too many consecutive target failures; stop the run.
    AbortRun { consecutive_failures: u32 },
}
