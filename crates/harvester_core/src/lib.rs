//! Harvester core: pure data model, per-target driver and run state machines,
//! normalization and dedup. No IO happens here.
mod checkpoint;
mod dedup;
mod driver;
mod effect;
mod msg;
pub mod normalize;
mod page;
mod progress;
mod record;
mod state;
mod target;
mod update;

pub use checkpoint::{CheckpointRecord, GovernorState};
pub use dedup::DedupPipeline;
pub use driver::{
    DriverEffect, DriverLimits, DriverMsg, DriverPhase, ExhaustReason, TargetOutcome, TargetRun,
};
pub use effect::Effect;
pub use msg::Msg;
pub use page::{Cursor, FetchHint, PageState, StructureType};
pub use progress::{LoadStats, ProgressCounters, ProgressSnapshot};
pub use record::{CanonicalRecord, Field, RawRecord, Rejection};
pub use state::{RunSettings, RunState, SessionState};
pub use target::{
    canonical_url, target_id_for, DiscoveryMethod, Target, TargetError, TargetId, TargetStatus,
};
pub use update::update;
