//! Harvester engine: fetching, pacing, page reading, storage and the worker pool.
mod accept;
mod checkpoint;
mod classify;
mod config;
mod decode;
mod discover;
mod driver;
mod engine;
mod extract;
mod fetch;
mod governor;
mod persist;
mod storage;
mod types;

pub use accept::{AcceptStage, BatchOutcome};
pub use checkpoint::{CheckpointError, CheckpointManager};
pub use classify::{ClassifierSelectors, PageClassifier};
pub use config::{ConfigError, FetchConfig, GovernorConfig, HarvestConfig};
pub use decode::{decode_html, DecodedHtml};
pub use discover::{discover_targets, scan_links, targets_from_lines};
pub use driver::{drive_target, DriverContext, TargetObserver};
pub use engine::{HarvestError, Harvester, ResumePoint, RunSummary};
pub use extract::{
    AdaptiveExtractor, ExtractError, ExtractionBatch, ExtractionSelectors, Provenance,
    SelectorStrategy, Strategy, StrategySpec, ValueSource,
};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use governor::{Governor, GovernorError, GovernorSettings};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use storage::{load_content_hashes, load_records, JsonLinesWriter, RecordWriter, StorageError};
pub use types::{
    ChannelProgressSink, EngineEvent, FetchError, FetchErrorKind, LogProgressSink, PageContent,
    ProgressSink,
};
