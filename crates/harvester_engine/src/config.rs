use std::path::{Path, PathBuf};
use std::time::Duration;

use harvester_core::{DriverLimits, RunSettings};
use serde::{Deserialize, Serialize};

use crate::{ClassifierSelectors, ExtractionSelectors, FetchSettings, GovernorSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Everything a run can be tuned with. Every field has a default, so a config
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub concurrency: usize,
    /// Targets finished between periodic checkpoints.
    pub checkpoint_every: u32,
    pub max_consecutive_target_failures: u32,
    pub max_cycles_per_target: u32,
    /// Accepted reviews after which a target counts as complete.
    pub max_records_per_target: u64,
    pub empty_streak_limit: u32,
    pub reclassify_after: u32,
    pub governor: GovernorConfig,
    pub fetch: FetchConfig,
    pub classifier: ClassifierSelectors,
    pub extraction: ExtractionSelectors,
    pub output_dir: PathBuf,
    pub records_file: String,
    pub checkpoint_file: String,
    pub log_file: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            checkpoint_every: 20,
            max_consecutive_target_failures: 10,
            max_cycles_per_target: 50,
            max_records_per_target: 100,
            empty_streak_limit: 3,
            reclassify_after: 2,
            governor: GovernorConfig::default(),
            fetch: FetchConfig::default(),
            classifier: ClassifierSelectors::default(),
            extraction: ExtractionSelectors::default(),
            output_dir: PathBuf::from("output"),
            records_file: "reviews.jsonl".to_string(),
            checkpoint_file: "checkpoint.ron".to_string(),
            log_file: "harvester.log".to_string(),
        }
    }
}

impl HarvestConfig {
    pub fn from_ron_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    pub fn records_path(&self) -> PathBuf {
        self.output_dir.join(&self.records_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(&self.log_file)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            checkpoint_every: self.checkpoint_every,
            max_consecutive_failures: self.max_consecutive_target_failures,
        }
    }

    pub fn driver_limits(&self) -> DriverLimits {
        DriverLimits {
            max_cycles: self.max_cycles_per_target,
            empty_streak_limit: self.empty_streak_limit,
            reclassify_after: self.reclassify_after,
            max_records: self.max_records_per_target,
        }
    }

    pub fn governor_settings(&self) -> GovernorSettings {
        GovernorSettings {
            base_delay: Duration::from_millis(self.governor.base_delay_ms),
            ceiling: Duration::from_millis(self.governor.ceiling_ms),
            max_attempts: self.governor.max_attempts,
            fetch_timeout: Duration::from_millis(self.governor.fetch_timeout_ms),
            jitter: self.governor.jitter,
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.fetch.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.fetch.request_timeout_ms),
            redirect_limit: self.fetch.redirect_limit,
            max_bytes: self.fetch.max_bytes,
            allowed_content_types: self.fetch.allowed_content_types.clone(),
            user_agent: self.fetch.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub base_delay_ms: u64,
    pub ceiling_ms: u64,
    pub max_attempts: u32,
    pub fetch_timeout_ms: u64,
    pub jitter: bool,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        let settings = GovernorSettings::default();
        Self {
            base_delay_ms: settings.base_delay.as_millis() as u64,
            ceiling_ms: settings.ceiling.as_millis() as u64,
            max_attempts: settings.max_attempts,
            fetch_timeout_ms: settings.fetch_timeout.as_millis() as u64,
            jitter: settings.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            connect_timeout_ms: settings.connect_timeout.as_millis() as u64,
            request_timeout_ms: settings.request_timeout.as_millis() as u64,
            redirect_limit: settings.redirect_limit,
            max_bytes: settings.max_bytes,
            allowed_content_types: settings.allowed_content_types,
            user_agent: settings.user_agent,
        }
    }
}
