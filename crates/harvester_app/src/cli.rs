use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use engine_logging::LevelFilter;
use harvester_engine::HarvestConfig;

#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Harvest product reviews into JSON lines, resuming from the last checkpoint",
    long_about = None
)]
#[command(group(ArgGroup::new("source").required(true).args(["targets", "discover"])))]
pub struct Cli {
    /// File with one product URL per line
    #[arg(short, long)]
    pub targets: Option<PathBuf>,

    /// Listing page to scan for product links
    #[arg(short, long)]
    pub discover: Option<String>,

    /// Substring a scanned link must contain to become a target
    #[arg(long, default_value = "/product/")]
    pub link_pattern: String,

    /// Most targets taken from a listing page
    #[arg(long, default_value = "20")]
    pub max_targets: usize,

    /// RON config file; the flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Targets harvested in parallel
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Ignore the saved checkpoint and visit every target again
    #[arg(long)]
    pub fresh: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_ron_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HarvestConfig::default(),
        };
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        Ok(config)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
