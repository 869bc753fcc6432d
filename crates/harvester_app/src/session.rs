use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use engine_logging::{engine_info, engine_warn};
use harvester_core::{DiscoveryMethod, Target};
use harvester_engine::{
    discover_targets, ensure_output_dir, load_content_hashes, targets_from_lines,
    CheckpointError, CheckpointManager, HarvestConfig, Harvester, JsonLinesWriter,
    LogProgressSink, ReqwestFetcher, ResumePoint, RunSummary,
};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;

/// Runs one harvest session: resolve targets, restore the resume point, harvest.
pub async fn run(cli: &Cli, config: HarvestConfig) -> anyhow::Result<RunSummary> {
    ensure_output_dir(&config.output_dir)?;
    let records_path = config.records_path();
    let fetcher = Arc::new(ReqwestFetcher::new(config.fetch_settings())?);
    let harvester = Harvester::new(config, fetcher.clone(), Arc::new(LogProgressSink))?;

    let stop = CancellationToken::new();
    stop_on_ctrl_c(stop.clone());

    let targets = match (&cli.targets, &cli.discover) {
        (Some(path), _) => targets_from_file(path)?,
        (None, Some(listing)) => {
            discover_targets(
                listing,
                &cli.link_pattern,
                cli.max_targets,
                fetcher.as_ref(),
                harvester.governor(),
                &stop,
            )
            .await
            .with_context(|| format!("scanning {listing} for targets"))?
        }
        (None, None) => bail!("either --targets or --discover is required"),
    };
    if targets.is_empty() {
        bail!("no targets to harvest");
    }

    let resume = resume_point(harvester.checkpoints(), &records_path, cli.fresh)?;
    let writer = JsonLinesWriter::open(&records_path)?;
    engine_info!(
        "harvesting {} targets into {}",
        targets.len(),
        records_path.display()
    );
    Ok(harvester.run(targets, resume, Box::new(writer), stop).await?)
}

fn targets_from_file(path: &Path) -> anyhow::Result<Vec<Target>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading targets from {}", path.display()))?;
    let (targets, errors) = targets_from_lines(&text, DiscoveryMethod::DirectSearch);
    for err in errors {
        engine_warn!("{}: {err}", path.display());
    }
    Ok(targets)
}

/// Checkpoint and seen-set for this session. An unreadable checkpoint is
/// logged and ignored; the records file still seeds the seen-set, so targets
/// visited again do not store the same reviews twice.
fn resume_point(
    checkpoints: &CheckpointManager,
    records_path: &Path,
    fresh: bool,
) -> anyhow::Result<ResumePoint> {
    let checkpoint = if fresh {
        checkpoints.clear()?;
        engine_info!("--fresh: checkpoint {} removed", checkpoints.path().display());
        None
    } else {
        match checkpoints.load() {
            Ok(checkpoint) => checkpoint,
            Err(err @ CheckpointError::Corrupt { .. }) => {
                engine_warn!("{err}; starting over");
                None
            }
            Err(err) => return Err(err.into()),
        }
    };
    let seen_hashes = load_content_hashes(records_path)?;
    Ok(ResumePoint {
        checkpoint,
        seen_hashes,
    })
}

fn stop_on_ctrl_c(stop: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("interrupt received; finishing in-flight pages and saving a checkpoint");
            stop.cancel();
        }
    });
}

pub fn print_summary(summary: &RunSummary) {
    let progress = &summary.progress;
    let counters = &progress.counters;
    println!("session: {:?}", summary.session);
    println!(
        "targets: {} total, {} completed, {} exhausted, {} failed, {} left pending",
        progress.targets_total,
        counters.targets_completed,
        counters.targets_exhausted,
        counters.targets_failed,
        progress.targets_pending
    );
    println!(
        "reviews: {} accepted this session, {} in total",
        counters.records_accepted, progress.total_harvested
    );
    for (reason, count) in &counters.rejected {
        println!("  rejected ({reason}): {count}");
    }
    println!(
        "elapsed: {:.1}s, {:.1} reviews per target",
        progress.elapsed.as_secs_f64(),
        progress.records_per_target()
    );
    if !summary.checkpoint_saved {
        println!("warning: final checkpoint was not written");
    }
}
