//! Worker pool that runs a whole harvest against the pure run state machine.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_core::{
    update, CheckpointRecord, DedupPipeline, DriverLimits, Effect, Msg, PageState,
    ProgressSnapshot, RunState, SessionState, StructureType, Target, TargetId,
};
use tokio_util::sync::CancellationToken;

use crate::driver::{drive_target, DriverContext, TargetObserver};
use crate::{
    AcceptStage, AdaptiveExtractor, BatchOutcome, CheckpointError, CheckpointManager,
    EngineEvent, ExtractError, Fetcher, Governor, HarvestConfig, PageClassifier, ProgressSink,
    RecordWriter,
};

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("invalid selector configuration: {0}")]
    Config(#[from] ExtractError),
    #[error("run aborted after {consecutive_failures} consecutive target failures")]
    RunAborted { consecutive_failures: u32 },
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("worker task failed: {0}")]
    Worker(String),
}

/// What a run starts from besides its target list.
#[derive(Debug, Default)]
pub struct ResumePoint {
    pub checkpoint: Option<CheckpointRecord>,
    /// Hashes of records stored by earlier sessions.
    pub seen_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub session: SessionState,
    pub progress: ProgressSnapshot,
    /// Whether the final checkpoint reached disk.
    pub checkpoint_saved: bool,
}

/// Owns the collaborators of a harvest; `run` may be called once per session.
pub struct Harvester {
    fetcher: Arc<dyn Fetcher>,
    governor: Arc<Governor>,
    classifier: Arc<PageClassifier>,
    extractor: Arc<AdaptiveExtractor>,
    checkpoints: Arc<CheckpointManager>,
    sink: Arc<dyn ProgressSink>,
    config: HarvestConfig,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, HarvestError> {
        let classifier = PageClassifier::new(&config.classifier)?;
        let extractor = AdaptiveExtractor::from_selectors(&config.extraction)?;
        let checkpoints =
            CheckpointManager::new(config.output_dir.clone(), config.checkpoint_file.clone());
        Ok(Self {
            fetcher,
            governor: Arc::new(Governor::new(config.governor_settings())),
            classifier: Arc::new(classifier),
            extractor: Arc::new(extractor),
            checkpoints: Arc::new(checkpoints),
            sink,
            config,
        })
    }

    /// Replaces the checkpoint manager (tests use faster retries).
    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = Arc::new(checkpoints);
        self
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Harvests `targets` with a bounded worker pool until every target is
    /// finished, `stop` is cancelled, or too many targets fail in a row.
    pub async fn run(
        &self,
        targets: Vec<Target>,
        resume: ResumePoint,
        writer: Box<dyn RecordWriter>,
        stop: CancellationToken,
    ) -> Result<RunSummary, HarvestError> {
        let mut dedup = DedupPipeline::new();
        dedup.rehydrate(resume.seen_hashes);

        let shared = Arc::new(RunShared {
            state: Mutex::new(RunState::new(self.config.run_settings())),
            accept: AcceptStage::new(dedup, writer),
            fetcher: self.fetcher.clone(),
            governor: self.governor.clone(),
            classifier: self.classifier.clone(),
            extractor: self.extractor.clone(),
            checkpoints: self.checkpoints.clone(),
            sink: self.sink.clone(),
            limits: self.config.driver_limits(),
            cancel: stop.child_token(),
            started: Instant::now(),
        });

        if let Some(checkpoint) = resume.checkpoint {
            self.governor.restore(checkpoint.governor);
            shared.dispatch(Msg::Resume(checkpoint));
        }
        shared.dispatch(Msg::TargetsLoaded(targets));
        if let Some(load) = shared.lock_state().last_load() {
            engine_info!(
                "{} targets queued, {} skipped (done earlier or repeated), {} hashes seen",
                load.enqueued,
                load.skipped,
                shared.accept.seen_count()
            );
        }

        let workers = self.config.concurrency.max(1);
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let shared = shared.clone();
                tokio::spawn(async move { shared.worker_loop(worker).await })
            })
            .collect();
        let mut worker_error = None;
        for handle in handles {
            if let Err(err) = handle.await {
                engine_error!("worker task failed: {err}");
                worker_error = Some(err.to_string());
            }
        }

        let effects = shared.dispatch(Msg::WorkersDrained);
        let mut checkpoint_saved = false;
        for effect in effects {
            if effect == Effect::SaveCheckpoint {
                checkpoint_saved = shared.save_checkpoint().await;
            }
        }

        let state = shared.lock_state();
        let progress = state.progress(shared.started.elapsed());
        shared.sink.emit(EngineEvent::Progress(progress.clone()));
        if let Some(message) = worker_error {
            return Err(HarvestError::Worker(message));
        }
        match state.session() {
            SessionState::Aborted => Err(HarvestError::RunAborted {
                consecutive_failures: state.consecutive_failures(),
            }),
            session => Ok(RunSummary {
                session,
                progress,
                checkpoint_saved,
            }),
        }
    }
}

struct RunShared {
    state: Mutex<RunState>,
    accept: AcceptStage,
    fetcher: Arc<dyn Fetcher>,
    governor: Arc<Governor>,
    classifier: Arc<PageClassifier>,
    extractor: Arc<AdaptiveExtractor>,
    checkpoints: Arc<CheckpointManager>,
    sink: Arc<dyn ProgressSink>,
    limits: DriverLimits,
    /// Child of the caller's stop token; also cancelled on abort.
    cancel: CancellationToken,
    started: Instant,
}

impl RunShared {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `msg` to the run state and reports progress if anything changed.
    fn dispatch(&self, msg: Msg) -> Vec<Effect> {
        let (effects, snapshot) = {
            let mut guard = self.lock_state();
            let state = std::mem::take(&mut *guard);
            let (mut state, effects) = update(state, msg);
            let snapshot = state
                .consume_dirty()
                .then(|| state.progress(self.started.elapsed()));
            *guard = state;
            (effects, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.sink.emit(EngineEvent::Progress(snapshot));
        }
        effects
    }

    async fn worker_loop(&self, worker: usize) {
        loop {
            if self.cancel.is_cancelled() {
                self.dispatch(Msg::StopRequested);
                break;
            }
            let mut started = None;
            for effect in self.dispatch(Msg::WorkerReady) {
                if let Effect::StartTarget {
                    target_id,
                    url,
                    resume,
                } = effect
                {
                    started = Some((target_id, url, resume));
                }
            }
            let Some((target_id, url, resume)) = started else {
                break;
            };
            self.process_target(worker, target_id, url, resume).await;
        }
    }

    async fn process_target(
        &self,
        worker: usize,
        target_id: TargetId,
        url: String,
        resume: Option<PageState>,
    ) {
        if resume.is_some() {
            engine_info!("worker {worker}: resuming {target_id} ({url})");
        }
        self.sink.emit(EngineEvent::TargetStarted {
            target_id: target_id.clone(),
            url: url.clone(),
        });

        let ctx = DriverContext {
            fetcher: self.fetcher.as_ref(),
            governor: &self.governor,
            classifier: &self.classifier,
            extractor: &self.extractor,
            accept: &self.accept,
            limits: self.limits,
            cancel: &self.cancel,
        };
        let outcome = drive_target(ctx, &target_id, &url, resume, self).await;

        self.sink.emit(EngineEvent::TargetFinished {
            target_id: target_id.clone(),
            outcome: outcome.clone(),
        });
        self.dispatch(Msg::GovernorObserved(self.governor.snapshot()));
        let effects = self.dispatch(Msg::TargetFinished { target_id, outcome });
        self.apply(effects).await;
    }

    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SaveCheckpoint => {
                    self.save_checkpoint().await;
                }
                Effect::AbortRun {
                    consecutive_failures,
                } => {
                    engine_error!(
                        "{consecutive_failures} consecutive target failures, aborting run"
                    );
                    self.sink.emit(EngineEvent::RunAborted {
                        consecutive_failures,
                    });
                    self.cancel.cancel();
                }
                Effect::StartTarget { target_id, .. } => {
                    engine_warn!("unexpected start for {target_id} outside the worker loop");
                }
            }
        }
    }

    /// Writes the current checkpoint. Failure is reported and logged, never fatal.
    async fn save_checkpoint(&self) -> bool {
        let snapshot = || self.lock_state().checkpoint_record(Utc::now());
        match self.checkpoints.save_with(snapshot).await {
            Ok(record) => {
                self.sink.emit(EngineEvent::CheckpointSaved {
                    completed_targets: record.completed_target_ids.len(),
                    total_harvested: record.total_harvested,
                });
                true
            }
            Err(err) => {
                engine_error!("{err}");
                self.sink.emit(EngineEvent::CheckpointWriteFailure {
                    message: err.to_string(),
                });
                false
            }
        }
    }
}

impl TargetObserver for RunShared {
    fn classified(&self, target_id: &TargetId, structure: StructureType) {
        self.sink.emit(EngineEvent::Classified {
            target_id: target_id.clone(),
            structure,
        });
    }

    fn cycle_finished(&self, target_id: &TargetId, page: &PageState, batch: &BatchOutcome) {
        self.dispatch(Msg::RecordsProcessed {
            accepted: batch.accepted,
            rejected: batch.rejected.clone(),
        });
        self.dispatch(Msg::PageProgress {
            target_id: target_id.clone(),
            page: page.clone(),
        });
        self.dispatch(Msg::GovernorObserved(self.governor.snapshot()));
    }
}
