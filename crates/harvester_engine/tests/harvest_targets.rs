mod common;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fast_config, review, review_page, reviews, target, MemoryWriter, ScriptedFetcher};
use harvester_core::{
    Cursor, DedupPipeline, DriverLimits, ExhaustReason, FetchHint, PageState, Rejection,
    SessionState, StructureType, TargetId, TargetOutcome,
};
use harvester_engine::{
    drive_target, AcceptStage, AdaptiveExtractor, BatchOutcome, ChannelProgressSink,
    CheckpointManager, ClassifierSelectors, DriverContext, EngineEvent, ExtractionSelectors,
    Governor, GovernorSettings, HarvestError, Harvester, PageClassifier, ProgressSink,
    ResumePoint, TargetObserver,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PRODUCT: &str = "https://shop.test/product/7";

fn harvester(config: harvester_engine::HarvestConfig, fetcher: &Arc<ScriptedFetcher>) -> Harvester {
    Harvester::new(config, fetcher.clone(), Arc::new(harvester_engine::LogProgressSink)).unwrap()
}

#[tokio::test]
async fn paginated_target_follows_next_links_and_drops_duplicates() {
    engine_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let first = reviews("alpha", 10);
    let mut last = reviews("gamma", 9);
    let repeat = &first[0];
    last.push(review(&repeat.reviewer, &repeat.text, &repeat.rating, &repeat.date));

    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_page(PRODUCT, review_page(&first, Some("?page=2")))
            .with_page(
                &format!("{PRODUCT}?page=2"),
                review_page(&reviews("beta", 10), Some("?page=3")),
            )
            .with_page(&format!("{PRODUCT}?page=3"), review_page(&last, None)),
    );
    let writer = MemoryWriter::default();

    let summary = harvester(fast_config(temp.path()), &fetcher)
        .run(
            vec![target(PRODUCT)],
            ResumePoint::default(),
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        fetcher.locators(),
        vec![
            PRODUCT.to_string(),
            format!("{PRODUCT}?page=2"),
            format!("{PRODUCT}?page=3"),
        ]
    );
    assert_eq!(writer.records().len(), 29);
    assert_eq!(summary.session, SessionState::Finished);
    assert_eq!(summary.progress.counters.records_accepted, 29);
    assert_eq!(
        summary.progress.counters.rejected_for(Rejection::DuplicateRecord),
        1
    );
    assert_eq!(summary.progress.counters.targets_completed, 1);
    assert!(summary.checkpoint_saved);
}

#[tokio::test]
async fn static_target_is_fetched_once() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new().with_page(PRODUCT, review_page(&reviews("solo", 3), None)),
    );
    let writer = MemoryWriter::default();

    let summary = harvester(fast_config(temp.path()), &fetcher)
        .run(
            vec![target(PRODUCT)],
            ResumePoint::default(),
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), vec![(PRODUCT.to_string(), FetchHint::Load)]);
    assert_eq!(writer.records().len(), 3);
    assert_eq!(summary.progress.total_harvested, 3);
}

#[tokio::test]
async fn invalid_reviews_are_counted_not_stored() {
    let temp = TempDir::new().unwrap();
    let page = review_page(
        &[
            review("Ana", "Lovely scent, lasts all day.", "5", "March 15, 2024"),
            review("Bo", "ok", "4", "2024-03-15"),
            review("Cy", "Rated it off the scale somehow.", "7", "2024-03-15"),
            review("Di", "Nice enough but pricey for the size.", "3", "someday"),
        ],
        None,
    );
    let fetcher = Arc::new(ScriptedFetcher::new().with_page(PRODUCT, page));
    let writer = MemoryWriter::default();

    let summary = harvester(fast_config(temp.path()), &fetcher)
        .run(
            vec![target(PRODUCT)],
            ResumePoint::default(),
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let records = writer.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reviewer, "Ana");
    assert_eq!(records[0].date, "2024-03-15");
    let counters = &summary.progress.counters;
    assert_eq!(counters.rejected_for(Rejection::TextTooShort), 1);
    assert_eq!(counters.rejected_for(Rejection::RatingOutOfRange), 1);
    assert_eq!(counters.rejected_for(Rejection::DateUnparseable), 1);
    assert_eq!(summary.session, SessionState::Finished);
}

#[tokio::test]
async fn worker_pool_harvests_every_target_once() {
    let temp = TempDir::new().unwrap();
    let urls: Vec<String> = (1..=9).map(|n| format!("https://shop.test/product/{n}")).collect();
    let fetcher = urls.iter().enumerate().fold(ScriptedFetcher::new(), |f, (i, url)| {
        f.with_page(url, review_page(&reviews(&format!("p{i}"), 2), None))
    });
    let fetcher = Arc::new(fetcher);
    let writer = MemoryWriter::default();
    let config = harvester_engine::HarvestConfig {
        concurrency: 3,
        ..fast_config(temp.path())
    };

    let summary = harvester(config, &fetcher)
        .run(
            urls.iter().map(|u| target(u)).collect(),
            ResumePoint::default(),
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut fetched = fetcher.locators();
    fetched.sort();
    let mut expected = urls.clone();
    expected.sort();
    assert_eq!(fetched, expected);
    assert_eq!(writer.records().len(), 18);
    assert_eq!(summary.progress.counters.targets_completed, 9);
    assert_eq!(summary.progress.targets_pending, 0);
}

#[tokio::test]
async fn consecutive_failures_abort_the_run() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new());
    let config = harvester_engine::HarvestConfig {
        max_consecutive_target_failures: 3,
        ..fast_config(temp.path())
    };
    let targets = (1..=6)
        .map(|n| target(&format!("https://shop.test/gone/{n}")))
        .collect();

    let result = harvester(config, &fetcher)
        .run(
            targets,
            ResumePoint::default(),
            Box::new(MemoryWriter::default()),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(HarvestError::RunAborted {
            consecutive_failures: 3
        })
    ));
    assert_eq!(fetcher.calls().len(), 3);
}

#[tokio::test]
async fn targets_failed_before_an_abort_are_retried_next_run() {
    let temp = TempDir::new().unwrap();
    let config = harvester_engine::HarvestConfig {
        max_consecutive_target_failures: 3,
        ..fast_config(temp.path())
    };
    let urls: Vec<String> = (1..=6).map(|n| format!("https://shop.test/gone/{n}")).collect();
    let targets = || urls.iter().map(|url| target(url)).collect::<Vec<_>>();

    let offline = Arc::new(ScriptedFetcher::new());
    let aborted = harvester(config.clone(), &offline);
    let result = aborted
        .run(
            targets(),
            ResumePoint::default(),
            Box::new(MemoryWriter::default()),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(HarvestError::RunAborted { .. })));
    let checkpoint = aborted.checkpoints().load().unwrap().unwrap();
    assert!(checkpoint.completed_target_ids.is_empty());

    let online = Arc::new(urls.iter().enumerate().fold(ScriptedFetcher::new(), |f, (i, url)| {
        f.with_page(url, review_page(&reviews(&format!("back-{i}"), 2), None))
    }));
    let writer = MemoryWriter::default();
    let summary = harvester(config, &online)
        .run(
            targets(),
            ResumePoint {
                checkpoint: Some(checkpoint),
                seen_hashes: Vec::new(),
            },
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(online.locators(), urls);
    assert_eq!(summary.progress.counters.targets_completed, 6);
    assert_eq!(writer.records().len(), 12);
}

/// Cancels the stop token as soon as the first target finishes.
struct StopAfterFirst {
    stop: CancellationToken,
}

impl ProgressSink for StopAfterFirst {
    fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::TargetFinished { .. }) {
            self.stop.cancel();
        }
    }
}

#[tokio::test]
async fn stop_signal_drains_and_checkpoints() {
    let temp = TempDir::new().unwrap();
    let urls: Vec<String> = (1..=3).map(|n| format!("https://shop.test/product/{n}")).collect();
    let fetcher = Arc::new(urls.iter().fold(ScriptedFetcher::new(), |f, url| {
        f.with_page(url, review_page(&reviews(url, 1), None))
    }));
    let stop = CancellationToken::new();
    let harvester = Harvester::new(
        fast_config(temp.path()),
        fetcher.clone(),
        Arc::new(StopAfterFirst { stop: stop.clone() }),
    )
    .unwrap();

    let summary = harvester
        .run(
            urls.iter().map(|u| target(u)).collect(),
            ResumePoint::default(),
            Box::new(MemoryWriter::default()),
            stop,
        )
        .await
        .unwrap();

    assert_eq!(summary.session, SessionState::Stopped);
    assert_eq!(fetcher.calls().len(), 1);
    let saved = harvester.checkpoints().load().unwrap().unwrap();
    assert_eq!(saved.completed_target_ids.len(), 1);
    assert_eq!(saved.total_harvested, 1);
}

#[tokio::test]
async fn checkpoint_failure_does_not_stop_harvesting() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not_a_dir");
    std::fs::write(&blocker, "x").unwrap();
    let fetcher = Arc::new(
        ScriptedFetcher::new().with_page(PRODUCT, review_page(&reviews("solo", 2), None)),
    );
    let (tx, rx) = mpsc::channel();
    let writer = MemoryWriter::default();
    let harvester = Harvester::new(
        fast_config(temp.path()),
        fetcher.clone(),
        Arc::new(ChannelProgressSink::new(tx)),
    )
    .unwrap()
    .with_checkpoints(
        CheckpointManager::new(blocker, "checkpoint.ron").with_retry(2, Duration::from_millis(1)),
    );

    let summary = harvester
        .run(
            vec![target(PRODUCT)],
            ResumePoint::default(),
            Box::new(writer.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!summary.checkpoint_saved);
    assert_eq!(writer.records().len(), 2);
    let events: Vec<EngineEvent> = rx.try_iter().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::CheckpointWriteFailure { .. })));
}

#[derive(Default)]
struct RecordingObserver {
    classified: Mutex<Vec<StructureType>>,
    cycles: Mutex<Vec<PageState>>,
}

impl TargetObserver for RecordingObserver {
    fn classified(&self, _target_id: &TargetId, structure: StructureType) {
        self.classified.lock().unwrap().push(structure);
    }

    fn cycle_finished(&self, _target_id: &TargetId, page: &PageState, _batch: &BatchOutcome) {
        self.cycles.lock().unwrap().push(page.clone());
    }
}

#[tokio::test]
async fn unrecognised_page_is_reclassified_until_the_empty_streak_ends() {
    let fetcher = ScriptedFetcher::new().with_page(PRODUCT, "<html><p>Loading…</p></html>".into());
    let governor = Governor::new(GovernorSettings {
        base_delay: Duration::ZERO,
        jitter: false,
        ..GovernorSettings::default()
    });
    let classifier = PageClassifier::new(&ClassifierSelectors::default()).unwrap();
    let extractor = AdaptiveExtractor::from_selectors(&ExtractionSelectors::default()).unwrap();
    let accept = AcceptStage::new(DedupPipeline::new(), Box::new(MemoryWriter::default()));
    let cancel = CancellationToken::new();
    let ctx = DriverContext {
        fetcher: &fetcher,
        governor: &governor,
        classifier: &classifier,
        extractor: &extractor,
        accept: &accept,
        limits: DriverLimits::default(),
        cancel: &cancel,
    };
    let observer = RecordingObserver::default();

    let outcome = drive_target(ctx, &"t7".to_string(), PRODUCT, None, &observer).await;

    match outcome {
        TargetOutcome::Exhausted { reason, page } => {
            assert_eq!(reason, ExhaustReason::EmptyStreak);
            assert_eq!(page.cycles, 3);
            assert_eq!(page.cursor, Cursor::Start);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(fetcher.calls().len(), 3);
    assert_eq!(
        *observer.classified.lock().unwrap(),
        vec![StructureType::Unknown; 3]
    );
    assert_eq!(observer.cycles.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_driver_reports_where_to_resume() {
    let resume_at = PageState {
        structure: StructureType::Paginated,
        classified: true,
        cursor: Cursor::Page {
            number: 4,
            locator: format!("{PRODUCT}?page=4"),
        },
        cycles: 3,
        ..PageState::default()
    };
    let fetcher = ScriptedFetcher::new();
    let governor = Governor::new(GovernorSettings::default());
    let classifier = PageClassifier::new(&ClassifierSelectors::default()).unwrap();
    let extractor = AdaptiveExtractor::from_selectors(&ExtractionSelectors::default()).unwrap();
    let accept = AcceptStage::new(DedupPipeline::new(), Box::new(MemoryWriter::default()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = DriverContext {
        fetcher: &fetcher,
        governor: &governor,
        classifier: &classifier,
        extractor: &extractor,
        accept: &accept,
        limits: DriverLimits::default(),
        cancel: &cancel,
    };
    let observer = RecordingObserver::default();

    let outcome = drive_target(ctx, &"t7".to_string(), PRODUCT, Some(resume_at.clone()), &observer).await;

    assert_eq!(outcome, TargetOutcome::Interrupted { page: resume_at });
    assert!(fetcher.calls().is_empty());
}
