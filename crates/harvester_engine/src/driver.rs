//! Executes a `TargetRun`: fetch through the governor, classify, extract and
//! feed the results back until the run finishes.
use std::collections::VecDeque;

use chrono::Utc;
use engine_logging::{engine_debug, engine_warn};
use harvester_core::{
    DriverEffect, DriverLimits, DriverMsg, PageState, RawRecord, StructureType, TargetId,
    TargetOutcome, TargetRun,
};
use scraper::Html;
use tokio_util::sync::CancellationToken;

use crate::extract::Provenance;
use crate::{
    AcceptStage, AdaptiveExtractor, BatchOutcome, Fetcher, Governor, GovernorError, PageClassifier,
    PageContent,
};

/// Receives per-target progress while a target runs.
pub trait TargetObserver: Send + Sync {
    fn classified(&self, target_id: &TargetId, structure: StructureType);
    /// One fetch-extract cycle finished; `page` is the state to resume from.
    fn cycle_finished(&self, target_id: &TargetId, page: &PageState, batch: &BatchOutcome);
}

/// Shared collaborators for driving targets.
#[derive(Clone, Copy)]
pub struct DriverContext<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub governor: &'a Governor,
    pub classifier: &'a PageClassifier,
    pub extractor: &'a AdaptiveExtractor,
    pub accept: &'a AcceptStage,
    pub limits: DriverLimits,
    pub cancel: &'a CancellationToken,
}

struct PageRead {
    records: Vec<RawRecord>,
    complete: usize,
    next_link: Option<String>,
    load_more: bool,
}

/// Runs one target to its outcome. Never fails: fetch errors become
/// `TargetOutcome::Failed`, cancellation becomes `TargetOutcome::Interrupted`.
pub async fn drive_target(
    ctx: DriverContext<'_>,
    target_id: &TargetId,
    url: &str,
    resume: Option<PageState>,
    observer: &dyn TargetObserver,
) -> TargetOutcome {
    let mut run = TargetRun::new(url, resume, ctx.limits);
    let mut effects: VecDeque<DriverEffect> = run.begin().into();
    let mut content: Option<PageContent> = None;

    while let Some(effect) = effects.pop_front() {
        let mut batch = None;
        let msg = match effect {
            DriverEffect::Finish(outcome) => return outcome,
            DriverEffect::Fetch { locator, hint } => {
                match ctx
                    .governor
                    .execute(&locator, &hint, ctx.fetcher, ctx.cancel)
                    .await
                {
                    Ok(page) => {
                        content = Some(page);
                        DriverMsg::Fetched
                    }
                    Err(GovernorError::Cancelled) => DriverMsg::Interrupt,
                    Err(err) => DriverMsg::FetchFailed {
                        reason: err.to_string(),
                    },
                }
            }
            DriverEffect::Classify => {
                let structure = content
                    .as_ref()
                    .map(|page| classify_page(ctx.classifier, &page.html))
                    .unwrap_or_default();
                if structure == StructureType::Unknown {
                    engine_warn!("{target_id}: page structure ambiguous, will classify again");
                }
                observer.classified(target_id, structure);
                DriverMsg::Classified(structure)
            }
            DriverEffect::Extract => {
                let read = content.as_ref().map(|page| read_page(ctx, target_id, page));
                let (complete, next_link, load_more) = match read {
                    Some(read) => {
                        let outcome = ctx.accept.accept(&read.records);
                        engine_debug!(
                            "{target_id}: {} items, {} accepted, {} rejected",
                            read.records.len(),
                            outcome.accepted,
                            outcome.rejected.len()
                        );
                        batch = Some(outcome);
                        (read.complete, read.next_link, read.load_more)
                    }
                    None => (0, None, false),
                };
                DriverMsg::Extracted {
                    extracted: complete,
                    accepted: batch.as_ref().map_or(0, |b| b.accepted as usize),
                    next_link,
                    load_more_control: load_more,
                }
            }
        };

        effects.extend(run.update(msg));
        if let Some(batch) = batch {
            observer.cycle_finished(target_id, run.page(), &batch);
        }
    }

    TargetOutcome::Failed {
        reason: format!("driver stalled in {:?}", run.phase()),
    }
}

fn classify_page(classifier: &PageClassifier, html: &str) -> StructureType {
    classifier.classify(&Html::parse_document(html))
}

fn read_page(ctx: DriverContext<'_>, target_id: &TargetId, page: &PageContent) -> PageRead {
    let doc = Html::parse_document(&page.html);
    let batch = ctx.extractor.extract(
        &doc,
        Provenance {
            target_id,
            source_url: &page.final_url,
            fetched_at: Utc::now(),
        },
    );
    PageRead {
        complete: batch.complete_count(),
        records: batch.records,
        next_link: ctx.classifier.next_page_link(&doc, &page.final_url),
        load_more: ctx.classifier.has_load_more(&doc),
    }
}
