//! Pure per-target pagination/scroll state machine.
//!
//! `TargetRun` never performs IO. The engine feeds it `DriverMsg` values describing
//! what happened (content fetched, classified, extracted) and executes the
//! `DriverEffect` values it returns.
use crate::{Cursor, FetchHint, PageState, StructureType, TargetStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverLimits {
    /// Hard cap on fetch-extract cycles for one target.
    pub max_cycles: u32,
    /// Consecutive cycles without a newly accepted record before giving up.
    pub empty_streak_limit: u32,
    /// Consecutive empty cycles after which the classifier runs again.
    pub reclassify_after: u32,
    /// Accepted records after which a target is complete.
    pub max_records: u64,
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            empty_streak_limit: 3,
            reclassify_after: 2,
            max_records: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverPhase {
    Start,
    Fetching,
    Classifying,
    Extracting,
    Advancing,
    Exhausted(ExhaustReason),
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    StaticSinglePass,
    NoNextPage,
    EmptyStreak,
    CycleCap,
    /// The target yielded its quota of accepted records.
    RecordCap,
}

impl ExhaustReason {
    /// Natural ends complete the target; guard stops mark it exhausted.
    pub fn status(self) -> TargetStatus {
        match self {
            ExhaustReason::StaticSinglePass
            | ExhaustReason::NoNextPage
            | ExhaustReason::RecordCap => TargetStatus::Completed,
            ExhaustReason::EmptyStreak | ExhaustReason::CycleCap => TargetStatus::Exhausted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Exhausted {
        reason: ExhaustReason,
        page: PageState,
    },
    Failed {
        reason: String,
    },
    /// Stopped by a stop signal; `page` is where to resume.
    Interrupted {
        page: PageState,
    },
}

impl TargetOutcome {
    /// Terminal status for the target, `None` when it must be resumed later.
    pub fn terminal_status(&self) -> Option<TargetStatus> {
        match self {
            TargetOutcome::Exhausted { reason, .. } => Some(reason.status()),
            TargetOutcome::Failed { .. } => Some(TargetStatus::Failed),
            TargetOutcome::Interrupted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMsg {
    Fetched,
    FetchFailed { reason: String },
    Classified(StructureType),
    Extracted {
        /// Complete records the extractor produced.
        extracted: usize,
        /// Records that survived normalization and dedup.
        accepted: usize,
        next_link: Option<String>,
        load_more_control: bool,
    },
    Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEffect {
    Fetch { locator: String, hint: FetchHint },
    Classify,
    Extract,
    Finish(TargetOutcome),
}

#[derive(Debug, Clone)]
pub struct TargetRun {
    target_url: String,
    page: PageState,
    phase: DriverPhase,
    limits: DriverLimits,
    reclassify_due: bool,
}

impl TargetRun {
    /// A fresh run, or a resumed one that re-enters at the saved cursor.
    pub fn new(target_url: impl Into<String>, resume: Option<PageState>, limits: DriverLimits) -> Self {
        let page = resume.unwrap_or_default();
        let reclassify_due = page.consecutive_empty_fetches >= limits.reclassify_after;
        Self {
            target_url: target_url.into(),
            page,
            phase: DriverPhase::Start,
            limits,
            reclassify_due,
        }
    }

    pub fn phase(&self) -> &DriverPhase {
        &self.phase
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn begin(&mut self) -> Vec<DriverEffect> {
        if self.phase != DriverPhase::Start {
            return Vec::new();
        }
        if self.page.records_accepted >= self.limits.max_records {
            return self.exhaust(ExhaustReason::RecordCap);
        }
        if self.page.cycles >= self.limits.max_cycles {
            return self.exhaust(ExhaustReason::CycleCap);
        }
        self.fetch_current()
    }

    pub fn update(&mut self, msg: DriverMsg) -> Vec<DriverEffect> {
        let phase = self.phase.clone();
        match (msg, phase) {
            (DriverMsg::Interrupt, phase) if !is_terminal(&phase) => {
                self.phase = DriverPhase::Interrupted;
                vec![DriverEffect::Finish(TargetOutcome::Interrupted {
                    page: self.page.clone(),
                })]
            }
            (DriverMsg::Fetched, DriverPhase::Fetching) => {
                if !self.page.classified || self.reclassify_due {
                    self.phase = DriverPhase::Classifying;
                    vec![DriverEffect::Classify]
                } else {
                    self.phase = DriverPhase::Extracting;
                    vec![DriverEffect::Extract]
                }
            }
            (DriverMsg::FetchFailed { reason }, DriverPhase::Fetching) => {
                self.phase = DriverPhase::Failed;
                vec![DriverEffect::Finish(TargetOutcome::Failed { reason })]
            }
            (DriverMsg::Classified(structure), DriverPhase::Classifying) => {
                // Unknown leaves `classified` false so the next cycle classifies again.
                self.page.structure = structure;
                self.page.classified = structure != StructureType::Unknown;
                self.reclassify_due = false;
                self.phase = DriverPhase::Extracting;
                vec![DriverEffect::Extract]
            }
            (
                DriverMsg::Extracted {
                    extracted,
                    accepted,
                    next_link,
                    load_more_control,
                },
                DriverPhase::Extracting,
            ) => {
                self.record_cycle(extracted, accepted);
                self.phase = DriverPhase::Advancing;
                self.advance(next_link, load_more_control)
            }
            _ => Vec::new(),
        }
    }

    fn record_cycle(&mut self, extracted: usize, accepted: usize) {
        self.page.cycles += 1;
        self.page.records_accepted += accepted as u64;
        if accepted == 0 {
            self.page.consecutive_empty_fetches += 1;
        } else {
            self.page.consecutive_empty_fetches = 0;
        }
        if extracted == 0 {
            self.page.consecutive_extraction_failures += 1;
        } else {
            self.page.consecutive_extraction_failures = 0;
        }
    }

    fn advance(&mut self, next_link: Option<String>, load_more_control: bool) -> Vec<DriverEffect> {
        if self.page.structure == StructureType::Static && self.page.classified {
            return self.exhaust(ExhaustReason::StaticSinglePass);
        }
        if self.page.records_accepted >= self.limits.max_records {
            return self.exhaust(ExhaustReason::RecordCap);
        }
        if self.page.consecutive_empty_fetches >= self.limits.empty_streak_limit {
            return self.exhaust(ExhaustReason::EmptyStreak);
        }
        if self.page.cycles >= self.limits.max_cycles {
            return self.exhaust(ExhaustReason::CycleCap);
        }

        match self.page.structure {
            StructureType::InfiniteScroll => {
                let offset = match self.page.cursor {
                    Cursor::Scroll { offset } => offset + 1,
                    _ => 1,
                };
                self.page.cursor = Cursor::Scroll { offset };
            }
            StructureType::Paginated => {
                let number = match self.page.cursor {
                    Cursor::Page { number, .. } => number + 1,
                    _ => 2,
                };
                let locator = match next_link {
                    Some(link) => link,
                    None if load_more_control => self.target_url.clone(),
                    None => return self.exhaust(ExhaustReason::NoNextPage),
                };
                self.page.cursor = Cursor::Page { number, locator };
            }
            // Unknown structure re-fetches the same cursor and classifies again.
            StructureType::Unknown | StructureType::Static => {}
        }

        self.reclassify_due = self.page.consecutive_empty_fetches >= self.limits.reclassify_after;
        self.fetch_current()
    }

    fn fetch_current(&mut self) -> Vec<DriverEffect> {
        self.phase = DriverPhase::Fetching;
        let (locator, hint) = self.page.fetch_request(&self.target_url);
        vec![DriverEffect::Fetch { locator, hint }]
    }

    fn exhaust(&mut self, reason: ExhaustReason) -> Vec<DriverEffect> {
        self.phase = DriverPhase::Exhausted(reason);
        vec![DriverEffect::Finish(TargetOutcome::Exhausted {
            reason,
            page: self.page.clone(),
        })]
    }
}

fn is_terminal(phase: &DriverPhase) -> bool {
    matches!(
        phase,
        DriverPhase::Exhausted(_) | DriverPhase::Failed | DriverPhase::Interrupted
    )
}
