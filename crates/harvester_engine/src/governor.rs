//! Adaptive pacing and retry for fetches against one site.
//!
//! A single `Governor` is shared by every worker (`Arc<Governor>`), so a block
//! seen by one worker slows all of them down.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use harvester_core::{FetchHint, GovernorState};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::{FetchError, FetchErrorKind, Fetcher, PageContent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernorSettings {
    pub base_delay: Duration,
    pub ceiling: Duration,
    /// Attempts per `execute` call, first try included.
    pub max_attempts: u32,
    /// Upper bound on one fetch attempt.
    pub fetch_timeout: Duration,
    /// Add `uniform(0, base_delay)` to every wait.
    pub jitter: bool,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
            max_attempts: 5,
            fetch_timeout: Duration::from_secs(45),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    #[error("{0}")]
    NotFound(FetchError),
    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetryBudgetExhausted { attempts: u32, last: FetchError },
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct Governor {
    settings: GovernorSettings,
    state: Mutex<GovernorState>,
}

impl Governor {
    pub fn new(settings: GovernorSettings) -> Self {
        let state = GovernorState {
            current_delay: settings.base_delay,
            consecutive_failures: 0,
        };
        Self {
            settings,
            state: Mutex::new(state),
        }
    }

    pub fn settings(&self) -> &GovernorSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> GovernorState {
        *self.lock()
    }

    /// Adopts pacing saved by an earlier session, clamped to this governor's bounds.
    pub fn restore(&self, saved: GovernorState) {
        let mut state = self.lock();
        state.current_delay = saved
            .current_delay
            .clamp(self.settings.base_delay, self.ceiling());
        state.consecutive_failures = saved.consecutive_failures;
    }

    /// Fetches `locator`, pacing before every attempt and retrying transient failures.
    pub async fn execute(
        &self,
        locator: &str,
        hint: &FetchHint,
        fetcher: &dyn Fetcher,
        cancel: &CancellationToken,
    ) -> Result<PageContent, GovernorError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let wait = self.next_wait();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GovernorError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GovernorError::Cancelled),
                result = tokio::time::timeout(self.settings.fetch_timeout, fetcher.fetch(locator, hint)) => result,
            };
            let result = match result {
                Ok(Ok(page)) if page.html.trim().is_empty() => Err(FetchError::new(
                    FetchErrorKind::Blocked,
                    "empty content",
                )),
                Ok(result) => result,
                Err(_) => Err(FetchError::new(
                    FetchErrorKind::Timeout,
                    format!("no response within {:?}", self.settings.fetch_timeout),
                )),
            };

            match result {
                Ok(page) => {
                    self.on_success();
                    return Ok(page);
                }
                Err(err) if err.kind == FetchErrorKind::NotFound => {
                    return Err(GovernorError::NotFound(err));
                }
                Err(err) => {
                    let state = self.on_failure();
                    engine_warn!(
                        "{locator}: attempt {attempt}/{max_attempts} failed ({err}); delay now {:?}",
                        state.current_delay
                    );
                    if attempt >= max_attempts {
                        return Err(GovernorError::RetryBudgetExhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                }
            }
        }
    }

    fn next_wait(&self) -> Duration {
        let delay = self.lock().current_delay;
        let base_ms = self.settings.base_delay.as_millis() as u64;
        if !self.settings.jitter || base_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=base_ms))
    }

    fn on_success(&self) {
        let base = self.settings.base_delay;
        let mut state = self.lock();
        let above = state.current_delay.saturating_sub(base);
        state.current_delay = base + above / 2;
        state.consecutive_failures = 0;
        engine_debug!("fetch ok; delay decays to {:?}", state.current_delay);
    }

    fn on_failure(&self) -> GovernorState {
        let ceiling = self.ceiling();
        let mut state = self.lock();
        state.current_delay = state.current_delay.saturating_mul(2).min(ceiling);
        state.consecutive_failures += 1;
        *state
    }

    fn ceiling(&self) -> Duration {
        self.settings.ceiling.max(self.settings.base_delay)
    }

    fn lock(&self) -> MutexGuard<'_, GovernorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
