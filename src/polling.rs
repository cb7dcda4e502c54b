// Fixed-interval polling driver
// Shared by search polling (until offers appear) and reservation polling
// (until the status resolves).

use crate::api_client::ApiError;
use crate::config::PollConfig;
use crate::models::{Reservation, SearchPage, SearchResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a single polling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// Nothing terminal yet, try again after the delay.
    Pending,
    Ready(T),
    /// The producer cannot make further progress; stop without using the rest of the budget.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

// Injected so tests can poll on a virtual clock
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
}

/// Calls `attempt` until it yields `Ready`, sleeping `policy.delay` between
/// non-terminal attempts.
///
/// Ready on attempt `k` means exactly `k` calls and `k - 1` sleeps. When the
/// budget runs out (or the attempt reports `Exhausted`) the result is
/// `ApiError::PollTimeout` carrying the number of calls made. Errors returned by
/// an attempt end the loop immediately; they are never retried here.
pub async fn poll_until<T, S, F, Fut>(
    policy: &PollPolicy,
    sleeper: &S,
    mut attempt: F,
) -> Result<Polled<T>, ApiError>
where
    S: Sleeper + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollOutcome<T>, ApiError>>,
{
    for attempt_no in 1..=policy.max_attempts {
        match attempt(attempt_no).await? {
            PollOutcome::Ready(value) => {
                debug!(attempts = attempt_no, "poll resolved");
                return Ok(Polled {
                    value,
                    attempts: attempt_no,
                });
            }
            PollOutcome::Exhausted => {
                warn!(attempts = attempt_no, "poll producer exhausted");
                return Err(ApiError::PollTimeout {
                    attempts: attempt_no,
                });
            }
            PollOutcome::Pending => {
                if attempt_no < policy.max_attempts {
                    sleeper.sleep(policy.delay).await;
                }
            }
        }
    }

    warn!(attempts = policy.max_attempts, "poll budget used up");
    Err(ApiError::PollTimeout {
        attempts: policy.max_attempts,
    })
}

// How poll-search pages are combined and when the search counts as done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPollMode {
    /// Each page replaces the previous one; done once a page has offers
    /// or the API says nothing more is coming.
    #[default]
    FirstResults,
    /// Pages are appended until the API reports `more_coming == false`.
    UntilComplete,
}

#[derive(Debug)]
pub struct SearchTracker {
    mode: SearchPollMode,
    collected: Vec<SearchResult>,
}

impl SearchTracker {
    pub fn new(mode: SearchPollMode) -> Self {
        Self {
            mode,
            collected: Vec::new(),
        }
    }

    pub fn absorb(&mut self, page: SearchPage) -> PollOutcome<Vec<SearchResult>> {
        match self.mode {
            SearchPollMode::FirstResults => {
                self.collected = page.results;
                if !self.collected.is_empty() || !page.more_coming {
                    PollOutcome::Ready(self.collected.clone())
                } else {
                    PollOutcome::Pending
                }
            }
            SearchPollMode::UntilComplete => {
                self.collected.extend(page.results);
                if page.more_coming {
                    PollOutcome::Pending
                } else {
                    PollOutcome::Ready(self.collected.clone())
                }
            }
        }
    }
}

// Follows a reservation until it leaves `Pending`
#[derive(Debug)]
pub struct ReservationTracker {
    current: Reservation,
}

impl ReservationTracker {
    pub fn new(booked: Reservation) -> Self {
        Self { current: booked }
    }

    pub fn current(&self) -> &Reservation {
        &self.current
    }

    pub fn absorb(&mut self, snapshot: Reservation) -> Result<PollOutcome<Reservation>, ApiError> {
        self.current.observe(snapshot)?;
        if self.current.status.is_terminal() {
            Ok(PollOutcome::Ready(self.current.clone()))
        } else {
            Ok(PollOutcome::Pending)
        }
    }
}

// Sleeper that records requested naps and returns immediately
#[cfg(test)]
pub(crate) mod virtual_clock {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingSleeper {
        naps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn naps(&self) -> Vec<Duration> {
            self.naps.lock().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.naps.lock().push(duration);
        }
    }
}
