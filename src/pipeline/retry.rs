//! Bounded retry around a single probe.
//!
//! Transient failures (the page could not be reached or rendered) are
//! retried after a fixed delay and end in `Unknown` once attempts run
//! out. Any other failure ends the check at once as `Unavailable`.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::models::{AvailabilityState, RetryConfig};
use crate::utils::{Clock, Shutdown};

/// Retry configuration for one probe.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    max_attempts: u32,
    /// Pause between attempts
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.delay_secs))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `probe` until it succeeds, fails for good, or attempts run out.
    ///
    /// `probe` receives the 1-based attempt number. Never fails: a stop
    /// requested through `shutdown` while waiting also yields `Unknown`.
    pub async fn run<F, Fut>(
        &self,
        clock: &dyn Clock,
        shutdown: &mut Shutdown,
        mut probe: F,
    ) -> AvailabilityState
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<AvailabilityState>>,
    {
        for attempt in 1..=self.max_attempts {
            match probe(attempt).await {
                Ok(state) => return state,
                Err(e) if e.is_transient() => {
                    log::warn!(
                        "Network error (attempt {}/{}): {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if attempt == self.max_attempts {
                        break;
                    }
                    if !shutdown.sleep(clock, self.delay).await {
                        log::info!("Retry abandoned: shutdown requested");
                        return AvailabilityState::Unknown;
                    }
                }
                Err(e) => {
                    log::error!("Unexpected error while probing: {}", e);
                    return AvailabilityState::Unavailable;
                }
            }
        }

        log::warn!("All {} attempts exhausted", self.max_attempts);
        AvailabilityState::Unknown
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
