//! Exponential backoff with jitter.
//!
//! Used for neighbor dispatch in the propagation consumer and for each
//! cell of a rectangle fill. Attempt `n` (1-based) that fails with a
//! retryable error sleeps `initial * 2^(n-1) + jitter`, capped at
//! `max_delay`, before attempt `n + 1`.

use core::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_delay: Duration,
    /// Cap on a single backoff.
    pub max_delay: Duration,
    /// Upper bound of the random jitter.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff after failed attempt `attempt`, without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Backoff after failed attempt `attempt`, with jitter, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.base_delay(attempt)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with an error
    /// `is_retryable` rejects, or attempts run out. The last error is
    /// returned.
    pub async fn run<T, E, F, Fut>(
        &self,
        what: &str,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1_u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = what,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
