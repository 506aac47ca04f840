//! # Retry Backoff
//!
//! Deterministic exponential backoff for transient failures.
//!
//! Two shapes are used by the protocol services:
//!
//! - **Bounded** ([`BackoffPolicy::bounded`]): doubling delay, fixed
//!   attempt budget. Used for wallet operations like deposit publication,
//!   where exhaustion surfaces as a manual-intervention error.
//! - **Unbounded** ([`BackoffPolicy::unbounded`]): doubling delay capped
//!   at `max_delay`, retried forever. Used for payment-message resends,
//!   which only stop on an ack.

use crate::application::error::{ProtocolError, ProtocolResult};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    /// Zero means unlimited attempts.
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Creates a bounded policy.
    #[must_use]
    pub const fn bounded(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Creates an unbounded policy: delays double up to `max_delay`, and
    /// attempts never run out.
    #[must_use]
    pub const fn unbounded(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts: 0,
        }
    }

    /// Returns the delay before the given attempt (1-based).
    ///
    /// Attempt 1 runs immediately; attempt `n` waits
    /// `initial * 2^(n-2)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(2));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Returns true if another attempt is allowed after `attempts` tries.
    #[must_use]
    pub const fn allows(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }

    /// Runs `operation` under this policy.
    ///
    /// The closure receives the 1-based attempt number. Retryable errors
    /// are retried after the scheduled delay; non-retryable errors and
    /// budget exhaustion return the last error unchanged, classification
    /// into manual intervention is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut f: F) -> ProtocolResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ProtocolResult<T>>,
    {
        let mut attempt = 1u32;
        loop {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && self.allows(attempt) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        error = %err,
                        "transient failure, will retry"
                    );
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::bounded(Duration::from_secs(1), Duration::from_secs(60), 4)
    }
}
