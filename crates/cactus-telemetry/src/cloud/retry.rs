//! Retry with exponential backoff and jitter for cloud uploads.

use std::time::Duration;

use super::circuit_breaker::CircuitBreaker;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u32 = 500;
const DEFAULT_MAX_DELAY_MS: u32 = 5000;
const DEFAULT_JITTER_FACTOR: f32 = 0.3;

/// How many times, and how far apart, a batch upload is attempted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds.
    pub initial_delay_ms: u32,
    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u32,
    /// Jitter factor (0.0 to 1.0); the delay is randomized by ±(factor * delay).
    pub jitter_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with no delay.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before the given attempt (0-indexed).
    ///
    /// Attempt 0 never waits; attempt `n` waits `initial_delay * 2^(n-1)`,
    /// capped at `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(10);
        let capped_ms = self
            .initial_delay_ms
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay_ms);

        let jitter_range = (capped_ms as f32 * self.jitter_factor.clamp(0.0, 1.0)) as u32;
        let delay_ms = if jitter_range > 0 {
            let jitter = jitter_seed() % (jitter_range * 2 + 1);
            capped_ms.saturating_sub(jitter_range).saturating_add(jitter)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms as u64)
    }
}

/// Errors that know whether another attempt could succeed.
pub trait RetryableError {
    /// True for transient failures (timeouts, 429, 502-504, connection resets).
    fn is_retryable(&self) -> bool;

    /// Server-requested delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration>;
}

/// Result of [`send_with_retry`].
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// The operation succeeded.
    Delivered,
    /// The operation failed with a non-retryable error.
    Rejected(E),
    /// Every attempt failed with a retryable error.
    Exhausted { last_error: E, attempts: u32 },
    /// The circuit breaker refused the attempt.
    CircuitOpen,
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts, or the circuit breaker opens.
///
/// Every attempt result is reported to `circuit`.
pub fn send_with_retry<E, F>(
    policy: &RetryPolicy,
    circuit: &CircuitBreaker,
    mut operation: F,
) -> RetryOutcome<E>
where
    E: RetryableError,
    F: FnMut() -> Result<(), E>,
{
    let mut last_error: Option<E> = None;
    let mut attempts = 0;

    for attempt in 0..policy.max_attempts.max(1) {
        if !circuit.can_send() {
            return match last_error {
                Some(last_error) => RetryOutcome::Exhausted {
                    last_error,
                    attempts,
                },
                None => RetryOutcome::CircuitOpen,
            };
        }

        let delay = last_error
            .as_ref()
            .and_then(RetryableError::retry_after)
            .unwrap_or_else(|| policy.delay_for_attempt(attempt));
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        attempts += 1;
        match operation() {
            Ok(()) => {
                circuit.record_success();
                return RetryOutcome::Delivered;
            }
            Err(err) => {
                if !err.is_retryable() {
                    // Client-side rejections say nothing about endpoint health.
                    circuit.record_success();
                    return RetryOutcome::Rejected(err);
                }
                if err.retry_after().is_some() {
                    circuit.record_rate_limited();
                } else {
                    circuit.record_failure();
                }
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(last_error) => RetryOutcome::Exhausted {
            last_error,
            attempts,
        },
        None => RetryOutcome::CircuitOpen,
    }
}

fn jitter_seed() -> u32 {
    uuid::Uuid::new_v4().as_u128() as u32
}
