//! Retry with backoff for provider calls.

use crate::error::ProviderError;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// A provider call that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: ProviderError,
    },

    #[error("{operation} failed: {source}")]
    Fatal {
        operation: String,
        source: ProviderError,
    },
}

impl RetryError {
    /// The last provider error seen.
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal { source, .. } => source,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.provider_error().is_rate_limited()
    }
}

/// Backoff schedule: rate limits grow exponentially, other transient
/// failures linearly, fatal failures are not retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    unit: Duration,
}

impl RetryPolicy {
    /// Policy with one-second backoff units.
    pub fn new(max_attempts: u32) -> Self {
        Self::with_unit(max_attempts, Duration::from_secs(1))
    }

    pub fn with_unit(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retrying after a failure of `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32, error: &ProviderError) -> Duration {
        match error {
            ProviderError::RateLimited(_) => {
                let factor = 2f64.powi(attempt as i32) + f64::from(attempt) * 0.5;
                self.unit.mul_f64(factor)
            }
            ProviderError::Transient(_) => self.unit * (attempt + 1),
            ProviderError::Fatal(_) => Duration::ZERO,
        }
    }

    pub fn run<T, F>(&self, operation: &str, op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Result<T, ProviderError>,
    {
        self.run_observed(operation, op, |_, _, _| {})
    }

    /// Like [`RetryPolicy::run`], calling `on_retry(attempt, error, delay)`
    /// before each backoff sleep.
    pub fn run_observed<T, F, R>(&self, operation: &str, mut op: F, mut on_retry: R) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Result<T, ProviderError>,
        R: FnMut(u32, &ProviderError, Duration),
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if matches!(err, ProviderError::Fatal(_)) {
                return Err(RetryError::Fatal {
                    operation: operation.to_string(),
                    source: err,
                });
            }

            if attempt + 1 >= self.max_attempts {
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let delay = self.backoff(attempt, &err);
            warn!(
                "{} attempt {}/{} failed ({}), retrying in {:.1}s",
                operation,
                attempt + 1,
                self.max_attempts,
                err,
                delay.as_secs_f64()
            );
            on_retry(attempt, &err, delay);
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
