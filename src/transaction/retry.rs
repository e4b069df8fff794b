//! Exponential backoff for retryable failures
//!
//! The delay before retry `n` (0-based) is
//! `min(initial_delay_ms * multiplier^n, max_delay_ms)`, optionally scaled by
//! a random factor in `[1 - jitter, 1 + jitter]` and capped again.
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::driver::errors::ErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_delay_bounds"))]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[validate(range(min = 1, max = 100, message = "max_attempts must be between 1 and 100"))]
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[validate(range(min = 1.0, max = 10.0, message = "multiplier must be between 1.0 and 10.0"))]
    pub multiplier: f64,
    /// Fraction of the delay to randomize; 0 disables jitter
    #[validate(range(min = 0.0, max = 1.0, message = "jitter must be between 0.0 and 1.0"))]
    pub jitter: f64,
}

fn validate_delay_bounds(policy: &RetryPolicy) -> Result<(), ValidationError> {
    if policy.initial_delay_ms > policy.max_delay_ms {
        let mut err = ValidationError::new("delay_bounds");
        err.message = Some("initial_delay_ms cannot exceed max_delay_ms".into());
        return Err(err);
    }
    Ok(())
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Same connection is fine; wait and run again
    Retry(Duration),
    /// Drop the connection, wait, then run again on a fresh one
    Reconnect(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Never retries
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Deterministic delay before retry `retry_index` (0 = first retry)
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped.round() as u64)
    }

    /// `backoff_delay` with jitter applied
    pub fn delay_for<R: Rng + ?Sized>(&self, retry_index: u32, rng: &mut R) -> Duration {
        let base = self.backoff_delay(retry_index);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rng.random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        let jittered = (base.as_millis() as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(jittered.max(0.0).round() as u64)
    }

    /// Delays for every retry this policy allows
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|i| self.backoff_delay(i)).collect()
    }

    /// What to do after attempt number `attempts_made` (1-based) failed
    pub fn decide(&self, kind: ErrorKind, attempts_made: u32) -> RetryDecision {
        if !kind.is_retryable() || attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = self.delay_for(attempts_made.saturating_sub(1), &mut rand::rng());
        if kind.requires_reconnect() {
            RetryDecision::Reconnect(delay)
        } else {
            RetryDecision::Retry(delay)
        }
    }
}
