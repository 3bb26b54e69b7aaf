//! Backoff policy for backend streaming attempts.
//!
//! The wait before retry `n + 1` is `unit * 2^n` where `n` is the zero-based
//! index of the failed attempt. Session failures re-handshake and retry
//! without waiting; the caller decides that via [`crate::ProxyError::backs_off`].

use std::time::Duration;

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt)
    pub max_attempts: u32,
    /// One backoff time-unit; the first wait is exactly this long
    pub backoff_unit: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A budget of zero is raised to one; every request gets one attempt.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
            ..Self::default()
        }
    }

    /// Delay after the zero-based `attempt` failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_unit
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Attempts to make, never fewer than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt follows the zero-based `attempt`.
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts()
    }
}
