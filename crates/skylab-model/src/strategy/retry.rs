use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff applied to transient transport errors.
///
/// Attempt `n` (0-based retry index) waits `first_ms * factor^n`, capped at `max_ms`.
/// The defaults wait 15 s, 22.5 s and 33.75 s before giving up, so one call
/// is attempted at most four times.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
    pub retries: u32,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Total number of attempts a call may make.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = if self.factor.is_finite() && self.factor >= 1.0 {
            self.factor
        } else {
            1.0
        };
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let raw = self.first_ms as f64 * factor.powi(exp);
        let capped = raw.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_ms: 15_000,
            max_ms: 60_000,
            factor: 1.5,
            retries: 3,
        }
    }
}
