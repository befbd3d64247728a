//! # Backoff policy for resource restarts.
//!
//! [`BackoffPolicy`] controls how the minimum delay between two automatic
//! restarts of one resource grows within a restart episode. It is
//! parameterized by:
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::first`] the initial delay (normally the resource's
//!   configured `restart_delay`);
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay for attempt `n` is computed as `first × factor^n`, clamped to `max`.
//! The base delay is derived purely from the attempt number.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use imon::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Restart backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    #[serde(with = "crate::config::secs")]
    pub first: Duration,
    /// Maximum delay cap.
    #[serde(with = "crate::config::secs")]
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0`).
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `factor = 1.0` (constant delay);
    /// - `first = 0s`;
    /// - `max = 5min`.
    fn default() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::from_secs(300),
            factor: 1.0,
        }
    }
}

impl BackoffPolicy {
    /// Returns a copy with `first` replaced, keeping the growth parameters.
    pub fn with_first(mut self, first: Duration) -> Self {
        self.first = first;
        self
    }

    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// The result is `first × factor^attempt`, clamped to [`BackoffPolicy::max`].
    /// A `first` larger than `max` is honored as is: the resource asked for it.
    pub fn next(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.factor == 1.0 {
            return self.first;
        }
        let max_secs = self.max.max(self.first).as_secs_f64();
        let clamped_exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(clamped_exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max.max(self.first)
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }
}
