//! Hour-window rate limiter
//!
//! Counting window keyed by feature name and wall-clock hour
//! (`rate_<feature>_<YYYY-MM-DD-HH>`), backed by the settings store's atomic
//! counter. Counts never carry over between hours, so a burst straddling a
//! boundary can reach 2x the threshold across the two windows - an accepted
//! tradeoff of the windowing scheme.

use crate::store::KvStore;
use chrono::{DateTime, Duration, Utc};
use ltrk_common::{time, Result};

#[derive(Clone)]
pub struct RateLimiter {
    kv: KvStore,
}

impl RateLimiter {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Count one call against the current window and report whether it was
    /// within the threshold
    ///
    /// Returns `true` when the pre-increment count was below `threshold`.
    /// `threshold <= 0` means unlimited: always allowed, but the counter
    /// still increments for observability.
    pub async fn check(&self, feature: &str, threshold: i64) -> Result<bool> {
        self.check_at(feature, threshold, time::now()).await
    }

    /// Window logic with an explicit clock, used directly by tests
    pub async fn check_at(
        &self,
        feature: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let key = window_counter_key(feature, now);
        let count = self.kv.increment(&key, Some(Duration::hours(1))).await?;

        Ok(threshold <= 0 || count - 1 < threshold)
    }

    /// Clear the current window's counter
    pub async fn reset(&self, feature: &str) -> Result<()> {
        self.reset_at(feature, time::now()).await
    }

    /// Clear a specific window's counter
    pub async fn reset_at(&self, feature: &str, now: DateTime<Utc>) -> Result<()> {
        self.kv.delete(&window_counter_key(feature, now)).await
    }
}

/// Counter key for a feature's current hour window
pub fn window_counter_key(feature: &str, now: DateTime<Utc>) -> String {
    format!("rate_{}_{}", feature, time::hour_window_key(now))
}
