//! Provider health tracking.
//!
//! Shared read-mostly state consulted by the gateway's selection policy.
//! Counters are atomics; concurrent turns for different sessions update
//! them without a lock.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Health state for one configured provider.
#[derive(Debug, Default)]
pub struct ProviderHealth {
    consecutive_failures: AtomicU32,
    /// Unix seconds of the last successful call; 0 if never.
    last_success: AtomicI64,
    /// Unix seconds of the last failed call; 0 if never.
    last_failure: AtomicI64,
}

impl ProviderHealth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, now: DateTime<Utc>) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success.store(now.timestamp(), Ordering::Relaxed);
    }

    pub fn record_failure(&self, now: DateTime<Utc>) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(now.timestamp(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        match self.last_success.load(Ordering::Relaxed) {
            0 => None,
            secs => DateTime::from_timestamp(secs, 0),
        }
    }

    /// Whether the provider should be attempted. Below the failure
    /// threshold it always is; at or above, it is skipped until the
    /// cooldown has elapsed since the last failure, after which one probe
    /// is allowed through.
    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>, threshold: u32, cooldown: Duration) -> bool {
        if self.consecutive_failures.load(Ordering::Relaxed) < threshold {
            return true;
        }
        let last_failure = self.last_failure.load(Ordering::Relaxed);
        now.timestamp() - last_failure >= cooldown.as_secs() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fresh_provider_is_available() {
        let health = ProviderHealth::new();
        assert!(health.is_available(at(0), 3, Duration::from_secs(60)));
    }

    #[test]
    fn test_threshold_failures_trigger_cooldown_skip() {
        let health = ProviderHealth::new();
        for _ in 0..3 {
            health.record_failure(at(0));
        }
        assert!(!health.is_available(at(30), 3, Duration::from_secs(60)));
        assert!(health.is_available(at(60), 3, Duration::from_secs(60)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let health = ProviderHealth::new();
        for _ in 0..5 {
            health.record_failure(at(0));
        }
        health.record_success(at(1));
        assert_eq!(health.consecutive_failures(), 0);
        assert!(health.is_available(at(2), 3, Duration::from_secs(60)));
        assert_eq!(health.last_success(), Some(at(1)));
    }

    #[test]
    fn test_failed_probe_refreshes_cooldown() {
        let health = ProviderHealth::new();
        for _ in 0..3 {
            health.record_failure(at(0));
        }
        health.record_failure(at(61));
        assert!(!health.is_available(at(90), 3, Duration::from_secs(60)));
        assert!(health.is_available(at(121), 3, Duration::from_secs(60)));
    }
}
