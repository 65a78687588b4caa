//! Run-level counters for operational diagnosis.
//!
//! Tracks how often identities rotated, how many ban events fired, and how
//! the per-asset fetches ended. Snapshots are cheap and safe to take while
//! the crawl is still running.

use std::sync::{Arc, Mutex};

/// Counters accumulated over one crawl-process run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub requests: u64,
    pub responses: u64,
    pub agent_rotations: u64,
    pub proxy_rotations: u64,
    pub ban_events: u64,
    pub retries: u64,
    pub assets_stored: u64,
    pub assets_failed: u64,
}

/// Thread-safe collector shared between the dispatcher and the fetch loop.
#[derive(Clone, Debug, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<RunStats>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut RunStats)) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        f(&mut guard);
    }

    pub fn record_request(&self) {
        self.update(|stats| stats.requests += 1);
    }

    pub fn record_response(&self) {
        self.update(|stats| stats.responses += 1);
    }

    pub fn record_agent_rotation(&self) {
        self.update(|stats| stats.agent_rotations += 1);
    }

    pub fn record_proxy_rotation(&self) {
        self.update(|stats| stats.proxy_rotations += 1);
    }

    pub fn record_ban(&self) {
        self.update(|stats| stats.ban_events += 1);
    }

    pub fn record_retry(&self) {
        self.update(|stats| stats.retries += 1);
    }

    pub fn record_asset_stored(&self) {
        self.update(|stats| stats.assets_stored += 1);
    }

    pub fn record_asset_failed(&self) {
        self.update(|stats| stats.assets_failed += 1);
    }

    pub fn snapshot(&self) -> RunStats {
        *self.inner.lock().expect("metrics lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_ban();
        metrics.record_asset_stored();

        let stats = metrics.snapshot();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.ban_events, 1);
        assert_eq!(stats.assets_stored, 1);
        assert_eq!(stats.retries, 0);
    }

    #[test]
    fn clones_share_state() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        clone.record_retry();
        assert_eq!(metrics.snapshot().retries, 1);
    }
}
