//! Filter lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Filter layer metrics
#[derive(Debug, Default)]
pub struct FilterMetrics {
    pub filters_created: AtomicU64,
    pub filters_uninstalled: AtomicU64,
    /// Filters dropped because the client switched upstream node
    pub stale_evictions: AtomicU64,
    /// Filters dropped by the TTL sweeper
    pub expired_evictions: AtomicU64,
    /// Filters dropped because the upstream no longer knew them
    pub upstream_not_found: AtomicU64,
    /// Calls rejected by the admission gate
    pub rate_limited: AtomicU64,
    /// Failed attempts to release a log filter's delegate
    pub release_failures: AtomicU64,
}

impl FilterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&self) {
        self.filters_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_uninstalled(&self) {
        self.filters_uninstalled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: usize) {
        self.expired_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_upstream_not_found(&self) {
        self.upstream_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release_failure(&self) {
        self.release_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            filters_created: self.filters_created.load(Ordering::Relaxed),
            filters_uninstalled: self.filters_uninstalled.load(Ordering::Relaxed),
            stale_evictions: self.stale_evictions.load(Ordering::Relaxed),
            expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
            upstream_not_found: self.upstream_not_found.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`FilterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub filters_created: u64,
    pub filters_uninstalled: u64,
    pub stale_evictions: u64,
    pub expired_evictions: u64,
    pub upstream_not_found: u64,
    pub rate_limited: u64,
    pub release_failures: u64,
}
