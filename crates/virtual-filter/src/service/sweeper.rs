//! TTL sweeper: evicts filters nobody has polled for a while.
//!
//! Runs every `ttl / 2`, so a filter is gone at most 1.5 × ttl after its last
//! poll. Evicted log filters also release their delegate subscription in the
//! filter system, and delegate releases that failed earlier are retried on
//! every tick. Block and pending transaction filters are simply forgotten and
//! left to expire on their upstream node.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use crate::domain::table::FilterTable;
use crate::domain::types::FilterKind;
use crate::metrics::FilterMetrics;
use crate::service::release::DelegateReleaser;

/// Handle to a running sweeper task.
///
/// The task stops on [`TtlSweeper::stop`] or when the handle is dropped.
pub struct TtlSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl TtlSweeper {
    /// Spawn the sweeper on the current tokio runtime.
    pub fn spawn(
        table: Arc<FilterTable>,
        releaser: Arc<DelegateReleaser>,
        metrics: Arc<FilterMetrics>,
        ttl: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = SweepTask {
            table,
            releaser,
            metrics,
            ttl,
        };
        let handle = tokio::spawn(task.run(shutdown_rx));

        debug!(ttl_ms = ttl.as_millis() as u64, "Started filter TTL sweeper");

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Filter sweeper task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for TtlSweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

struct SweepTask {
    table: Arc<FilterTable>,
    releaser: Arc<DelegateReleaser>,
    metrics: Arc<FilterMetrics>,
    ttl: Duration,
}

impl SweepTask {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let period = self.ttl / 2;
        let Some(first_tick) = Instant::now().checked_add(period) else {
            error!(ttl_ms = self.ttl.as_millis() as u64, "Filter TTL too large, sweeper not started");
            return;
        };
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                // Either a stop signal or the handle was dropped
                _ = shutdown_rx.changed() => break,
            }
        }

        debug!("Filter TTL sweeper stopped");
    }

    async fn sweep_once(&self) -> usize {
        let retried = self.releaser.retry_pending().await;
        if retried > 0 {
            debug!(count = retried, "Released queued log filter delegates");
        }

        let expired = self.table.sweep_expired(self.ttl);
        if expired.is_empty() {
            trace!("No expired filters");
            return 0;
        }

        let count = expired.len();
        self.metrics.record_expired(count);
        debug!(count = count, remaining = self.table.len(), "Evicted expired filters");

        for (id, record) in expired {
            if record.kind() != FilterKind::Log {
                continue;
            }
            // Failures are queued for the next tick
            if self.releaser.release(id.clone()).await.is_ok() {
                trace!(filter_id = %id, node = %record.node, "Released delegate of expired log filter");
            }
        }

        count
    }
}
