//! Release of log filter delegates.
//!
//! A release runs on its own task, so a caller that gives up (client
//! disconnect, outer timeout) cannot cancel it half way. Releases that fail
//! are either handed back to the caller through a failure hook or parked in a
//! retry queue that the TTL sweeper drains on every tick.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::domain::error::NodeError;
use crate::domain::types::FilterId;
use crate::metrics::FilterMetrics;
use crate::ports::outbound::FilterSystem;

/// Run `call` on a detached task and wait for its result.
///
/// Dropping the returned future does not cancel `call`.
pub(crate) async fn run_detached<T, F>(call: F) -> Result<T, NodeError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, NodeError>> + Send + 'static,
{
    tokio::spawn(call)
        .await
        .map_err(|e| NodeError::Request(format!("upstream task failed: {}", e)))?
}

/// Releases log filter delegates in the filter system
pub struct DelegateReleaser {
    system: Arc<dyn FilterSystem>,
    metrics: Arc<FilterMetrics>,
    call_timeout: Duration,
    /// Delegates whose release failed and must be retried
    pending: Mutex<HashSet<FilterId>>,
}

impl DelegateReleaser {
    pub fn new(
        system: Arc<dyn FilterSystem>,
        metrics: Arc<FilterMetrics>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            system,
            metrics,
            call_timeout,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Release a delegate whose local record is already gone. On failure the
    /// delegate is queued for the sweeper to retry.
    pub async fn release(self: &Arc<Self>, id: FilterId) -> Result<bool, NodeError> {
        let this = Arc::clone(self);
        let queued = id.clone();
        self.release_with(id, move || this.enqueue(queued)).await
    }

    /// Release a delegate, running `on_failure` if the filter system could
    /// not confirm it. `on_failure` runs even if the caller has gone away.
    pub async fn release_with<F>(self: &Arc<Self>, id: FilterId, on_failure: F) -> Result<bool, NodeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let this = Arc::clone(self);
        run_detached(async move {
            let result = this.attempt(&id).await;
            if let Err(e) = &result {
                warn!(filter_id = %id, error = %e, "Failed to release log filter delegate");
                on_failure();
            }
            result
        })
        .await
    }

    /// Retry every queued release once. Returns how many succeeded.
    pub async fn retry_pending(&self) -> usize {
        let queued: Vec<FilterId> = self.pending.lock().drain().collect();
        if queued.is_empty() {
            return 0;
        }

        let mut released = 0;
        for id in queued {
            match self.attempt(&id).await {
                Ok(_) => {
                    released += 1;
                    debug!(filter_id = %id, "Released queued log filter delegate");
                }
                Err(e) => {
                    trace!(filter_id = %id, error = %e, "Queued delegate release failed again");
                    self.pending.lock().insert(id);
                }
            }
        }
        released
    }

    /// Number of delegates waiting for a retry
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn enqueue(&self, id: FilterId) {
        self.pending.lock().insert(id);
    }

    /// One uninstall attempt under the call timeout. A delegate the filter
    /// system no longer knows counts as released.
    async fn attempt(&self, id: &FilterId) -> Result<bool, NodeError> {
        let call = self.system.delegate_uninstall_filter(id);
        let result = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Err(NodeError::FilterNotFound)) => Ok(false),
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout),
        };
        if result.is_err() {
            self.metrics.record_release_failure();
        }
        result
    }
}
