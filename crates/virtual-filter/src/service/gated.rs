//! Admission-checked filter API.
//!
//! `GatedFilterApi` is shared by all requests; `for_client` binds it to the
//! caller so each call can be charged against that client's buckets. Batches
//! are charged once as a whole through [`ClientFilterApi::admit_batch`]
//! before their calls run.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::adapters::rate_limit::{admit_batch, admit_call, RateLimitGate};
use crate::domain::error::{FilterError, FilterResult};
use crate::domain::types::{FilterChanges, FilterCriteria, FilterId, Log};
use crate::metrics::FilterMetrics;
use crate::ports::inbound::FilterApi;
use crate::ports::outbound::{AdmissionGate, GateContext};

/// JSON-RPC method names, used as admission keys
pub mod methods {
    pub const NEW_BLOCK_FILTER: &str = "eth_newBlockFilter";
    pub const NEW_PENDING_TRANSACTION_FILTER: &str = "eth_newPendingTransactionFilter";
    pub const NEW_FILTER: &str = "eth_newFilter";
    pub const UNINSTALL_FILTER: &str = "eth_uninstallFilter";
    pub const GET_FILTER_LOGS: &str = "eth_getFilterLogs";
    pub const GET_FILTER_CHANGES: &str = "eth_getFilterChanges";
}

/// Filter API behind an admission gate
pub struct GatedFilterApi<A> {
    inner: Arc<A>,
    gate: Arc<dyn AdmissionGate>,
    metrics: Arc<FilterMetrics>,
    /// Idle bucket cleanup, aborted on drop
    cleanup: Option<JoinHandle<()>>,
}

impl<A: FilterApi> GatedFilterApi<A> {
    pub fn new(inner: Arc<A>, gate: Arc<dyn AdmissionGate>, metrics: Arc<FilterMetrics>) -> Self {
        Self {
            inner,
            gate,
            metrics,
            cleanup: None,
        }
    }

    /// Gate with a token bucket limiter whose idle buckets are dropped in the
    /// background. Must be called inside a tokio runtime.
    pub fn with_rate_limit(
        inner: Arc<A>,
        gate: Arc<RateLimitGate>,
        metrics: Arc<FilterMetrics>,
    ) -> Self {
        let cleanup = gate.spawn_cleanup();
        Self {
            inner,
            gate,
            metrics,
            cleanup: Some(cleanup),
        }
    }

    /// View of the API that charges calls to `ctx`
    pub fn for_client(&self, ctx: GateContext) -> ClientFilterApi<A> {
        ClientFilterApi {
            inner: Arc::clone(&self.inner),
            gate: Arc::clone(&self.gate),
            metrics: Arc::clone(&self.metrics),
            ctx,
        }
    }

    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }
}

impl<A> Drop for GatedFilterApi<A> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.abort();
        }
    }
}

/// `FilterApi` bound to one client. Rejected calls never reach the inner API.
pub struct ClientFilterApi<A> {
    inner: Arc<A>,
    gate: Arc<dyn AdmissionGate>,
    metrics: Arc<FilterMetrics>,
    ctx: GateContext,
}

impl<A> ClientFilterApi<A> {
    fn admit(&self, method: &str) -> FilterResult<()> {
        if admit_call(self.gate.as_ref(), &self.ctx, method) {
            return Ok(());
        }
        self.metrics.record_rate_limited();
        debug!(ip = %self.ctx.client_ip, method = method, "Rate limited");
        Err(FilterError::RateLimited)
    }

    /// Charge a batch of `len` calls. Each call is still admitted on its own
    /// when it runs.
    pub fn admit_batch(&self, len: usize) -> FilterResult<()> {
        if admit_batch(self.gate.as_ref(), &self.ctx, len) {
            return Ok(());
        }
        self.metrics.record_rate_limited();
        debug!(ip = %self.ctx.client_ip, len = len, "Batch rate limited");
        Err(FilterError::RateLimited)
    }

    pub fn context(&self) -> &GateContext {
        &self.ctx
    }
}

#[async_trait]
impl<A: FilterApi> FilterApi for ClientFilterApi<A> {
    async fn new_block_filter(&self, node_url: &str) -> FilterResult<FilterId> {
        self.admit(methods::NEW_BLOCK_FILTER)?;
        self.inner.new_block_filter(node_url).await
    }

    async fn new_pending_transaction_filter(&self, node_url: &str) -> FilterResult<FilterId> {
        self.admit(methods::NEW_PENDING_TRANSACTION_FILTER)?;
        self.inner.new_pending_transaction_filter(node_url).await
    }

    async fn new_log_filter(
        &self,
        node_url: &str,
        criteria: FilterCriteria,
    ) -> FilterResult<FilterId> {
        self.admit(methods::NEW_FILTER)?;
        self.inner.new_log_filter(node_url, criteria).await
    }

    async fn uninstall_filter(&self, node_url: &str, id: &FilterId) -> FilterResult<bool> {
        self.admit(methods::UNINSTALL_FILTER)?;
        self.inner.uninstall_filter(node_url, id).await
    }

    async fn get_filter_logs(&self, node_url: &str, id: &FilterId) -> FilterResult<Vec<Log>> {
        self.admit(methods::GET_FILTER_LOGS)?;
        self.inner.get_filter_logs(node_url, id).await
    }

    async fn get_filter_changes(
        &self,
        node_url: &str,
        id: &FilterId,
    ) -> FilterResult<FilterChanges> {
        self.admit(methods::GET_FILTER_CHANGES)?;
        self.inner.get_filter_changes(node_url, id).await
    }
}
