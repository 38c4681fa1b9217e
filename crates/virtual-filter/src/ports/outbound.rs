//! Outbound ports (driven): upstream nodes, the log filter system and the
//! admission gate.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

use crate::domain::error::NodeError;
use crate::domain::types::{FilterChanges, FilterCriteria, FilterId, Log, RemoteFilterId};

/// Connection handle to one upstream full node.
///
/// Errors must report an expired or unknown upstream filter as
/// [`NodeError::FilterNotFound`] so the caller can drop its local record.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// `eth_newBlockFilter`
    async fn new_block_filter(&self) -> Result<RemoteFilterId, NodeError>;

    /// `eth_newPendingTransactionFilter`
    async fn new_pending_transaction_filter(&self) -> Result<RemoteFilterId, NodeError>;

    /// `eth_uninstallFilter`
    async fn uninstall_filter(&self, id: &RemoteFilterId) -> Result<bool, NodeError>;

    /// `eth_getFilterChanges`
    async fn get_filter_changes(&self, id: &RemoteFilterId) -> Result<FilterChanges, NodeError>;
}

/// Builds node clients. One call is one connection construction.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, node_url: &str) -> Result<Arc<dyn NodeClient>, NodeError>;
}

/// Log filter delegation service.
///
/// May consolidate several client log filters onto a single upstream
/// subscription; the filter layer only ever addresses it by handle.
#[async_trait]
pub trait FilterSystem: Send + Sync {
    /// Create (or join) a delegate subscription for `criteria` on `client`.
    /// Returns the handle under which the client filter is known.
    async fn delegate_new_filter(
        &self,
        client: Arc<dyn NodeClient>,
        criteria: &FilterCriteria,
    ) -> Result<FilterId, NodeError>;

    /// Release the delegate subscription behind `id`.
    async fn delegate_uninstall_filter(&self, id: &FilterId) -> Result<bool, NodeError>;

    /// One-shot log query.
    async fn get_logs(
        &self,
        client: Arc<dyn NodeClient>,
        criteria: &FilterCriteria,
    ) -> Result<Vec<Log>, NodeError>;

    /// Logs matching the filter since it was last polled.
    async fn get_filter_logs(
        &self,
        client: Arc<dyn NodeClient>,
        id: &FilterId,
        criteria: &FilterCriteria,
    ) -> Result<Vec<Log>, NodeError>;
}

/// Caller information available to the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateContext {
    pub client_ip: IpAddr,
}

impl GateContext {
    pub fn new(client_ip: IpAddr) -> Self {
        Self { client_ip }
    }
}

/// Per-request admission control, evaluated before a call reaches the
/// filter API.
pub trait AdmissionGate: Send + Sync {
    /// True if the client may spend `weight` units against `key`.
    fn allow(&self, ctx: &GateContext, key: &str, weight: u32) -> bool;

    /// True if the client bypasses limits altogether.
    fn is_whitelisted(&self, _ctx: &GateContext) -> bool {
        false
    }
}
