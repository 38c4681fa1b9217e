//! Inbound port (driving): the filter API façade.

use async_trait::async_trait;

use crate::domain::error::FilterResult;
use crate::domain::types::{FilterChanges, FilterCriteria, FilterId, Log};

/// Filter API
///
/// Every call names the upstream node the gateway routed the request to.
/// Calls on an existing filter through a different node than the one it was
/// created on drop the filter and fail with `FilterNotFound`.
#[async_trait]
pub trait FilterApi: Send + Sync {
    /// `eth_newBlockFilter`
    async fn new_block_filter(&self, node_url: &str) -> FilterResult<FilterId>;

    /// `eth_newPendingTransactionFilter`
    async fn new_pending_transaction_filter(&self, node_url: &str) -> FilterResult<FilterId>;

    /// `eth_newFilter`
    async fn new_log_filter(&self, node_url: &str, criteria: FilterCriteria)
        -> FilterResult<FilterId>;

    /// `eth_uninstallFilter`. `Ok(false)` if the filter does not exist.
    async fn uninstall_filter(&self, node_url: &str, id: &FilterId) -> FilterResult<bool>;

    /// `eth_getFilterLogs`, log filters only
    async fn get_filter_logs(&self, node_url: &str, id: &FilterId) -> FilterResult<Vec<Log>>;

    /// `eth_getFilterChanges`
    async fn get_filter_changes(&self, node_url: &str, id: &FilterId)
        -> FilterResult<FilterChanges>;
}
