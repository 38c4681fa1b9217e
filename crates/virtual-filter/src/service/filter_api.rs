//! Filter API Service
//!
//! Implements the `FilterApi` port on top of the filter table, the node client
//! pool and the filter system.
//!
//! ## Staleness
//!
//! A filter is bound to the node it was created on. The gateway may route a
//! later call for the same handle to another node (failover, rebalancing);
//! that node has never heard of the upstream filter, so the handle is treated
//! as gone: the record is dropped, a log filter's delegate is released, and
//! the caller gets `FilterNotFound` and is expected to recreate the filter.
//!
//! ## Uninstall
//!
//! Upstream uninstalls run on a detached task, so a caller that goes away
//! mid-call cannot leave an upstream filter behind without a local record.
//! If the upstream call fails or times out the record is put back and the
//! uninstall can be retried. Log delegates released on the stale and lazy
//! removal paths have no record to go back to; failed releases there are
//! queued and retried by the sweeper.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::adapters::NodeClientPool;
use crate::domain::config::{ConfigError, FilterConfig};
use crate::domain::error::{FilterError, FilterResult, NodeError};
use crate::domain::node::NodeIdentity;
use crate::domain::table::{FilterDelegate, FilterRecord, FilterTable};
use crate::domain::types::{FilterChanges, FilterCriteria, FilterId, FilterKind, Log};
use crate::metrics::FilterMetrics;
use crate::ports::inbound::FilterApi;
use crate::ports::outbound::{FilterSystem, NodeConnector};
use crate::service::release::{run_detached, DelegateReleaser};
use crate::service::sweeper::TtlSweeper;

/// Virtual filter service
///
/// Owns the TTL sweeper; it is spawned on construction, so the service must
/// be created inside a tokio runtime.
pub struct FilterApiService {
    table: Arc<FilterTable>,
    pool: NodeClientPool,
    system: Arc<dyn FilterSystem>,
    releaser: Arc<DelegateReleaser>,
    metrics: Arc<FilterMetrics>,
    config: FilterConfig,
    sweeper: Mutex<Option<TtlSweeper>>,
}

impl FilterApiService {
    /// Create a service with its own filter table
    pub fn new(
        config: FilterConfig,
        connector: Arc<dyn NodeConnector>,
        system: Arc<dyn FilterSystem>,
    ) -> Result<Self, ConfigError> {
        Self::with_table(config, Arc::new(FilterTable::new()), connector, system)
    }

    /// Create a service around an existing filter table
    pub fn with_table(
        config: FilterConfig,
        table: Arc<FilterTable>,
        connector: Arc<dyn NodeConnector>,
        system: Arc<dyn FilterSystem>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let metrics = Arc::new(FilterMetrics::new());
        let releaser = Arc::new(DelegateReleaser::new(
            Arc::clone(&system),
            Arc::clone(&metrics),
            config.upstream.request_timeout,
        ));
        let sweeper = TtlSweeper::spawn(
            Arc::clone(&table),
            Arc::clone(&releaser),
            Arc::clone(&metrics),
            config.ttl,
        );
        let pool = NodeClientPool::new(connector, config.upstream.request_timeout);

        Ok(Self {
            table,
            pool,
            system,
            releaser,
            metrics,
            config,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub fn table(&self) -> &Arc<FilterTable> {
        &self.table
    }

    pub fn pool(&self) -> &NodeClientPool {
        &self.pool
    }

    pub fn releaser(&self) -> &Arc<DelegateReleaser> {
        &self.releaser
    }

    pub fn metrics(&self) -> &Arc<FilterMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Number of live filters
    pub fn live_filters(&self) -> usize {
        self.table.len()
    }

    /// Stop the TTL sweeper. Filters are no longer evicted afterwards.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }

    /// Run an upstream call under the configured deadline
    async fn upstream<T, F>(&self, call: F) -> Result<T, NodeError>
    where
        F: Future<Output = Result<T, NodeError>>,
    {
        match tokio::time::timeout(self.request_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout),
        }
    }

    fn request_timeout(&self) -> Duration {
        self.config.upstream.request_timeout
    }

    fn install(&self, id: &FilterId, node: NodeIdentity, delegate: FilterDelegate) {
        let kind = delegate.kind();
        debug!(filter_id = %id, node = %node, kind = ?kind, "Installed filter");
        self.table.add(id.clone(), FilterRecord::new(node, delegate));
        self.metrics.record_created();
    }

    /// Fetch the record for `id` if it belongs to `node`. A record bound to
    /// another node is dropped.
    async fn checked_record(&self, node: &NodeIdentity, id: &FilterId) -> FilterResult<FilterRecord> {
        let record = self.table.get(id).ok_or(FilterError::FilterNotFound)?;
        if record.is_delegate_node(node) {
            return Ok(record);
        }
        if let Some(removed) = self.table.remove(id) {
            self.release_stale(node, id, removed).await;
        }
        Err(FilterError::FilterNotFound)
    }

    /// Cleanup for a stale record the caller has already removed
    async fn release_stale(&self, node: &NodeIdentity, id: &FilterId, record: FilterRecord) {
        info!(
            filter_id = %id,
            node = %node,
            bound_node = %record.node,
            kind = ?record.kind(),
            "Dropping filter bound to another node"
        );
        self.metrics.record_stale();

        if record.kind() == FilterKind::Log {
            // Queued for the sweeper on failure
            let _ = self.releaser.release(id.clone()).await;
        }
    }

    /// The upstream no longer knows the filter; forget it locally too
    async fn drop_unknown_upstream(&self, id: &FilterId) {
        let Some(record) = self.table.remove(id) else {
            return;
        };
        self.metrics.record_upstream_not_found();
        debug!(filter_id = %id, kind = ?record.kind(), "Upstream filter expired, dropped local record");

        if record.kind() == FilterKind::Log {
            let _ = self.releaser.release(id.clone()).await;
        }
    }
}

fn creation_failed(e: NodeError) -> FilterError {
    FilterError::UpstreamRequestFailed(e.to_string())
}

#[async_trait]
impl FilterApi for FilterApiService {
    async fn new_block_filter(&self, node_url: &str) -> FilterResult<FilterId> {
        let node = NodeIdentity::from_url(node_url);
        let client = self.pool.resolve(node_url).await?;
        let remote_id = self
            .upstream(client.new_block_filter())
            .await
            .map_err(creation_failed)?;

        let id = FilterId::random();
        self.install(&id, node, FilterDelegate::Block { remote_id });
        Ok(id)
    }

    async fn new_pending_transaction_filter(&self, node_url: &str) -> FilterResult<FilterId> {
        let node = NodeIdentity::from_url(node_url);
        let client = self.pool.resolve(node_url).await?;
        let remote_id = self
            .upstream(client.new_pending_transaction_filter())
            .await
            .map_err(creation_failed)?;

        let id = FilterId::random();
        self.install(&id, node, FilterDelegate::PendingTransaction { remote_id });
        Ok(id)
    }

    async fn new_log_filter(
        &self,
        node_url: &str,
        criteria: FilterCriteria,
    ) -> FilterResult<FilterId> {
        let node = NodeIdentity::from_url(node_url);
        let client = self.pool.resolve(node_url).await?;
        // The filter system issues the handle so it can map several client
        // filters onto one subscription
        let id = self
            .upstream(self.system.delegate_new_filter(client, &criteria))
            .await
            .map_err(creation_failed)?;

        self.install(&id, node, FilterDelegate::Log { criteria });
        Ok(id)
    }

    async fn uninstall_filter(&self, node_url: &str, id: &FilterId) -> FilterResult<bool> {
        let node = NodeIdentity::from_url(node_url);
        let Some(record) = self.table.get(id) else {
            trace!(filter_id = %id, "Uninstall of unknown filter");
            return Ok(false);
        };

        if !record.is_delegate_node(&node) {
            if let Some(removed) = self.table.remove(id) {
                self.release_stale(&node, id, removed).await;
            }
            return Err(FilterError::FilterNotFound);
        }

        // Connect before touching the table so a connection failure leaves it as is
        let remote = match &record.delegate {
            FilterDelegate::Log { .. } => None,
            FilterDelegate::Block { remote_id }
            | FilterDelegate::PendingTransaction { remote_id } => {
                Some((self.pool.resolve(node_url).await?, remote_id.clone()))
            }
        };

        // Only the caller that removes the record talks to the upstream
        let Some(record) = self.table.remove(id) else {
            return Ok(false);
        };
        debug!(filter_id = %id, node = %node, kind = ?record.kind(), "Uninstalling filter");

        let restore = {
            let table = Arc::clone(&self.table);
            let id = id.clone();
            move || table.add(id, record)
        };

        let result = match remote {
            None => self.releaser.release_with(id.clone(), restore).await,
            Some((client, remote_id)) => {
                let call_timeout = self.request_timeout();
                run_detached(async move {
                    let call = client.uninstall_filter(&remote_id);
                    let result = match tokio::time::timeout(call_timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(NodeError::Timeout),
                    };
                    match result {
                        // Already expired upstream
                        Ok(_) | Err(NodeError::FilterNotFound) => Ok(true),
                        Err(e) => {
                            restore();
                            Err(e)
                        }
                    }
                })
                .await
            }
        };

        match result {
            Ok(removed) => {
                self.metrics.record_uninstalled();
                Ok(removed)
            }
            Err(e) => {
                warn!(filter_id = %id, node = %node, error = %e, "Uninstall failed, filter kept");
                Err(FilterError::UpstreamRequestFailed(e.to_string()))
            }
        }
    }

    async fn get_filter_logs(&self, node_url: &str, id: &FilterId) -> FilterResult<Vec<Log>> {
        let node = NodeIdentity::from_url(node_url);

        // Wrong kind is reported before staleness and leaves the record alone
        match self.table.get(id) {
            Some(record) if record.kind() == FilterKind::Log => {}
            _ => return Err(FilterError::FilterNotFound),
        }

        let record = self.checked_record(&node, id).await?;
        let FilterDelegate::Log { criteria } = record.delegate else {
            return Err(FilterError::FilterNotFound);
        };

        let client = self.pool.resolve(node_url).await?;
        match self.upstream(self.system.get_logs(client, &criteria)).await {
            Ok(logs) => {
                trace!(filter_id = %id, count = logs.len(), "Fetched filter logs");
                Ok(logs)
            }
            Err(NodeError::FilterNotFound) => {
                self.drop_unknown_upstream(id).await;
                Err(FilterError::FilterNotFound)
            }
            Err(e) => Err(FilterError::from(e)),
        }
    }

    async fn get_filter_changes(
        &self,
        node_url: &str,
        id: &FilterId,
    ) -> FilterResult<FilterChanges> {
        let node = NodeIdentity::from_url(node_url);
        let record = self.checked_record(&node, id).await?;
        let client = self.pool.resolve(node_url).await?;

        let result = match &record.delegate {
            FilterDelegate::Log { criteria } => self
                .upstream(self.system.get_filter_logs(client, id, criteria))
                .await
                .map(FilterChanges::Logs),
            FilterDelegate::Block { remote_id }
            | FilterDelegate::PendingTransaction { remote_id } => {
                self.upstream(client.get_filter_changes(remote_id)).await
            }
        };

        match result {
            Ok(changes) => {
                self.table.refresh_access_time(id);
                debug!(filter_id = %id, node = %node, count = changes.len(), "Polled filter");
                Ok(changes)
            }
            Err(NodeError::FilterNotFound) => {
                self.drop_unknown_upstream(id).await;
                Err(FilterError::FilterNotFound)
            }
            Err(e) => Err(FilterError::UpstreamRequestFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Hash;
    use crate::test_utils::{MockConnector, MockFilterSystem};

    const NODE_A: &str = "http://node-a:8545";
    const NODE_B: &str = "http://node-b:8545";

    struct Harness {
        service: FilterApiService,
        connector: Arc<MockConnector>,
        system: Arc<MockFilterSystem>,
    }

    fn harness() -> Harness {
        let connector = Arc::new(MockConnector::new());
        let system = Arc::new(MockFilterSystem::new());
        let service = FilterApiService::new(
            FilterConfig::with_ttl(Duration::from_secs(60)),
            connector.clone(),
            system.clone(),
        )
        .unwrap();
        Harness {
            service,
            connector,
            system,
        }
    }

    #[tokio::test]
    async fn test_new_block_filter_records_node() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();

        let record = h.service.table().get(&id).unwrap();
        assert_eq!(record.kind(), FilterKind::Block);
        assert!(record.is_delegate_node(&NodeIdentity::from_url("NODE-A:8545")));
        assert_eq!(h.service.metrics().snapshot().filters_created, 1);
        assert_eq!(h.service.live_filters(), 1);
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let h = harness();
        let a = h.service.new_block_filter(NODE_A).await.unwrap();
        let b = h.service.new_block_filter(NODE_A).await.unwrap();
        let c = h.service.new_pending_transaction_filter(NODE_A).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(h.service.live_filters(), 3);
    }

    #[tokio::test]
    async fn test_creation_upstream_failure_leaves_table_empty() {
        let h = harness();
        h.connector.client(NODE_A).set_fail_requests(true);

        let result = h.service.new_block_filter(NODE_A).await;
        assert!(matches!(result, Err(FilterError::UpstreamRequestFailed(_))));
        assert!(h.service.table().is_empty());
    }

    #[tokio::test]
    async fn test_creation_without_connection() {
        let h = harness();
        h.connector.fail_next_connects(1);

        let result = h.service.new_pending_transaction_filter(NODE_A).await;
        assert!(matches!(result, Err(FilterError::UpstreamUnavailable(_))));
        assert!(h.service.table().is_empty());
    }

    #[tokio::test]
    async fn test_poll_block_filter() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        let client = h.connector.client(NODE_A);
        client.push_hashes(vec![Hash::repeat_byte(1), Hash::repeat_byte(2)]);

        let changes = h.service.get_filter_changes(NODE_A, &id).await.unwrap();
        assert_eq!(changes, FilterChanges::Hashes(vec![Hash::repeat_byte(1), Hash::repeat_byte(2)]));

        // Drained
        let changes = h.service.get_filter_changes(NODE_A, &id).await.unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_stale_block_filter_is_dropped() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();

        let result = h.service.get_filter_changes(NODE_B, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.service.table().get(&id).is_none());
        assert_eq!(h.service.metrics().snapshot().stale_evictions, 1);

        // Gone for node A too
        let result = h.service.get_filter_changes(NODE_A, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
    }

    #[tokio::test]
    async fn test_stale_uninstall_releases_log_delegate() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();

        let result = h.service.uninstall_filter(NODE_B, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert_eq!(h.system.uninstall_count(&id), 1);
        assert!(h.service.table().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_is_idempotent() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();

        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(true));
        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(false));
        assert_eq!(h.connector.client(NODE_A).uninstall_calls(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_expired_upstream_filter() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        h.connector.client(NODE_A).expire_all();

        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(true));
        assert!(h.service.table().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_not_found_drops_record() {
        let h = harness();
        let id = h.service.new_pending_transaction_filter(NODE_A).await.unwrap();
        h.connector.client(NODE_A).expire_all();

        let result = h.service.get_filter_changes(NODE_A, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.service.table().get(&id).is_none());
        assert_eq!(h.service.metrics().snapshot().upstream_not_found, 1);
    }

    #[tokio::test]
    async fn test_other_upstream_errors_keep_record() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        h.connector.client(NODE_A).set_fail_requests(true);

        let result = h.service.get_filter_changes(NODE_A, &id).await;
        assert!(matches!(result, Err(FilterError::UpstreamRequestFailed(_))));
        assert!(h.service.table().get(&id).is_some());
    }

    #[tokio::test]
    async fn test_log_filter_uses_system_handle() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();

        assert!(h.system.is_installed(&id));
        assert_eq!(h.service.table().get(&id).unwrap().kind(), FilterKind::Log);

        let changes = h.service.get_filter_changes(NODE_A, &id).await.unwrap();
        assert!(matches!(changes, FilterChanges::Logs(_)));

        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(true));
        assert_eq!(h.system.uninstall_count(&id), 1);
    }

    #[tokio::test]
    async fn test_get_filter_logs_wrong_kind_keeps_record() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();

        // Even via another node: the kind check comes first
        let result = h.service.get_filter_logs(NODE_B, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.service.table().get(&id).is_some());
    }

    #[tokio::test]
    async fn test_get_filter_logs() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();

        let logs = h.service.get_filter_logs(NODE_A, &id).await.unwrap();
        assert_eq!(logs.len(), h.system.logs().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_timeout_leaves_table_unchanged() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        h.connector
            .client(NODE_A)
            .set_delay(Duration::from_secs(60));

        let result = h.service.get_filter_changes(NODE_A, &id).await;
        assert!(matches!(result, Err(FilterError::UpstreamRequestFailed(_))));
        assert!(h.service.table().get(&id).is_some());
    }

    #[tokio::test]
    async fn test_get_filter_logs_from_other_node_drops_log_filter() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();

        let result = h.service.get_filter_logs(NODE_B, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.service.table().get(&id).is_none());
        assert_eq!(h.system.uninstall_count(&id), 1);
        assert_eq!(h.service.metrics().snapshot().stale_evictions, 1);
    }

    #[tokio::test]
    async fn test_get_filter_logs_upstream_not_found_drops_record() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();
        h.system.set_queries_not_found(true);

        let result = h.service.get_filter_logs(NODE_A, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.service.table().get(&id).is_none());
        assert_eq!(h.service.metrics().snapshot().upstream_not_found, 1);
        assert!(!h.system.is_installed(&id));
    }

    #[tokio::test]
    async fn test_failed_log_uninstall_can_be_retried() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();
        h.system.set_fail_uninstall(true);

        let result = h.service.uninstall_filter(NODE_A, &id).await;
        assert!(matches!(result, Err(FilterError::UpstreamRequestFailed(_))));
        assert!(h.service.table().get(&id).is_some());
        assert_eq!(h.service.metrics().snapshot().filters_uninstalled, 0);

        h.system.set_fail_uninstall(false);
        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(true));
        assert!(!h.system.is_installed(&id));
        assert!(h.service.table().is_empty());
        assert_eq!(h.system.uninstall_count(&id), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_stale_release_is_reclaimed_by_sweeper() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();
        h.system.set_fail_uninstall(true);

        let result = h.service.get_filter_changes(NODE_B, &id).await;
        assert_eq!(result, Err(FilterError::FilterNotFound));
        assert!(h.system.is_installed(&id));
        assert_eq!(h.service.releaser().pending_count(), 1);

        // First sweep at ttl / 2
        h.system.set_fail_uninstall(false);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!h.system.is_installed(&id));
        assert_eq!(h.service.releaser().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_log_uninstall_still_releases_delegate() {
        let h = harness();
        let id = h
            .service
            .new_log_filter(NODE_A, FilterCriteria::default())
            .await
            .unwrap();
        h.system.set_delay(Duration::from_secs(1));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), h.service.uninstall_filter(NODE_A, &id))
                .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!h.system.is_installed(&id));
        assert_eq!(h.system.uninstall_count(&id), 1);
        assert!(h.service.table().get(&id).is_none());
        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_block_uninstall_completes_upstream() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        let client = h.connector.client(NODE_A);
        client.set_delay(Duration::from_secs(1));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), h.service.uninstall_filter(NODE_A, &id))
                .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(client.installed_count(), 0);
        assert!(h.service.table().get(&id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uninstall_timeout_keeps_record() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        let client = h.connector.client(NODE_A);
        client.set_delay(Duration::from_secs(60));

        let result = h.service.uninstall_filter(NODE_A, &id).await;
        assert!(matches!(result, Err(FilterError::UpstreamRequestFailed(_))));
        assert!(h.service.table().get(&id).is_some());

        client.set_delay(Duration::ZERO);
        assert_eq!(h.service.uninstall_filter(NODE_A, &id).await, Ok(true));
        assert!(h.service.table().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_poll_leaves_table_unchanged() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        let last_access = h.service.table().get(&id).unwrap().last_access;
        h.connector
            .client(NODE_A)
            .set_delay(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), h.service.get_filter_changes(NODE_A, &id))
                .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let record = h.service.table().get(&id).unwrap();
        assert_eq!(record.last_access, last_access);
        assert_eq!(h.service.live_filters(), 1);
    }

    #[tokio::test]
    async fn test_oversized_ttl_rejected() {
        let result = FilterApiService::new(
            FilterConfig::with_ttl(Duration::from_secs(u64::MAX)),
            Arc::new(MockConnector::new()),
            Arc::new(MockFilterSystem::new()),
        );
        assert!(matches!(result, Err(ConfigError::InvalidTtl(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = FilterConfig::with_ttl(Duration::ZERO);
        let result = FilterApiService::new(
            config,
            Arc::new(MockConnector::new()),
            Arc::new(MockFilterSystem::new()),
        );
        assert!(matches!(result, Err(ConfigError::InvalidTtl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_eviction() {
        let h = harness();
        let id = h.service.new_block_filter(NODE_A).await.unwrap();
        h.service.shutdown().await;

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(h.service.table().get(&id).is_some());
    }
}
