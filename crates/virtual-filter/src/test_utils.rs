//! Test utilities for the virtual filter layer.
//!
//! In-memory doubles for the outbound ports. Enable with the `test-utils`
//! feature flag.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use virtual_filter::test_utils::{MockConnector, MockFilterSystem};
//! use virtual_filter::{FilterApi, FilterApiService, FilterConfig};
//!
//! # tokio_test::block_on(async {
//! let connector = Arc::new(MockConnector::new());
//! let service = FilterApiService::new(
//!     FilterConfig::default(),
//!     connector.clone(),
//!     Arc::new(MockFilterSystem::new()),
//! )
//! .unwrap();
//!
//! let id = service.new_block_filter("http://node-a:8545").await.unwrap();
//! assert!(service.get_filter_changes("http://node-a:8545", &id).await.is_ok());
//! assert_eq!(connector.connect_count(), 1);
//! # });
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::{FilterError, FilterResult, NodeError};
use crate::domain::node::NodeIdentity;
use crate::domain::types::{
    Address, FilterChanges, FilterCriteria, FilterId, Hash, Log, RemoteFilterId,
};
use crate::ports::inbound::FilterApi;
use crate::ports::outbound::{FilterSystem, NodeClient, NodeConnector};

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
#[cfg(feature = "test-utils")]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A log with fixed, recognisable contents
pub fn sample_log() -> Log {
    Log {
        address: Address::repeat_byte(0xaa),
        topics: vec![Hash::repeat_byte(0x01)],
        data: vec![0xde, 0xad, 0xbe, 0xef],
        block_hash: Some(Hash::repeat_byte(0xbb)),
        block_number: Some(16),
        transaction_hash: Some(Hash::repeat_byte(0xcc)),
        log_index: Some(0),
        removed: false,
    }
}

// =============================================================================
// Node client
// =============================================================================

/// In-memory upstream node.
///
/// Filter ids are sequential. Hashes pushed with [`MockNodeClient::push_hashes`]
/// are handed to the next poll of any installed filter.
#[derive(Default)]
pub struct MockNodeClient {
    next_id: AtomicU64,
    installed: Mutex<HashSet<RemoteFilterId>>,
    pending_hashes: Mutex<Vec<Hash>>,
    fail_requests: AtomicBool,
    delay: Mutex<Option<Duration>>,
    uninstall_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent request fail with a request error
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent request
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Forget all filters, as a node does when they time out upstream
    pub fn expire_all(&self) {
        self.installed.lock().clear();
    }

    pub fn push_hashes(&self, hashes: Vec<Hash>) {
        self.pending_hashes.lock().extend(hashes);
    }

    pub fn installed_count(&self) -> usize {
        self.installed.lock().len()
    }

    pub fn uninstall_calls(&self) -> usize {
        self.uninstall_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    async fn begin_request(&self) -> Result<(), NodeError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(NodeError::Request("mock request failure".into()));
        }
        Ok(())
    }

    fn install(&self) -> RemoteFilterId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = RemoteFilterId::new(format!("0x{:x}", n));
        self.installed.lock().insert(id.clone());
        id
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn new_block_filter(&self) -> Result<RemoteFilterId, NodeError> {
        self.begin_request().await?;
        Ok(self.install())
    }

    async fn new_pending_transaction_filter(&self) -> Result<RemoteFilterId, NodeError> {
        self.begin_request().await?;
        Ok(self.install())
    }

    async fn uninstall_filter(&self, id: &RemoteFilterId) -> Result<bool, NodeError> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_request().await?;
        if self.installed.lock().remove(id) {
            Ok(true)
        } else {
            Err(NodeError::FilterNotFound)
        }
    }

    async fn get_filter_changes(&self, id: &RemoteFilterId) -> Result<FilterChanges, NodeError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.begin_request().await?;
        if !self.installed.lock().contains(id) {
            return Err(NodeError::FilterNotFound);
        }
        let hashes = std::mem::take(&mut *self.pending_hashes.lock());
        Ok(FilterChanges::Hashes(hashes))
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Hands out one [`MockNodeClient`] per node identity and counts
/// constructions.
#[derive(Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<NodeIdentity, Arc<MockNodeClient>>>,
    connects: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every construction take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` constructions
    pub fn fail_next_connects(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Number of constructions attempted so far
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// The client backing `node_url`, created on first reference
    pub fn client(&self, node_url: &str) -> Arc<MockNodeClient> {
        let identity = NodeIdentity::from_url(node_url);
        Arc::clone(
            self.clients
                .lock()
                .entry(identity)
                .or_insert_with(|| Arc::new(MockNodeClient::new())),
        )
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, node_url: &str) -> Result<Arc<dyn NodeClient>, NodeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(NodeError::Connection(format!("mock refused {}", node_url)));
        }

        let client: Arc<dyn NodeClient> = self.client(node_url);
        Ok(client)
    }
}

// =============================================================================
// Filter system
// =============================================================================

/// Filter system double that issues random handles and counts delegate
/// uninstalls per handle.
pub struct MockFilterSystem {
    installed: Mutex<HashSet<FilterId>>,
    uninstalls: Mutex<HashMap<FilterId, usize>>,
    fail_uninstall: AtomicBool,
    queries_not_found: AtomicBool,
    delay: Mutex<Option<Duration>>,
    logs: Vec<Log>,
}

impl Default for MockFilterSystem {
    fn default() -> Self {
        Self {
            installed: Mutex::new(HashSet::new()),
            uninstalls: Mutex::new(HashMap::new()),
            fail_uninstall: AtomicBool::new(false),
            queries_not_found: AtomicBool::new(false),
            delay: Mutex::new(None),
            logs: vec![sample_log()],
        }
    }
}

impl MockFilterSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uninstall(&self, fail: bool) {
        self.fail_uninstall.store(fail, Ordering::SeqCst);
    }

    /// Answer log queries with `FilterNotFound`
    pub fn set_queries_not_found(&self, not_found: bool) {
        self.queries_not_found.store(not_found, Ordering::SeqCst);
    }

    /// Delay every subsequent delegate uninstall
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of delegate uninstall calls made for `id`
    pub fn uninstall_count(&self, id: &FilterId) -> usize {
        self.uninstalls.lock().get(id).copied().unwrap_or(0)
    }

    pub fn is_installed(&self, id: &FilterId) -> bool {
        self.installed.lock().contains(id)
    }

    pub fn installed_count(&self) -> usize {
        self.installed.lock().len()
    }

    /// Logs returned by every query
    pub fn logs(&self) -> Vec<Log> {
        self.logs.clone()
    }
}

#[async_trait]
impl FilterSystem for MockFilterSystem {
    async fn delegate_new_filter(
        &self,
        _client: Arc<dyn NodeClient>,
        _criteria: &FilterCriteria,
    ) -> Result<FilterId, NodeError> {
        let id = FilterId::random();
        self.installed.lock().insert(id.clone());
        Ok(id)
    }

    async fn delegate_uninstall_filter(&self, id: &FilterId) -> Result<bool, NodeError> {
        *self.uninstalls.lock().entry(id.clone()).or_insert(0) += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(NodeError::Request("mock uninstall failure".into()));
        }
        Ok(self.installed.lock().remove(id))
    }

    async fn get_logs(
        &self,
        _client: Arc<dyn NodeClient>,
        _criteria: &FilterCriteria,
    ) -> Result<Vec<Log>, NodeError> {
        if self.queries_not_found.load(Ordering::SeqCst) {
            return Err(NodeError::FilterNotFound);
        }
        Ok(self.logs.clone())
    }

    async fn get_filter_logs(
        &self,
        _client: Arc<dyn NodeClient>,
        id: &FilterId,
        _criteria: &FilterCriteria,
    ) -> Result<Vec<Log>, NodeError> {
        if !self.installed.lock().contains(id) {
            return Err(NodeError::FilterNotFound);
        }
        Ok(self.logs.clone())
    }
}

// =============================================================================
// Filter API
// =============================================================================

/// `FilterApi` that only counts calls. Useful in front of gates and routers.
#[derive(Default)]
pub struct CountingFilterApi {
    calls: AtomicUsize,
    not_found: AtomicBool,
    last_criteria: Mutex<Option<FilterCriteria>>,
}

impl CountingFilterApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Answer every call with `FilterNotFound`
    pub fn set_not_found(&self, not_found: bool) {
        self.not_found.store(not_found, Ordering::SeqCst);
    }

    pub fn last_criteria(&self) -> Option<FilterCriteria> {
        self.last_criteria.lock().clone()
    }

    fn hit(&self) -> FilterResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.not_found.load(Ordering::SeqCst) {
            return Err(FilterError::FilterNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FilterApi for CountingFilterApi {
    async fn new_block_filter(&self, _node_url: &str) -> FilterResult<FilterId> {
        self.hit()?;
        Ok(FilterId::random())
    }

    async fn new_pending_transaction_filter(&self, _node_url: &str) -> FilterResult<FilterId> {
        self.hit()?;
        Ok(FilterId::random())
    }

    async fn new_log_filter(
        &self,
        _node_url: &str,
        criteria: FilterCriteria,
    ) -> FilterResult<FilterId> {
        self.hit()?;
        *self.last_criteria.lock() = Some(criteria);
        Ok(FilterId::random())
    }

    async fn uninstall_filter(&self, _node_url: &str, _id: &FilterId) -> FilterResult<bool> {
        self.hit()?;
        Ok(true)
    }

    async fn get_filter_logs(&self, _node_url: &str, _id: &FilterId) -> FilterResult<Vec<Log>> {
        self.hit()?;
        Ok(Vec::new())
    }

    async fn get_filter_changes(
        &self,
        _node_url: &str,
        _id: &FilterId,
    ) -> FilterResult<FilterChanges> {
        self.hit()?;
        Ok(FilterChanges::Hashes(Vec::new()))
    }
}
