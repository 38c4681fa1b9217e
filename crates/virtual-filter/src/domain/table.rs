//! Filter table: the authoritative map from client handle to filter record.
//!
//! Every operation takes the table lock exactly once, so each operation is
//! atomic with respect to the others. Nothing here touches the network;
//! callers copy what they need out of a record and talk to upstreams after
//! the lock is released.

use crate::domain::node::NodeIdentity;
use crate::domain::types::{FilterCriteria, FilterId, FilterKind, RemoteFilterId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// What a virtual filter delegates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDelegate {
    /// 1:1 passthrough to an upstream block filter
    Block { remote_id: RemoteFilterId },
    /// 1:1 passthrough to an upstream pending transaction filter
    PendingTransaction { remote_id: RemoteFilterId },
    /// Delegated to the filter system, which may share the upstream
    /// subscription between several client filters
    Log { criteria: FilterCriteria },
}

impl FilterDelegate {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterDelegate::Block { .. } => FilterKind::Block,
            FilterDelegate::PendingTransaction { .. } => FilterKind::PendingTransaction,
            FilterDelegate::Log { .. } => FilterKind::Log,
        }
    }

    pub fn remote_id(&self) -> Option<&RemoteFilterId> {
        match self {
            FilterDelegate::Block { remote_id } | FilterDelegate::PendingTransaction { remote_id } => {
                Some(remote_id)
            }
            FilterDelegate::Log { .. } => None,
        }
    }

    pub fn criteria(&self) -> Option<&FilterCriteria> {
        match self {
            FilterDelegate::Log { criteria } => Some(criteria),
            _ => None,
        }
    }
}

/// A live virtual filter.
#[derive(Debug, Clone)]
pub struct FilterRecord {
    /// Upstream node chosen when the filter was created
    pub node: NodeIdentity,
    pub delegate: FilterDelegate,
    /// Last successful poll (or creation)
    pub last_access: Instant,
}

impl FilterRecord {
    pub fn new(node: NodeIdentity, delegate: FilterDelegate) -> Self {
        Self {
            node,
            delegate,
            last_access: Instant::now(),
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.delegate.kind()
    }

    /// True if `node` is the node this filter was created against.
    pub fn is_delegate_node(&self, node: &NodeIdentity) -> bool {
        &self.node == node
    }
}

/// Lock-protected filter table.
#[derive(Debug, Default)]
pub struct FilterTable {
    filters: Mutex<HashMap<FilterId, FilterRecord>>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Handles are never reused, so an existing entry is
    /// simply overwritten.
    pub fn add(&self, id: FilterId, record: FilterRecord) {
        self.filters.lock().insert(id, record);
    }

    pub fn get(&self, id: &FilterId) -> Option<FilterRecord> {
        self.filters.lock().get(id).cloned()
    }

    /// Remove and return a record. Only the caller that gets `Some` back owns
    /// any upstream cleanup for it.
    pub fn remove(&self, id: &FilterId) -> Option<FilterRecord> {
        self.filters.lock().remove(id)
    }

    /// Mark a filter as just used. Absent handles are ignored; losing a race
    /// with eviction is expected.
    pub fn refresh_access_time(&self, id: &FilterId) {
        if let Some(record) = self.filters.lock().get_mut(id) {
            record.last_access = Instant::now();
        }
    }

    /// Remove and return every record idle for at least `ttl`, in a single
    /// pass under the lock.
    pub fn sweep_expired(&self, ttl: Duration) -> HashMap<FilterId, FilterRecord> {
        let now = Instant::now();
        let mut filters = self.filters.lock();

        let expired_ids: Vec<FilterId> = filters
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_access) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired_ids
            .into_iter()
            .filter_map(|id| filters.remove(&id).map(|record| (id, record)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_record(node: &str) -> FilterRecord {
        FilterRecord::new(
            NodeIdentity::from_url(node),
            FilterDelegate::Block {
                remote_id: RemoteFilterId::new("0x1"),
            },
        )
    }

    #[test]
    fn test_delegate_kind_fields() {
        let log = FilterDelegate::Log {
            criteria: FilterCriteria::default(),
        };
        assert_eq!(log.kind(), FilterKind::Log);
        assert!(log.remote_id().is_none());
        assert!(log.criteria().is_some());

        let pending = FilterDelegate::PendingTransaction {
            remote_id: RemoteFilterId::new("0x2"),
        };
        assert_eq!(pending.kind(), FilterKind::PendingTransaction);
        assert_eq!(pending.remote_id().map(|r| r.as_str()), Some("0x2"));
        assert!(pending.criteria().is_none());
    }

    #[test]
    fn test_add_get_remove() {
        let table = FilterTable::new();
        let id = FilterId::random();

        table.add(id.clone(), block_record("http://a"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&id).unwrap().kind(), FilterKind::Block);

        let removed = table.remove(&id).unwrap();
        assert!(removed.is_delegate_node(&NodeIdentity::from_url("https://A/")));
        assert!(table.get(&id).is_none());
        assert!(table.remove(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_refresh_absent_is_noop() {
        let table = FilterTable::new();
        table.refresh_access_time(&FilterId::random());
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired_boundary() {
        let table = FilterTable::new();
        let old = FilterId::random();
        let fresh = FilterId::random();
        let ttl = Duration::from_secs(10);

        table.add(old.clone(), block_record("a"));
        tokio::time::advance(Duration::from_secs(4)).await;
        table.add(fresh.clone(), block_record("a"));
        tokio::time::advance(Duration::from_secs(6)).await;

        // `old` is idle for exactly ttl, `fresh` for 6s
        let expired = table.sweep_expired(ttl);
        assert_eq!(expired.len(), 1);
        assert!(expired.contains_key(&old));
        assert!(table.get(&fresh).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_postpones_expiry() {
        let table = FilterTable::new();
        let id = FilterId::random();
        let ttl = Duration::from_secs(10);

        table.add(id.clone(), block_record("a"));
        tokio::time::advance(Duration::from_secs(8)).await;
        table.refresh_access_time(&id);
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(table.sweep_expired(ttl).is_empty());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(table.sweep_expired(ttl).len(), 1);
        assert!(table.is_empty());
    }
}
