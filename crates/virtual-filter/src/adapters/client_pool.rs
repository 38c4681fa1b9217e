//! Node client pool with coalesced connection construction.
//!
//! One client per canonical node identity, created lazily on first use and
//! kept for the lifetime of the pool. Concurrent first calls for the same node
//! share a single in-flight construction; a failed construction is reported
//! to every waiter and then forgotten, so the next call retries.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::error::{FilterError, FilterResult, NodeError};
use crate::domain::node::NodeIdentity;
use crate::ports::outbound::{NodeClient, NodeConnector};

type ConnectFuture = Shared<BoxFuture<'static, Result<Arc<dyn NodeClient>, NodeError>>>;

enum Slot {
    Ready(Arc<dyn NodeClient>),
    /// `generation` tells a finishing waiter whether the slot still belongs
    /// to the construction it awaited
    Connecting { generation: u64, future: ConnectFuture },
}

/// Lazily populated node client cache.
pub struct NodeClientPool {
    connector: Arc<dyn NodeConnector>,
    connect_timeout: Duration,
    slots: Mutex<HashMap<NodeIdentity, Slot>>,
    next_generation: AtomicU64,
}

impl NodeClientPool {
    pub fn new(connector: Arc<dyn NodeConnector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Get the client for `node_url`, constructing it if this is the first
    /// reference to its node identity.
    pub async fn resolve(&self, node_url: &str) -> FilterResult<Arc<dyn NodeClient>> {
        let identity = NodeIdentity::from_url(node_url);

        let (generation, future) = {
            let mut slots = self.slots.lock();
            match slots.get(&identity) {
                Some(Slot::Ready(client)) => return Ok(Arc::clone(client)),
                Some(Slot::Connecting { generation, future }) => (*generation, future.clone()),
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let future = self.connect_future(node_url);
                    slots.insert(
                        identity.clone(),
                        Slot::Connecting {
                            generation,
                            future: future.clone(),
                        },
                    );
                    debug!(node = %identity, "Connecting to upstream node");
                    (generation, future)
                }
            }
        };

        let result = future.await;

        let mut slots = self.slots.lock();
        let still_ours = matches!(
            slots.get(&identity),
            Some(Slot::Connecting { generation: g, .. }) if *g == generation
        );

        match result {
            Ok(client) => {
                if still_ours {
                    slots.insert(identity.clone(), Slot::Ready(Arc::clone(&client)));
                    debug!(node = %identity, "Upstream node client cached");
                }
                Ok(client)
            }
            Err(e) => {
                if still_ours {
                    slots.remove(&identity);
                    warn!(node = %identity, error = %e, "Failed to connect to upstream node");
                }
                Err(FilterError::UpstreamUnavailable(e.to_string()))
            }
        }
    }

    fn connect_future(&self, node_url: &str) -> ConnectFuture {
        let connector = Arc::clone(&self.connector);
        let url = node_url.to_string();
        let connect_timeout = self.connect_timeout;

        async move {
            match tokio::time::timeout(connect_timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::Timeout),
            }
        }
        .boxed()
        .shared()
    }

    /// Number of cached (fully constructed) clients
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if a client for this node identity is cached
    pub fn contains(&self, node_url: &str) -> bool {
        matches!(
            self.slots.lock().get(&NodeIdentity::from_url(node_url)),
            Some(Slot::Ready(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockConnector;

    fn pool(connector: &Arc<MockConnector>) -> NodeClientPool {
        NodeClientPool::new(connector.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_resolve_caches_client() {
        let connector = Arc::new(MockConnector::new());
        let pool = pool(&connector);

        let first = pool.resolve("http://node-a:8545").await.unwrap();
        let second = pool.resolve("https://NODE-A:8545/").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains("node-a:8545"));
    }

    #[tokio::test]
    async fn test_distinct_nodes_get_distinct_clients() {
        let connector = Arc::new(MockConnector::new());
        let pool = pool(&connector);

        let a = pool.resolve("http://a").await.unwrap();
        let b = pool.resolve("http://b").await.unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_use_constructs_once() {
        let connector = Arc::new(MockConnector::new().with_delay(Duration::from_millis(50)));
        let pool = Arc::new(pool(&connector));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.resolve("http://a").await })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(connector.connect_count(), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let connector = Arc::new(MockConnector::new().with_delay(Duration::from_millis(50)));
        connector.fail_next_connects(1);
        let pool = Arc::new(pool(&connector));

        let (r1, r2) = tokio::join!(pool.resolve("http://a"), pool.resolve("http://a"));
        assert!(matches!(r1, Err(FilterError::UpstreamUnavailable(_))));
        assert!(matches!(r2, Err(FilterError::UpstreamUnavailable(_))));
        assert_eq!(connector.connect_count(), 1);
        assert!(pool.is_empty());

        // A later call retries construction
        assert!(pool.resolve("http://a").await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let connector = Arc::new(MockConnector::new().with_delay(Duration::from_secs(60)));
        let pool = NodeClientPool::new(connector.clone(), Duration::from_secs(1));

        let result = pool.resolve("http://slow").await;
        assert!(matches!(result, Err(FilterError::UpstreamUnavailable(_))));
        assert!(pool.is_empty());
    }
}
