//! # Virtual Filter
//!
//! Virtual filter layer for a JSON-RPC gateway sitting in front of a pool of
//! Ethereum-style full nodes.
//!
//! Clients create block, pending transaction and log filters through the
//! gateway and poll them later. The gateway hands out its own handles, keeps
//! track of which upstream node each filter really lives on, and detects when
//! a later call is routed to a different node.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        VIRTUAL FILTER                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │   rpc::dispatch ──► GatedFilterApi ──► FilterApiService       │
//! │                     (AdmissionGate)        │                  │
//! │                                            │                  │
//! │        ┌───────────────────┬───────────────┼──────────┐       │
//! │        ▼                   ▼               ▼          ▼       │
//! │   FilterTable        NodeClientPool   FilterSystem  TtlSweeper│
//! │   (id → record)      (node → client)  (log delegates)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): handles, criteria, node identity, the
//!   filter table, errors and configuration
//! - **Ports Layer** (`ports/`)
//!   - `FilterApi`: driving port
//!   - `NodeClient`, `NodeConnector`, `FilterSystem`, `AdmissionGate`:
//!     driven ports
//! - **Service Layer** (`service/`): `FilterApiService`, `TtlSweeper`,
//!   `DelegateReleaser`, `GatedFilterApi` and JSON-RPC dispatch
//! - **Adapters Layer** (`adapters/`): `NodeClientPool`, `RateLimitGate`
//!
//! ## Invariants
//!
//! - Handles are unique among live filters
//! - A filter is only ever served through the node it was created on; any
//!   other node gets `FilterNotFound` and the filter is dropped
//! - A filter not polled for `ttl` is evicted within `ttl / 2`
//! - At most one connection is constructed per upstream node
//! - A failed uninstall leaves the filter in place; a log delegate whose
//!   record is already gone is retried until the filter system confirms it
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use virtual_filter::{FilterApi, FilterApiService, FilterConfig};
//!
//! let config = FilterConfig::from_json_str(r#"{ "ttl": "5m" }"#)?;
//! let service = FilterApiService::new(config, connector, filter_system)?;
//!
//! let id = service.new_block_filter("http://node-a:8545").await?;
//! let changes = service.get_filter_changes("http://node-a:8545", &id).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

/// Test doubles for the outbound ports
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{admit_batch, admit_call, NodeClientPool, RateLimitGate};
pub use domain::{
    Address, ApiError, BlockNumberOrTag, BlockTag, ConfigError, FilterAddress, FilterChanges,
    FilterConfig, FilterCriteria, FilterDelegate, FilterError, FilterId, FilterKind, FilterRecord,
    FilterResult, FilterTable, FilterTopic, Hash, Log, NodeError, NodeIdentity, RateLimitConfig,
    RemoteFilterId, UpstreamConfig,
};
pub use metrics::{FilterMetrics, MetricsSnapshot};
pub use ports::{AdmissionGate, FilterApi, FilterSystem, GateContext, NodeClient, NodeConnector};
pub use service::{
    dispatch, dispatch_batch, BatchCall, ClientFilterApi, DelegateReleaser, FilterApiService,
    GatedFilterApi, TtlSweeper,
};
