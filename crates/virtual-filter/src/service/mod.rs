//! Service Layer
//!
//! - `FilterApiService`: implements `FilterApi` over the filter table, node
//!   client pool and filter system
//! - `TtlSweeper`: background eviction of idle filters
//! - `DelegateReleaser`: log filter delegate release with retry
//! - `GatedFilterApi`: admission control in front of any `FilterApi`
//! - `rpc`: JSON-RPC parameter decoding and dispatch

pub mod filter_api;
pub mod gated;
pub mod release;
pub mod rpc;
pub mod sweeper;

pub use filter_api::FilterApiService;
pub use gated::{methods, ClientFilterApi, GatedFilterApi};
pub use release::DelegateReleaser;
pub use rpc::{dispatch, dispatch_batch, is_filter_method, BatchCall};
pub use sweeper::TtlSweeper;
