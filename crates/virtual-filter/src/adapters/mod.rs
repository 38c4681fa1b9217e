//! Adapters Layer
//!
//! - `NodeClientPool`: coalescing cache of upstream node clients
//! - `RateLimitGate`: token bucket implementation of the admission gate

pub mod client_pool;
pub mod rate_limit;

pub use client_pool::NodeClientPool;
pub use rate_limit::{admit_batch, admit_call, cleanup_task, RateLimitGate};
