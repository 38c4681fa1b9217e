//! Domain types for the virtual filter layer.
//!
//! Pure data and in-memory state: no I/O happens in this module.

pub mod config;
pub mod error;
pub mod node;
pub mod table;
pub mod types;

pub use config::{ConfigError, FilterConfig, RateLimitConfig, UpstreamConfig};
pub use error::{ApiError, FilterError, FilterResult, NodeError};
pub use node::NodeIdentity;
pub use table::{FilterDelegate, FilterRecord, FilterTable};
pub use types::*;
