//! Ports Layer
//!
//! - Driving port (inbound): the filter API exposed to the RPC layer
//! - Driven ports (outbound): upstream nodes, the filter system and the
//!   admission gate

pub mod inbound;
pub mod outbound;

pub use inbound::FilterApi;
pub use outbound::{AdmissionGate, FilterSystem, GateContext, NodeClient, NodeConnector};
