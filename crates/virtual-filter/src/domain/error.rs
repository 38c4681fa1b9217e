//! Error types for the virtual filter layer.
//!
//! `FilterError` is what the filter API returns; `NodeError` is what upstream
//! node clients return; `ApiError` is the JSON-RPC error object handed back to
//! clients.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// JSON-RPC 2.0 error codes used by the filter endpoints
pub mod codes {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
    pub const RESOURCE_UNAVAILABLE: i32 = -32002;
    pub const METHOD_NOT_SUPPORTED: i32 = -32004;

    pub const RATE_LIMITED: i32 = -32029;
}

/// Errors surfaced by the filter API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Unknown handle, wrong filter kind, stale delegate node, or the
    /// upstream filter expired. Clients should recreate the filter.
    #[error("filter not found")]
    FilterNotFound,

    #[error("upstream node unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream request failed: {0}")]
    UpstreamRequestFailed(String),

    #[error("not supported yet: {0}")]
    NotYetSupported(String),

    #[error("too many requests")]
    RateLimited,
}

impl FilterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FilterError::FilterNotFound)
    }
}

/// Errors returned by an upstream node client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node no longer knows the filter id (expired upstream).
    #[error("filter not found")]
    FilterNotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,
}

impl NodeError {
    pub fn is_filter_not_found(&self) -> bool {
        matches!(self, NodeError::FilterNotFound)
    }
}

impl From<NodeError> for FilterError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::FilterNotFound => FilterError::FilterNotFound,
            other => FilterError::UpstreamRequestFailed(other.to_string()),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    /// Invalid parameters (malformed filter id or criteria)
    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ApiError", 3)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ApiError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            code: i32,
            message: String,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(ApiError {
            code: helper.code,
            message: helper.message,
            data: helper.data,
        })
    }
}

impl From<FilterError> for ApiError {
    fn from(e: FilterError) -> Self {
        match e {
            // Same message geth uses, so existing client libraries recognise it
            FilterError::FilterNotFound => ApiError::new(codes::SERVER_ERROR, "filter not found"),
            FilterError::UpstreamUnavailable(details) => ApiError::new(
                codes::RESOURCE_UNAVAILABLE,
                format!("Resource unavailable: {}", details),
            ),
            FilterError::UpstreamRequestFailed(details) => ApiError::new(
                codes::INTERNAL_ERROR,
                format!("Internal error: {}", details),
            ),
            FilterError::NotYetSupported(what) => ApiError::new(
                codes::METHOD_NOT_SUPPORTED,
                format!("Method not supported: {}", what),
            ),
            FilterError::RateLimited => ApiError::new(codes::RATE_LIMITED, "too many requests"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::invalid_params(e.to_string())
    }
}

/// Result type for filter API operations
pub type FilterResult<T> = Result<T, FilterError>;
