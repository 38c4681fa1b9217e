//! JSON-RPC routing for the filter methods.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::error::ApiError;
use crate::domain::types::{FilterCriteria, FilterId};
use crate::ports::inbound::FilterApi;
use crate::service::gated::{methods, ClientFilterApi};

/// One call of a JSON-RPC batch
#[derive(Debug, Clone, Deserialize)]
pub struct BatchCall {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// True for the methods [`dispatch`] handles
pub fn is_filter_method(method: &str) -> bool {
    matches!(
        method,
        methods::NEW_BLOCK_FILTER
            | methods::NEW_PENDING_TRANSACTION_FILTER
            | methods::NEW_FILTER
            | methods::UNINSTALL_FILTER
            | methods::GET_FILTER_LOGS
            | methods::GET_FILTER_CHANGES
    )
}

/// Decode `params`, call the filter API on behalf of `node_url` and encode
/// the result.
pub async fn dispatch(
    api: &dyn FilterApi,
    node_url: &str,
    method: &str,
    params: Option<&Value>,
) -> Result<Value, ApiError> {
    match method {
        methods::NEW_BLOCK_FILTER => {
            let id = api.new_block_filter(node_url).await?;
            Ok(serde_json::to_value(id)?)
        }
        methods::NEW_PENDING_TRANSACTION_FILTER => {
            let id = api.new_pending_transaction_filter(node_url).await?;
            Ok(serde_json::to_value(id)?)
        }
        methods::NEW_FILTER => {
            let criteria: FilterCriteria = parse_param(params, 0)?;
            if criteria.block_hash.is_some()
                && (criteria.from_block.is_some() || criteria.to_block.is_some())
            {
                return Err(ApiError::invalid_params(
                    "blockHash cannot be combined with fromBlock/toBlock",
                ));
            }
            if criteria.topics.as_ref().map_or(false, |t| t.len() > 4) {
                return Err(ApiError::invalid_params("too many topics, at most 4"));
            }
            let id = api.new_log_filter(node_url, criteria).await?;
            Ok(serde_json::to_value(id)?)
        }
        methods::UNINSTALL_FILTER => {
            let id = parse_filter_id(params)?;
            Ok(Value::Bool(api.uninstall_filter(node_url, &id).await?))
        }
        methods::GET_FILTER_LOGS => {
            let id = parse_filter_id(params)?;
            let logs = api.get_filter_logs(node_url, &id).await?;
            Ok(serde_json::to_value(logs)?)
        }
        methods::GET_FILTER_CHANGES => {
            let id = parse_filter_id(params)?;
            let changes = api.get_filter_changes(node_url, &id).await?;
            Ok(serde_json::to_value(changes)?)
        }
        other => Err(ApiError::method_not_found(other)),
    }
}

/// Dispatch a batch on behalf of one client.
///
/// The batch is charged as a whole first. A rejected batch runs none of its
/// calls; otherwise every call runs in order and gets its own result.
pub async fn dispatch_batch<A: FilterApi>(
    api: &ClientFilterApi<A>,
    node_url: &str,
    calls: &[BatchCall],
) -> Result<Vec<Result<Value, ApiError>>, ApiError> {
    api.admit_batch(calls.len())?;

    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(dispatch(api, node_url, &call.method, call.params.as_ref()).await);
    }
    Ok(results)
}

fn parse_filter_id(params: Option<&Value>) -> Result<FilterId, ApiError> {
    let raw: String = parse_param(params, 0)?;
    if raw.is_empty() {
        return Err(ApiError::invalid_params("empty filter id"));
    }
    Ok(FilterId::from(raw))
}

fn parse_param<T: DeserializeOwned>(params: Option<&Value>, index: usize) -> Result<T, ApiError> {
    let param = params
        .and_then(|p| {
            if p.is_array() {
                p.get(index)
            } else if index == 0 {
                Some(p)
            } else {
                None
            }
        })
        .ok_or_else(|| ApiError::invalid_params(format!("missing parameter at index {}", index)))?;

    serde_json::from_value(param.clone()).map_err(|e| {
        ApiError::invalid_params(format!("parameter at index {}: {}", index, e))
    })
}
