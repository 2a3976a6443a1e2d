//! RPC command handlers, one submodule per area.

pub mod leaderboard;
pub mod quiz;

use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::rpc::RpcError;

type Result = std::result::Result<Box<RawValue>, RpcError>;

/// Serialize a handler result.
fn to_raw<T: Serialize>(value: &T) -> Result {
    serde_json::value::to_raw_value(value)
        .map_err(|e| RpcError::internal_error(&format!("serialize: {e}")))
}

/// The caller's user id. Token verification happens before the daemon;
/// here an absent or empty id is simply unauthorized.
fn user_id(params: &Value) -> std::result::Result<&str, RpcError> {
    params
        .get("user_id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(RpcError::unauthorized)
}

fn caller(params: &Value) -> std::result::Result<quiz_service::Caller<'_>, RpcError> {
    Ok(quiz_service::Caller {
        user_id: user_id(params)?,
        client_key: params.get("client_key").and_then(|v| v.as_str()),
    })
}
