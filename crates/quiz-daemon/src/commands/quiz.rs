//! Quiz command handlers.

use std::sync::Arc;

use quiz_service::SubmitAnswer;
use serde_json::value::RawValue;
use serde_json::Value;

use super::{caller, to_raw, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Serve the next question. Optional `session_id` replaces the stored one.
pub async fn next_question(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = caller(params)?;
    let session = params.get("session_id").and_then(|v| v.as_str());
    let next = state.service.next_question(caller, session).await?;
    to_raw(&next)
}

/// Score an answer. Replays return the originally stored bytes.
pub async fn submit_answer(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = caller(params)?;
    let request: SubmitAnswer = serde_json::from_value(params.clone())
        .map_err(|e| RpcError::invalid_payload(&e.to_string()))?;

    let submitted = state.service.submit_answer(caller, &request).await?;
    RawValue::from_string(submitted.payload)
        .map_err(|e| RpcError::internal_error(&format!("stored payload: {e}")))
}

pub async fn get_metrics(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = caller(params)?;
    let metrics = state.service.metrics(caller).await?;
    to_raw(&metrics)
}
