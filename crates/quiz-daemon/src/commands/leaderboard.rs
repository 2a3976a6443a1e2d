//! Leaderboard command handlers.

use std::sync::Arc;

use quiz_service::LeaderboardFeed;
use quiz_types::LeaderboardDimension;
use serde_json::value::RawValue;
use serde_json::Value;

use super::{caller, to_raw, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// `dimension` param, defaulting to score.
fn dimension(params: &Value) -> std::result::Result<LeaderboardDimension, RpcError> {
    match params.get("dimension").and_then(|v| v.as_str()) {
        None => Ok(LeaderboardDimension::Score),
        Some(s) => s.parse().map_err(|e: String| RpcError::invalid_payload(&e)),
    }
}

/// `limit` param; values beyond the address space saturate and are then
/// clamped to the configured page size by the service.
fn page_limit(params: &Value) -> Option<usize> {
    params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

pub async fn get_leaderboard(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = caller(params)?;
    let dimension = dimension(params)?;
    let limit = page_limit(params);

    let page = state
        .service
        .leaderboard_page(caller, dimension, limit)
        .await?;
    to_raw(&page)
}

pub async fn get_user_rank(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = caller(params)?;
    let dimension = dimension(params)?;
    let rank = state.service.user_rank(caller, dimension).await?;
    to_raw(&serde_json::json!({
        "dimension": dimension,
        "rank": rank,
    }))
}

/// Rebuild the cache from the ranked tables now.
pub async fn hydrate_leaderboard(state: &Arc<DaemonState>, params: &Value) -> Result {
    caller(params)?;
    let snapshot = state.service.hydrate_leaderboard().await?;
    to_raw(&serde_json::json!({
        "score_entries": snapshot.score.len(),
        "streak_entries": snapshot.streak.len(),
    }))
}

/// Open a live feed. The caller acknowledges with `{"subscribed": true}`
/// and then streams notifications on the same connection.
pub async fn subscribe_leaderboard(
    state: &Arc<DaemonState>,
    params: &Value,
) -> std::result::Result<(Box<RawValue>, LeaderboardFeed), RpcError> {
    caller(params)?;
    let feed = state.service.subscribe_leaderboard().await?;
    Ok((to_raw(&serde_json::json!({"subscribed": true}))?, feed))
}
