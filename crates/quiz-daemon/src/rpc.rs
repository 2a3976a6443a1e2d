//! JSON-RPC server over Unix socket.
//!
//! Newline-framed JSON-RPC 2.0. Each connection handles requests in order;
//! `subscribe_leaderboard` turns the connection into a one-way stream of
//! `leaderboard_event` notifications until the client hangs up.

use std::path::PathBuf;
use std::sync::Arc;

use quiz_service::{LeaderboardFeed, ServiceError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response. `result` is pre-serialized so stored answer payloads
/// go out byte for byte.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Box<RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Server-initiated message on a subscribed connection.
#[derive(Debug, Serialize)]
pub struct RpcNotification<T> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: T,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    /// Stable UPPER_SNAKE error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: Box<RawValue>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid payload (-32602).
    pub fn invalid_payload(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PAYLOAD",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    // Quiz errors

    /// Missing or empty caller identity (-32001).
    pub fn unauthorized() -> Self {
        Self::new(-32001, "UNAUTHORIZED", None)
    }
}

impl From<ServiceError> for RpcError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Unauthorized => RpcError::unauthorized(),
            ServiceError::InvalidPayload(detail) => RpcError::invalid_payload(&detail),
            ServiceError::SessionMismatch => RpcError::new(-32010, "SESSION_MISMATCH", None),
            ServiceError::StateVersionConflict { expected, actual } => RpcError::new(
                -32011,
                "STATE_VERSION_CONFLICT",
                Some(serde_json::json!({"expected": expected, "actual": actual})),
            ),
            ServiceError::QuestionNotFound(id) => RpcError::new(
                -32020,
                "QUESTION_NOT_FOUND",
                Some(serde_json::json!({"question_id": id})),
            ),
            ServiceError::NoQuestionsAvailable => {
                RpcError::new(-32021, "NO_QUESTIONS_AVAILABLE", None)
            }
            ServiceError::RateLimitExceeded => RpcError::new(-32029, "RATE_LIMIT_EXCEEDED", None),
            ServiceError::UserNotFound(user_id) => RpcError::new(
                -32030,
                "USER_NOT_FOUND",
                Some(serde_json::json!({"user_id": user_id})),
            ),
            other => {
                error!("internal error: {other}");
                RpcError::internal_error(&other.to_string())
            }
        }
    }
}

/// What the dispatcher hands back to the connection loop.
pub enum Dispatch {
    Reply(RpcResponse),
    /// Acknowledge, then stream the feed on this connection.
    Subscribe(RpcResponse, LeaderboardFeed),
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let dispatched = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(&state, request).await,
            Err(_) => Dispatch::Reply(RpcResponse::error(
                serde_json::Value::Null,
                RpcError::parse_error(),
            )),
        };

        match dispatched {
            Dispatch::Reply(response) => write_line(&mut writer, &response).await?,
            Dispatch::Subscribe(response, feed) => {
                write_line(&mut writer, &response).await?;
                return stream_feed(&mut writer, feed).await;
            }
        }
    }

    Ok(())
}

/// Forward feed messages until the feed closes or the client goes away.
async fn stream_feed<W>(writer: &mut W, mut feed: LeaderboardFeed) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("leaderboard subscriber attached");
    while let Some(message) = feed.next().await {
        let notification = RpcNotification {
            jsonrpc: "2.0",
            method: "leaderboard_event",
            params: message,
        };
        if let Err(e) = write_line(writer, &notification).await {
            debug!("leaderboard subscriber detached: {e}");
            break;
        }
    }
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> Dispatch {
    let id = request.id.clone();
    let method = request.method.as_str();

    if request.jsonrpc != "2.0" {
        return Dispatch::Reply(RpcResponse::error(id, RpcError::invalid_request()));
    }

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Quiz
        "next_question" => commands::quiz::next_question(state, &request.params).await,
        "submit_answer" => commands::quiz::submit_answer(state, &request.params).await,
        "get_metrics" => commands::quiz::get_metrics(state, &request.params).await,

        // Leaderboard
        "get_leaderboard" => commands::leaderboard::get_leaderboard(state, &request.params).await,
        "get_user_rank" => commands::leaderboard::get_user_rank(state, &request.params).await,
        "hydrate_leaderboard" => {
            commands::leaderboard::hydrate_leaderboard(state, &request.params).await
        }
        "subscribe_leaderboard" => {
            return match commands::leaderboard::subscribe_leaderboard(state, &request.params).await {
                Ok((ack, feed)) => Dispatch::Subscribe(RpcResponse::success(id, ack), feed),
                Err(err) => Dispatch::Reply(RpcResponse::error(id, err)),
            };
        }

        _ => Err(RpcError::method_not_found(method)),
    };

    Dispatch::Reply(match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    })
}
