//! # quiz-service
//!
//! Orchestrates the adaptive quiz on top of the pure engine, the SQLite
//! store and the cache.
//!
//! Per answer: lock the user's row, apply decay and the difficulty
//! machine, score, persist with a version bump, write the leaderboard rows
//! and the answer log in the same transaction, then update the cache and
//! publish after commit.

pub mod config;
pub mod feed;
pub mod leaderboard;
pub mod locks;
pub mod quiz;
pub mod store;

pub use config::{PickerMode, ServiceConfig};
pub use feed::{FeedMessage, LeaderboardFeed};
pub use leaderboard::{CacheSync, LeaderboardSync};
pub use locks::KeyedLocks;
pub use quiz::{Caller, QuizService, SubmitAnswer, SubmittedAnswer};
pub use store::UserStateStore;

use quiz_cache::CacheError;
use quiz_db::DbError;
use quiz_engine::EngineError;

/// Minimum length of client-supplied session ids and idempotency keys.
pub const MIN_TOKEN_LEN: usize = 8;

/// Errors surfaced to callers of the quiz operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("session mismatch")]
    SessionMismatch,

    /// `actual` is unknown when the conflict was detected by the
    /// conditional write rather than by comparing versions up front.
    #[error("state version conflict: expected {expected}")]
    StateVersionConflict { expected: u64, actual: Option<u64> },

    #[error("question not found: {0}")]
    QuestionNotFound(String),

    #[error("no questions available")]
    NoQuestionsAvailable,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("database error: {0}")]
    Db(DbError),

    #[error("engine error: {0}")]
    Engine(EngineError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::VersionConflict { expected, .. } => ServiceError::StateVersionConflict {
                expected,
                actual: None,
            },
            other => ServiceError::Db(other),
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NoQuestionsAvailable(_) => ServiceError::NoQuestionsAvailable,
            EngineError::QuestionNotFound(id) => ServiceError::QuestionNotFound(id),
            other => ServiceError::Engine(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current unix time in milliseconds.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Random 128-bit identifier, hex encoded.
pub fn random_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
