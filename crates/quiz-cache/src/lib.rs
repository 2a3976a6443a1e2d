//! # quiz-cache
//!
//! Fast derived state for the quiz: ranked sorted sets, expiring counters
//! and publish/subscribe channels. Everything here can be rebuilt from the
//! database, so callers treat failures as degraded mode rather than errors
//! on the primary path.
//!
//! ## Key patterns
//!
//! ```text
//! leaderboard:score              → sorted set, member = user id
//! leaderboard:streak             → sorted set, member = user id
//! leaderboard:<dim>:tmp:<run>    → staging set used while hydrating
//! ratelimit:<scope>:<key>        → fixed-window counter (expires)
//! leaderboard:updates            → pub/sub channel of update events
//! ```
//!
//! [`RedisCache`] talks to a Redis server; [`MemoryCache`] keeps the same
//! keyspace inside the process for tests and single-node development.

pub mod memory;
pub mod rate_limit;
pub mod redis_store;

pub use memory::MemoryCache;
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use redis_store::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Cache error types.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("key '{0}' holds a value of another type")]
    WrongType(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.code() == Some("WRONGTYPE") || e.kind() == redis::ErrorKind::TypeError {
            CacheError::WrongType(e.to_string())
        } else {
            CacheError::Unavailable(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// The operations the quiz needs from a Redis-like store.
///
/// Sorted sets rank members by score descending. Members with equal
/// scores keep a stable backend-defined order.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or overwrite one member's score.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()>;

    /// Insert or overwrite many members in one step.
    async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> Result<()>;

    /// Members ranked `start..=stop` (0-based), highest score first.
    async fn zrevrange(&self, key: &str, start: usize, stop: usize)
        -> Result<Vec<(String, i64)>>;

    /// 0-based descending rank of `member`, if present.
    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<u64>>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>>;

    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Remove keys; returns how many existed.
    async fn del(&self, keys: &[&str]) -> Result<u64>;

    /// Rename every `(from, to)` pair as one atomic step, replacing any
    /// existing destination. A missing source clears its destination.
    /// Readers never see a partial swap.
    async fn rename_all(&self, pairs: &[(&str, &str)]) -> Result<()>;

    /// Increment a counter, setting `ttl` only when the increment created
    /// it. Returns the new value.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Publish to a channel; returns the number of receivers reached.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize>;

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>>;
}
