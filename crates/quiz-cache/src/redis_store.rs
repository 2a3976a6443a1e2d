//! [`CacheStore`] on a Redis server.
//!
//! Commands go through a [`ConnectionManager`], which reconnects on its
//! own after an outage. Until it does, every call fails with
//! [`crate::CacheError::Unavailable`] and callers fall back as usual.
//!
//! Each subscribed channel gets one dedicated pub/sub connection whose
//! messages are fanned out to local receivers through a broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::{CacheStore, Result};

/// Buffered messages per subscribed channel before slow receivers lag.
const CHANNEL_CAPACITY: usize = 1024;

/// INCR, and set the expiry only when this increment created the key.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Pairwise swap of `KEYS[2i-1]` into `KEYS[2i]`. A missing source deletes
/// the destination instead of failing the whole swap.
const RENAME_ALL: &str = r"
for i = 1, #KEYS, 2 do
  if redis.call('EXISTS', KEYS[i]) == 1 then
    redis.call('RENAME', KEYS[i], KEYS[i + 1])
  else
    redis.call('DEL', KEYS[i + 1])
  end
end
return #KEYS / 2
";

type Channels = Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>;

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
    conn: ConnectionManager,
    incr_script: Arc<Script>,
    rename_script: Arc<Script>,
    channels: Channels,
}

impl RedisCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!("redis cache connected");
        Ok(Self {
            client,
            conn,
            incr_script: Arc::new(Script::new(INCR_WITH_EXPIRY)),
            rename_script: Arc::new(Script::new(RENAME_ALL)),
            channels: Arc::default(),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Fan out every message on `channel` to local receivers until the
    /// pub/sub connection drops, then forget the channel so the next subscriber
    /// opens a fresh one.
    async fn forward(&self, channel: &str) -> Result<broadcast::Sender<String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let forward_to = sender.clone();
        let channels = self.channels.clone();
        let name = channel.to_string();
        tokio::spawn(async move {
            {
                let mut messages = pubsub.on_message();
                while let Some(message) = messages.next().await {
                    match message.get_payload::<String>() {
                        Ok(payload) => {
                            // No local receivers is fine.
                            let _ = forward_to.send(payload);
                        }
                        Err(e) => warn!(channel = %name, "dropping undecodable message: {e}"),
                    }
                }
            }
            warn!(channel = %name, "redis subscription closed");
            channels.lock().await.remove(&name);
        });
        Ok(sender)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (member, score) in members {
            cmd.arg(*score).arg(member.as_str());
        }
        let mut conn = self.conn();
        let _: i64 = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, i64)>> {
        if stop < start {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let members: Vec<(String, i64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        let mut conn = self.conn();
        let rank: Option<u64> = redis::cmd("ZREVRANK")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(rank)
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>> {
        let mut conn = self.conn();
        let score: Option<i64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn del(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn rename_all(&self, pairs: &[(&str, &str)]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut invocation = self.rename_script.prepare_invoke();
        for (from, to) in pairs {
            invocation.key(*from).key(*to);
        }
        let mut conn = self.conn();
        let _: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn();
        let count: u64 = self
            .incr_script
            .key(key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let mut conn = self.conn();
        let receivers: usize = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        let mut channels = self.channels.lock().await;
        if let Some(sender) = channels.get(channel) {
            return Ok(sender.subscribe());
        }
        let sender = self.forward(channel).await?;
        let receiver = sender.subscribe();
        channels.insert(channel.to_string(), sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;

    #[tokio::test]
    async fn test_bad_url_is_unavailable() {
        let err = RedisCache::connect("not a redis url")
            .await
            .err()
            .expect("invalid url");
        assert!(matches!(err, CacheError::Unavailable(_)));
    }

    /// Needs a server: `QUIZ_TEST_REDIS_URL=redis://127.0.0.1/15 cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_server_round_trip() {
        let url = std::env::var("QUIZ_TEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1/15".to_string());
        let cache = RedisCache::connect(&url).await.expect("connect");
        let board = "quiz-test:board";
        let staging = "quiz-test:board:tmp";
        let counter = "quiz-test:counter";
        cache.del(&[board, staging, counter]).await.expect("clean");

        cache
            .zadd_many(staging, &[("a".to_string(), 5), ("b".to_string(), 9)])
            .await
            .expect("zadd");
        cache.rename_all(&[(staging, board)]).await.expect("rename");
        let page = cache.zrevrange(board, 0, 9).await.expect("range");
        assert_eq!(page, vec![("b".to_string(), 9), ("a".to_string(), 5)]);
        assert_eq!(cache.zrevrank(board, "a").await.expect("rank"), Some(1));
        assert_eq!(cache.zscore(board, "b").await.expect("score"), Some(9));

        cache.rename_all(&[(staging, board)]).await.expect("rename");
        assert_eq!(cache.zcard(board).await.expect("card"), 0);

        let ttl = Duration::from_secs(5);
        assert_eq!(cache.incr_with_expiry(counter, ttl).await.expect("incr"), 1);
        assert_eq!(cache.incr_with_expiry(counter, ttl).await.expect("incr"), 2);

        let mut rx = cache.subscribe("quiz-test:events").await.expect("sub");
        cache
            .publish("quiz-test:events", "hello".to_string())
            .await
            .expect("pub");
        assert_eq!(rx.recv().await.expect("recv"), "hello");

        cache.del(&[board, counter]).await.expect("clean");
    }
}
