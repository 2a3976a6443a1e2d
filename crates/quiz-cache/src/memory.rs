//! In-process [`CacheStore`] backed by a single mutex-guarded keyspace.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::{CacheError, CacheStore, Result};

/// Buffered messages per pub/sub channel before slow receivers lag.
const CHANNEL_CAPACITY: usize = 1024;

/// Expired counters are swept once the keyspace grows past this.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(Reverse<i64>, String)>,
}

impl SortedSet {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(Reverse(old), member.to_string()));
        }
        self.order.insert((Reverse(score), member.to_string()));
    }

    fn rank(&self, member: &str) -> Option<u64> {
        let score = *self.scores.get(member)?;
        let position = self
            .order
            .range(..(Reverse(score), member.to_string()))
            .count();
        Some(position as u64)
    }
}

#[derive(Debug)]
struct Counter {
    value: u64,
    expires_at: Instant,
}

#[derive(Debug)]
enum Value {
    Sorted(SortedSet),
    Counter(Counter),
}

struct Keyspace {
    values: HashMap<String, Value>,
    channels: HashMap<String, broadcast::Sender<String>>,
    sweep_at: usize,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            channels: HashMap::new(),
            sweep_at: SWEEP_THRESHOLD,
        }
    }
}

impl Keyspace {
    /// Drop every expired counter once the keyspace has grown past the
    /// sweep mark, then move the mark so live keys are not rescanned on
    /// every insert.
    fn sweep_expired(&mut self, now: Instant) {
        if self.values.len() < self.sweep_at {
            return;
        }
        self.values.retain(|_, value| match value {
            Value::Counter(counter) => counter.expires_at > now,
            Value::Sorted(_) => true,
        });
        self.sweep_at = (self.values.len() * 2).max(SWEEP_THRESHOLD);
    }

    /// Drop `key` if it is a counter past its expiry.
    fn evict_expired(&mut self, key: &str, now: Instant) {
        if let Some(Value::Counter(counter)) = self.values.get(key) {
            if counter.expires_at <= now {
                self.values.remove(key);
            }
        }
    }

    fn sorted(&self, key: &str) -> Result<Option<&SortedSet>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Sorted(set)) => Ok(Some(set)),
            Some(Value::Counter(_)) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> Result<&mut SortedSet> {
        let value = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::Sorted(SortedSet::default()));
        match value {
            Value::Sorted(set) => Ok(set),
            Value::Counter(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }
}

/// Redis-like store that lives inside the daemon process.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Keyspace>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Keyspace>> {
        self.inner
            .lock()
            .map_err(|_| CacheError::Unavailable("keyspace lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<()> {
        self.lock()?.sorted_mut(key)?.insert(member, score);
        Ok(())
    }

    async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> Result<()> {
        let mut keyspace = self.lock()?;
        let set = keyspace.sorted_mut(key)?;
        for (member, score) in members {
            set.insert(member, *score);
        }
        Ok(())
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<(String, i64)>> {
        let keyspace = self.lock()?;
        let Some(set) = keyspace.sorted(key)? else {
            return Ok(Vec::new());
        };
        if stop < start {
            return Ok(Vec::new());
        }
        Ok(set
            .order
            .iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(Reverse(score), member)| (member.clone(), *score))
            .collect())
    }

    async fn zrevrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        let keyspace = self.lock()?;
        Ok(keyspace.sorted(key)?.and_then(|set| set.rank(member)))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>> {
        let keyspace = self.lock()?;
        Ok(keyspace
            .sorted(key)?
            .and_then(|set| set.scores.get(member).copied()))
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let keyspace = self.lock()?;
        Ok(keyspace
            .sorted(key)?
            .map_or(0, |set| set.scores.len() as u64))
    }

    async fn del(&self, keys: &[&str]) -> Result<u64> {
        let mut keyspace = self.lock()?;
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            keyspace.evict_expired(key, now);
            if keyspace.values.remove(*key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// A missing source clears its destination, so swapping in an empty
    /// rebuild empties the live key.
    async fn rename_all(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut keyspace = self.lock()?;
        for (from, to) in pairs {
            match keyspace.values.remove(*from) {
                Some(value) => {
                    keyspace.values.insert((*to).to_string(), value);
                }
                None => {
                    keyspace.values.remove(*to);
                }
            }
        }
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut keyspace = self.lock()?;
        let now = Instant::now();
        keyspace.evict_expired(key, now);
        keyspace.sweep_expired(now);
        let value = keyspace.values.entry(key.to_string()).or_insert_with(|| {
            Value::Counter(Counter {
                value: 0,
                expires_at: now + ttl,
            })
        });
        match value {
            Value::Counter(counter) => {
                counter.value += 1;
                Ok(counter.value)
            }
            Value::Sorted(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize> {
        let keyspace = self.lock()?;
        Ok(keyspace
            .channels
            .get(channel)
            .map_or(0, |sender| sender.send(payload).unwrap_or(0)))
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        let mut keyspace = self.lock()?;
        let sender = keyspace
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryCache {
        let cache = MemoryCache::new();
        cache
            .zadd_many(
                "board",
                &[
                    ("alice".to_string(), 30),
                    ("bob".to_string(), 50),
                    ("carol".to_string(), 30),
                    ("dave".to_string(), 10),
                ],
            )
            .await
            .expect("seed");
        cache
    }

    #[tokio::test]
    async fn test_zrevrange_orders_by_score_then_member() {
        let cache = seeded().await;
        let page = cache.zrevrange("board", 0, 9).await.expect("range");
        let members: Vec<&str> = page.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["bob", "alice", "carol", "dave"]);
        assert_eq!(cache.zrevrange("board", 1, 2).await.expect("range").len(), 2);
        assert!(cache.zrevrange("missing", 0, 9).await.expect("range").is_empty());
    }

    #[tokio::test]
    async fn test_zadd_overwrites_score() {
        let cache = seeded().await;
        cache.zadd("board", "dave", 100).await.expect("zadd");
        assert_eq!(cache.zrevrank("board", "dave").await.expect("rank"), Some(0));
        assert_eq!(cache.zscore("board", "dave").await.expect("score"), Some(100));
        assert_eq!(cache.zcard("board").await.expect("card"), 4);
    }

    #[tokio::test]
    async fn test_zrevrank() {
        let cache = seeded().await;
        assert_eq!(cache.zrevrank("board", "bob").await.expect("rank"), Some(0));
        assert_eq!(cache.zrevrank("board", "carol").await.expect("rank"), Some(2));
        assert_eq!(cache.zrevrank("board", "nobody").await.expect("rank"), None);
    }

    #[tokio::test]
    async fn test_rename_all_replaces_destination() {
        let cache = seeded().await;
        cache.zadd("staging", "erin", 7).await.expect("zadd");
        cache
            .rename_all(&[("staging", "board"), ("absent", "other")])
            .await
            .expect("rename");
        assert_eq!(cache.zcard("board").await.expect("card"), 1);
        assert_eq!(cache.zcard("staging").await.expect("card"), 0);
    }

    #[tokio::test]
    async fn test_rename_missing_source_clears_destination() {
        let cache = seeded().await;
        cache.rename_all(&[("empty", "board")]).await.expect("rename");
        assert_eq!(cache.zcard("board").await.expect("card"), 0);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = seeded().await;
        let err = cache
            .incr_with_expiry("board", Duration::from_secs(1))
            .await
            .expect_err("sorted set is not a counter");
        assert!(matches!(err, CacheError::WrongType(_)));
    }

    #[tokio::test]
    async fn test_del_counts_existing() {
        let cache = seeded().await;
        assert_eq!(cache.del(&["board", "missing"]).await.expect("del"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        assert_eq!(cache.incr_with_expiry("c", ttl).await.expect("incr"), 1);
        assert_eq!(cache.incr_with_expiry("c", ttl).await.expect("incr"), 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        // Later increments do not push the expiry out.
        assert_eq!(cache.incr_with_expiry("c", ttl).await.expect("incr"), 3);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.incr_with_expiry("c", ttl).await.expect("incr"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counters_are_reclaimed() {
        let cache = seeded().await;
        let ttl = Duration::from_secs(60);
        // One sorted set plus these counters fills the keyspace to the mark.
        for i in 0..SWEEP_THRESHOLD - 1 {
            cache
                .incr_with_expiry(&format!("ratelimit:quiz-next:user:{i}"), ttl)
                .await
                .expect("incr");
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        // Crossing the sweep mark drops every expired counter.
        cache
            .incr_with_expiry("ratelimit:quiz-next:user:fresh", ttl)
            .await
            .expect("incr");
        let keys = cache.lock().expect("lock").values.len();
        assert_eq!(keys, 2, "only the sorted set and the fresh counter remain");
        assert_eq!(cache.zcard("board").await.expect("card"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_counters() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        for i in 0..SWEEP_THRESHOLD {
            cache
                .incr_with_expiry(&format!("live:{i}"), ttl)
                .await
                .expect("incr");
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.incr_with_expiry("live:0", ttl).await.expect("incr"), 2);
        cache.incr_with_expiry("another", ttl).await.expect("incr");
        assert_eq!(
            cache.lock().expect("lock").values.len(),
            SWEEP_THRESHOLD + 1
        );
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let cache = MemoryCache::new();
        assert_eq!(
            cache.publish("events", "lost".to_string()).await.expect("pub"),
            0
        );

        let mut first = cache.subscribe("events").await.expect("sub");
        let mut second = cache.subscribe("events").await.expect("sub");
        assert_eq!(
            cache.publish("events", "hello".to_string()).await.expect("pub"),
            2
        );

        assert_eq!(first.recv().await.expect("recv"), "hello");
        assert_eq!(second.recv().await.expect("recv"), "hello");
    }
}
