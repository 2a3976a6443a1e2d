//! Leaderboard synchronization between the ranked SQLite tables and the
//! sorted-set cache.
//!
//! The tables are written inside the answer transaction and are never
//! wrong. The cache is updated after commit on a best-effort basis and is
//! periodically rebuilt from the tables, which bounds how far it can drift.

use std::sync::Arc;

use quiz_cache::{CacheStore, Result as CacheResult};
use quiz_db::queries::leaderboard as rows;
use quiz_db::DbError;
use quiz_types::{LeaderboardDimension, LeaderboardEntry, LeaderboardEvent};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::UserStateStore;
use crate::ServiceError;

pub const SCORE_SET: &str = "leaderboard:score";
pub const STREAK_SET: &str = "leaderboard:streak";
pub const UPDATES_CHANNEL: &str = "leaderboard:updates";

/// Live sorted-set key for a dimension.
pub fn set_key(dimension: LeaderboardDimension) -> &'static str {
    match dimension {
        LeaderboardDimension::Score => SCORE_SET,
        LeaderboardDimension::Streak => STREAK_SET,
    }
}

/// Staging key private to one rebuild run.
fn staging_key(dimension: LeaderboardDimension, run: &str) -> String {
    format!("{}:tmp:{run}", set_key(dimension))
}

/// Whether a post-commit cache update landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSync {
    Synced,
    /// The cache is stale until the next hydrate.
    Degraded,
}

/// Rows read from the ranked tables for one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrateSnapshot {
    pub score: Vec<(String, i64)>,
    pub streak: Vec<(String, i64)>,
}

#[derive(Clone)]
pub struct LeaderboardSync {
    cache: Arc<dyn CacheStore>,
    hydrate_limit: usize,
    /// Held from snapshot to swap so rebuilds apply one at a time and in
    /// the order their snapshots were taken.
    rebuilds: Arc<Mutex<()>>,
}

impl LeaderboardSync {
    pub fn new(cache: Arc<dyn CacheStore>, hydrate_limit: usize) -> Self {
        Self {
            cache,
            hydrate_limit,
            rebuilds: Arc::default(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Upsert the user's totals into the ranked tables. Call inside the
    /// same transaction as the state write.
    pub fn update_rows(
        &self,
        conn: &Connection,
        event: &LeaderboardEvent,
        now: u64,
    ) -> Result<(), DbError> {
        rows::upsert(
            conn,
            &event.user_id,
            event.total_score,
            event.max_streak,
            now,
        )
    }

    /// Authoritative `(score rank, streak rank)` from the tables.
    pub fn db_ranks(
        &self,
        conn: &Connection,
        total_score: i64,
        max_streak: u32,
    ) -> Result<(u64, u64), DbError> {
        Ok((
            rows::rank_of(conn, LeaderboardDimension::Score, total_score)?,
            rows::rank_of(conn, LeaderboardDimension::Streak, i64::from(max_streak))?,
        ))
    }

    /// Push the user's totals into both sorted sets and publish the change.
    /// Failures are logged and reported, never raised.
    pub async fn update_cache(&self, event: &LeaderboardEvent) -> CacheSync {
        match self.try_update_cache(event).await {
            Ok(receivers) => {
                debug!(user_id = %event.user_id, receivers, "leaderboard cache updated");
                CacheSync::Synced
            }
            Err(e) => {
                warn!(
                    user_id = %event.user_id,
                    "leaderboard cache update failed, stale until next hydrate: {e}"
                );
                CacheSync::Degraded
            }
        }
    }

    async fn try_update_cache(&self, event: &LeaderboardEvent) -> Result<usize, ServiceError> {
        self.cache
            .zadd(SCORE_SET, &event.user_id, event.total_score)
            .await?;
        self.cache
            .zadd(STREAK_SET, &event.user_id, i64::from(event.max_streak))
            .await?;
        let payload = serde_json::to_string(event)?;
        Ok(self.cache.publish(UPDATES_CHANNEL, payload).await?)
    }

    /// Top `limit` entries from the cache with 1-based positional ranks.
    pub async fn get_leaderboard(
        &self,
        dimension: LeaderboardDimension,
        limit: usize,
    ) -> CacheResult<Vec<LeaderboardEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let members = self
            .cache
            .zrevrange(set_key(dimension), 0, limit - 1)
            .await?;
        Ok(ranked(members))
    }

    /// 1-based cached rank, or `None` when the user is not in the set.
    pub async fn get_user_rank(
        &self,
        user_id: &str,
        dimension: LeaderboardDimension,
    ) -> CacheResult<Option<u64>> {
        Ok(self
            .cache
            .zrevrank(set_key(dimension), user_id)
            .await?
            .map(|rank| rank + 1))
    }

    pub async fn is_cold(&self, dimension: LeaderboardDimension) -> CacheResult<bool> {
        Ok(self.cache.zcard(set_key(dimension)).await? == 0)
    }

    /// Read the top rows for both dimensions from the tables.
    pub fn snapshot(&self, conn: &Connection) -> Result<HydrateSnapshot, DbError> {
        Ok(HydrateSnapshot {
            score: rows::top(conn, LeaderboardDimension::Score, self.hydrate_limit)?,
            streak: rows::top(conn, LeaderboardDimension::Streak, self.hydrate_limit)?,
        })
    }

    /// Snapshot the tables and swap the result into the cache, with no
    /// other rebuild in between.
    pub async fn rebuild(&self, store: &UserStateStore) -> Result<HydrateSnapshot, ServiceError> {
        let _running = self.rebuilds.lock().await;
        let snapshot = store.read(|conn| self.snapshot(conn)).await?;
        self.swap_in(&snapshot).await?;
        Ok(snapshot)
    }

    /// Rebuild both sorted sets from `snapshot`. The new sets are staged
    /// under keys private to this run and swapped in with one atomic
    /// rename, so concurrent rebuilds never touch each other's staging.
    pub async fn hydrate(&self, snapshot: &HydrateSnapshot) -> CacheResult<()> {
        let _running = self.rebuilds.lock().await;
        self.swap_in(snapshot).await
    }

    async fn swap_in(&self, snapshot: &HydrateSnapshot) -> CacheResult<()> {
        let run = crate::random_id();
        let score_tmp = staging_key(LeaderboardDimension::Score, &run);
        let streak_tmp = staging_key(LeaderboardDimension::Streak, &run);

        let staged = self.stage(&score_tmp, &streak_tmp, snapshot).await;
        if let Err(e) = staged {
            if let Err(cleanup) = self
                .cache
                .del(&[score_tmp.as_str(), streak_tmp.as_str()])
                .await
            {
                debug!("staging cleanup failed: {cleanup}");
            }
            return Err(e);
        }

        info!(
            score = snapshot.score.len(),
            streak = snapshot.streak.len(),
            "leaderboard cache hydrated"
        );
        Ok(())
    }

    async fn stage(
        &self,
        score_tmp: &str,
        streak_tmp: &str,
        snapshot: &HydrateSnapshot,
    ) -> CacheResult<()> {
        if !snapshot.score.is_empty() {
            self.cache.zadd_many(score_tmp, &snapshot.score).await?;
        }
        if !snapshot.streak.is_empty() {
            self.cache.zadd_many(streak_tmp, &snapshot.streak).await?;
        }
        self.cache
            .rename_all(&[(score_tmp, SCORE_SET), (streak_tmp, STREAK_SET)])
            .await
    }
}

/// Attach 1-based positional ranks.
pub fn ranked(members: Vec<(String, i64)>) -> Vec<LeaderboardEntry> {
    members
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, score))| LeaderboardEntry {
            user_id,
            score,
            rank: i as u64 + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use quiz_cache::MemoryCache;
    use quiz_db::queries::state;
    use tokio::sync::broadcast;

    use super::*;

    fn event(user_id: &str, total_score: i64, max_streak: u32) -> LeaderboardEvent {
        LeaderboardEvent {
            user_id: user_id.to_string(),
            total_score,
            max_streak,
        }
    }

    fn sync() -> LeaderboardSync {
        LeaderboardSync::new(Arc::new(MemoryCache::new()), 200)
    }

    fn seeded_db(sync: &LeaderboardSync, totals: &[(&str, i64, u32)]) -> Connection {
        let conn = quiz_db::open_memory().expect("open test db");
        for (user, score, streak) in totals {
            state::ensure_user(&conn, user, 1).expect("user");
            sync.update_rows(&conn, &event(user, *score, *streak), 1)
                .expect("rows");
        }
        conn
    }

    /// Delays every staging write so two rebuilds are guaranteed to be in
    /// flight at the same time.
    struct SlowStaging {
        inner: MemoryCache,
    }

    #[async_trait]
    impl CacheStore for SlowStaging {
        async fn zadd(&self, key: &str, member: &str, score: i64) -> CacheResult<()> {
            self.inner.zadd(key, member, score).await
        }
        async fn zadd_many(&self, key: &str, members: &[(String, i64)]) -> CacheResult<()> {
            self.inner.zadd_many(key, members).await?;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
        async fn zrevrange(
            &self,
            key: &str,
            start: usize,
            stop: usize,
        ) -> CacheResult<Vec<(String, i64)>> {
            self.inner.zrevrange(key, start, stop).await
        }
        async fn zrevrank(&self, key: &str, member: &str) -> CacheResult<Option<u64>> {
            self.inner.zrevrank(key, member).await
        }
        async fn zscore(&self, key: &str, member: &str) -> CacheResult<Option<i64>> {
            self.inner.zscore(key, member).await
        }
        async fn zcard(&self, key: &str) -> CacheResult<u64> {
            self.inner.zcard(key).await
        }
        async fn del(&self, keys: &[&str]) -> CacheResult<u64> {
            self.inner.del(keys).await
        }
        async fn rename_all(&self, pairs: &[(&str, &str)]) -> CacheResult<()> {
            self.inner.rename_all(pairs).await
        }
        async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> CacheResult<u64> {
            self.inner.incr_with_expiry(key, ttl).await
        }
        async fn publish(&self, channel: &str, payload: String) -> CacheResult<usize> {
            self.inner.publish(channel, payload).await
        }
        async fn subscribe(&self, channel: &str) -> CacheResult<broadcast::Receiver<String>> {
            self.inner.subscribe(channel).await
        }
    }

    #[tokio::test]
    async fn test_update_cache_publishes_event() {
        let sync = sync();
        let mut rx = sync.cache().subscribe(UPDATES_CHANNEL).await.expect("sub");

        assert_eq!(
            sync.update_cache(&event("u1", 120, 4)).await,
            CacheSync::Synced
        );

        let published = rx.recv().await.expect("recv");
        assert_eq!(published, r#"{"userId":"u1","totalScore":120,"maxStreak":4}"#);
        assert_eq!(
            sync.get_user_rank("u1", LeaderboardDimension::Streak)
                .await
                .expect("rank"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_hydrate_then_read_is_ordered() {
        let sync = sync();
        let conn = seeded_db(
            &sync,
            &[("a", 10, 1), ("b", 70, 2), ("c", 40, 9), ("d", 40, 0)],
        );
        let snapshot = sync.snapshot(&conn).expect("snapshot");
        sync.hydrate(&snapshot).await.expect("hydrate");

        let page = sync
            .get_leaderboard(LeaderboardDimension::Score, 10)
            .await
            .expect("page");
        let ranks: Vec<u64> = page.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert!(page.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(page[0].user_id, "b");

        let streaks = sync
            .get_leaderboard(LeaderboardDimension::Streak, 1)
            .await
            .expect("page");
        assert_eq!(streaks[0].user_id, "c");
    }

    #[tokio::test]
    async fn test_hydrate_replaces_stale_members() {
        let sync = sync();
        sync.cache()
            .zadd(SCORE_SET, "ghost", 999)
            .await
            .expect("zadd");
        let conn = seeded_db(&sync, &[("a", 10, 1)]);
        sync.hydrate(&sync.snapshot(&conn).expect("snapshot"))
            .await
            .expect("hydrate");

        assert_eq!(
            sync.get_user_rank("ghost", LeaderboardDimension::Score)
                .await
                .expect("rank"),
            None
        );
        assert!(!sync
            .is_cold(LeaderboardDimension::Score)
            .await
            .expect("card"));
    }

    #[tokio::test]
    async fn test_hydrate_respects_limit() {
        let sync = LeaderboardSync::new(Arc::new(MemoryCache::new()), 2);
        let conn = seeded_db(&sync, &[("a", 1, 1), ("b", 2, 2), ("c", 3, 3)]);
        sync.hydrate(&sync.snapshot(&conn).expect("snapshot"))
            .await
            .expect("hydrate");
        assert_eq!(sync.cache().zcard(SCORE_SET).await.expect("card"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_hydrates_never_empty_the_live_sets() {
        let sync = LeaderboardSync::new(
            Arc::new(SlowStaging {
                inner: MemoryCache::new(),
            }),
            200,
        );
        let first = HydrateSnapshot {
            score: vec![("a".to_string(), 10), ("b".to_string(), 5)],
            streak: vec![("a".to_string(), 2), ("b".to_string(), 1)],
        };
        let second = HydrateSnapshot {
            score: vec![("a".to_string(), 12), ("c".to_string(), 3)],
            streak: vec![("a".to_string(), 3), ("c".to_string(), 1)],
        };

        let (one, two) = tokio::join!(sync.hydrate(&first), sync.hydrate(&second));
        one.expect("first hydrate");
        two.expect("second hydrate");

        // Rebuilds apply in turn; the later one wins whole.
        let scores = sync
            .get_leaderboard(LeaderboardDimension::Score, 10)
            .await
            .expect("page");
        let members: Vec<(&str, i64)> = scores
            .iter()
            .map(|e| (e.user_id.as_str(), e.score))
            .collect();
        assert_eq!(members, vec![("a", 12), ("c", 3)]);
        assert_eq!(sync.cache().zcard(STREAK_SET).await.expect("card"), 2);
    }

    #[tokio::test]
    async fn test_rebuild_reads_tables_under_the_lock() {
        let sync = sync();
        let store = UserStateStore::new(Arc::new(Mutex::new(
            quiz_db::open_memory().expect("open test db"),
        )));
        store
            .read(|conn| {
                for (user, score, streak) in [("a", 30, 1), ("b", 40, 2)] {
                    state::ensure_user(conn, user, 1)?;
                    sync.update_rows(conn, &event(user, score, streak), 1)?;
                }
                Ok(())
            })
            .await
            .expect("seed");

        let (one, two) = tokio::join!(sync.rebuild(&store), sync.rebuild(&store));
        assert_eq!(one.expect("rebuild").score.len(), 2);
        assert_eq!(two.expect("rebuild").score.len(), 2);
        assert_eq!(sync.cache().zcard(SCORE_SET).await.expect("card"), 2);
        assert_eq!(
            sync.get_user_rank("b", LeaderboardDimension::Score)
                .await
                .expect("rank"),
            Some(1)
        );
    }

    #[test]
    fn test_db_ranks_strictly_greater() {
        let sync = sync();
        let conn = seeded_db(&sync, &[("a", 50, 3), ("b", 50, 1), ("c", 20, 1)]);
        assert_eq!(sync.db_ranks(&conn, 50, 1).expect("ranks"), (1, 2));
        assert_eq!(sync.db_ranks(&conn, 20, 3).expect("ranks"), (3, 1));
    }
}
