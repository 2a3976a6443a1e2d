//! Ranked leaderboard tables. These are the source of truth that the
//! sorted-set cache is hydrated from.

use quiz_types::LeaderboardDimension;
use rusqlite::{Connection, OptionalExtension};

use crate::Result;

/// Upsert a user's totals into both ranking tables.
pub fn upsert(
    conn: &Connection,
    user_id: &str,
    total_score: i64,
    max_streak: u32,
    now: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO leaderboard_score (user_id, total_score, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET
            total_score = excluded.total_score, updated_at = excluded.updated_at",
        rusqlite::params![user_id, total_score, now as i64],
    )?;
    conn.execute(
        "INSERT INTO leaderboard_streak (user_id, max_streak, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET
            max_streak = excluded.max_streak, updated_at = excluded.updated_at",
        rusqlite::params![user_id, i64::from(max_streak), now as i64],
    )?;
    Ok(())
}

/// Exact rank for a value: `1 + count(strictly greater)`.
pub fn rank_of(conn: &Connection, dimension: LeaderboardDimension, value: i64) -> Result<u64> {
    let sql = match dimension {
        LeaderboardDimension::Score => {
            "SELECT 1 + COUNT(*) FROM leaderboard_score WHERE total_score > ?1"
        }
        LeaderboardDimension::Streak => {
            "SELECT 1 + COUNT(*) FROM leaderboard_streak WHERE max_streak > ?1"
        }
    };
    let rank: i64 = conn.query_row(sql, [value], |row| row.get(0))?;
    Ok(rank as u64)
}

/// A user's ranked value, if they have a row.
pub fn value_of(
    conn: &Connection,
    dimension: LeaderboardDimension,
    user_id: &str,
) -> Result<Option<i64>> {
    let sql = match dimension {
        LeaderboardDimension::Score => "SELECT total_score FROM leaderboard_score WHERE user_id = ?1",
        LeaderboardDimension::Streak => "SELECT max_streak FROM leaderboard_streak WHERE user_id = ?1",
    };
    Ok(conn.query_row(sql, [user_id], |row| row.get(0)).optional()?)
}

/// Top `limit` rows by value, highest first. Ties order by user id.
pub fn top(
    conn: &Connection,
    dimension: LeaderboardDimension,
    limit: usize,
) -> Result<Vec<(String, i64)>> {
    let sql = match dimension {
        LeaderboardDimension::Score => {
            "SELECT user_id, total_score FROM leaderboard_score
             ORDER BY total_score DESC, user_id ASC LIMIT ?1"
        }
        LeaderboardDimension::Streak => {
            "SELECT user_id, max_streak FROM leaderboard_streak
             ORDER BY max_streak DESC, user_id ASC LIMIT ?1"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
