//! Per-user adaptive state.
//!
//! Writes go through [`persist`], a compare-and-swap on `state_version`:
//! the update only lands when the stored version still equals the version
//! the caller read, and it bumps the version by one.

use quiz_types::{Difficulty, UserState};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::{json_column, to_json, DbError, Result};

const SELECT_STATE: &str = "SELECT user_id, session_id, current_difficulty, streak, wrong_streak,
        max_streak, total_score, accuracy, answers_count, last_question_id, cycle_position,
        queue_difficulty, difficulty_question_queue, recent_question_ids, last_answer_at,
        recent_performance, state_version, streak_decayed_at
     FROM user_state WHERE user_id = ?1";

fn difficulty_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Difficulty> {
    let raw: i64 = row.get(idx)?;
    Difficulty::try_from(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn map_state(row: &Row<'_>) -> rusqlite::Result<UserState> {
    let queue_difficulty = match row.get::<_, Option<i64>>(11)? {
        Some(_) => Some(difficulty_column(row, 11)?),
        None => None,
    };
    Ok(UserState {
        user_id: row.get(0)?,
        session_id: row.get(1)?,
        current_difficulty: difficulty_column(row, 2)?,
        streak: row.get::<_, i64>(3)? as u32,
        wrong_streak: row.get::<_, i64>(4)? as u32,
        max_streak: row.get::<_, i64>(5)? as u32,
        total_score: row.get(6)?,
        accuracy: row.get(7)?,
        answers_count: row.get::<_, i64>(8)? as u64,
        last_question_id: row.get(9)?,
        cycle_position: row.get::<_, i64>(10)? as usize,
        queue_difficulty,
        difficulty_question_queue: json_column(row, 12)?,
        recent_question_ids: json_column(row, 13)?,
        last_answer_at: row.get::<_, Option<i64>>(14)?.map(|t| t as u64),
        streak_decayed_at: row.get::<_, Option<i64>>(17)?.map(|t| t as u64),
        recent_performance: json_column(row, 15)?,
        state_version: row.get::<_, i64>(16)? as u64,
    })
}

/// Register a user id if it is new.
pub fn ensure_user(conn: &Connection, user_id: &str, now: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, created_at) VALUES (?1, ?2) ON CONFLICT (id) DO NOTHING",
        rusqlite::params![user_id, now as i64],
    )?;
    Ok(())
}

/// Load a user's state, if any.
pub fn find(conn: &Connection, user_id: &str) -> Result<Option<UserState>> {
    Ok(conn.query_row(SELECT_STATE, [user_id], map_state).optional()?)
}

/// Load a user's state.
pub fn get(conn: &Connection, user_id: &str) -> Result<UserState> {
    find(conn, user_id)?.ok_or_else(|| DbError::NotFound(format!("user state '{user_id}'")))
}

/// Load a user's state, inserting a default row with `session_id` when the
/// user has none.
pub fn get_or_create(
    conn: &Connection,
    user_id: &str,
    session_id: &str,
    now: u64,
) -> Result<UserState> {
    if let Some(state) = find(conn, user_id)? {
        return Ok(state);
    }

    ensure_user(conn, user_id, now)?;
    conn.execute(
        "INSERT INTO user_state (user_id, session_id, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO NOTHING",
        rusqlite::params![user_id, session_id, now as i64],
    )?;
    tracing::info!(user_id, "created user state");
    get(conn, user_id)
}

/// Write every field of `state` and bump its version, provided the stored
/// version still equals `state.state_version`.
///
/// On success `state.state_version` is advanced to the stored value. A
/// zero-row update leaves both the row and `state` untouched and returns
/// [`DbError::VersionConflict`].
pub fn persist(conn: &Connection, state: &mut UserState, now: u64) -> Result<()> {
    let next_version = state.state_version + 1;
    let updated = conn.execute(
        "UPDATE user_state SET session_id = ?2, current_difficulty = ?3, streak = ?4,
            wrong_streak = ?5, max_streak = ?6, total_score = ?7, accuracy = ?8,
            answers_count = ?9, last_question_id = ?10, cycle_position = ?11,
            queue_difficulty = ?12, difficulty_question_queue = ?13, recent_question_ids = ?14,
            last_answer_at = ?15, recent_performance = ?16, state_version = ?17, updated_at = ?18,
            streak_decayed_at = ?20
         WHERE user_id = ?1 AND state_version = ?19",
        rusqlite::params![
            state.user_id,
            state.session_id,
            i64::from(state.current_difficulty.get()),
            i64::from(state.streak),
            i64::from(state.wrong_streak),
            i64::from(state.max_streak),
            state.total_score,
            state.accuracy,
            state.answers_count as i64,
            state.last_question_id,
            state.cycle_position as i64,
            state.queue_difficulty.map(|d| i64::from(d.get())),
            to_json(&state.difficulty_question_queue)?,
            to_json(&state.recent_question_ids)?,
            state.last_answer_at.map(|t| t as i64),
            to_json(&state.recent_performance)?,
            next_version as i64,
            now as i64,
            state.state_version as i64,
            state.streak_decayed_at.map(|t| t as i64),
        ],
    )?;

    if updated != 1 {
        return Err(DbError::VersionConflict {
            user_id: state.user_id.clone(),
            expected: state.state_version,
        });
    }

    state.state_version = next_version;
    Ok(())
}
