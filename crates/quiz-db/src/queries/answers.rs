//! Append-only answer log and idempotency ledger.
//!
//! Each accepted answer is stored once per `(user_id, idempotency key)`
//! together with the exact response payload that was returned, so a
//! duplicate submission can be answered byte-for-byte.

use quiz_types::{Difficulty, DifficultyHistogram};
use rusqlite::{Connection, OptionalExtension};

use crate::{DbError, Result};

/// A row to append to the answer log.
#[derive(Debug, Clone)]
pub struct NewAnswer<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub question_id: &'a str,
    pub difficulty: Difficulty,
    /// Text of the chosen answer, kept for audit.
    pub answer: &'a str,
    pub correct: bool,
    pub score_delta: i64,
    pub streak_at_answer: u32,
    pub idempotency_key: &'a str,
    pub response_payload: &'a str,
    pub created_at: u64,
}

/// Outcome of [`record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// The row was appended.
    Inserted,
    /// The key was already logged; carries the stored payload.
    AlreadyRecorded(String),
}

/// Try to append `answer`; on a `(user_id, key)` conflict read back the
/// payload that was stored first instead.
pub fn record(conn: &Connection, answer: &NewAnswer<'_>) -> Result<Recorded> {
    let inserted = conn.execute(
        "INSERT INTO answer_log (id, user_id, question_id, difficulty, answer, correct,
            score_delta, streak_at_answer, answer_idempotency_key, response_payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT (user_id, answer_idempotency_key) DO NOTHING",
        rusqlite::params![
            answer.id,
            answer.user_id,
            answer.question_id,
            i64::from(answer.difficulty.get()),
            answer.answer,
            answer.correct,
            answer.score_delta,
            i64::from(answer.streak_at_answer),
            answer.idempotency_key,
            answer.response_payload,
            answer.created_at as i64,
        ],
    )?;

    if inserted == 1 {
        return Ok(Recorded::Inserted);
    }

    fetch_response(conn, answer.user_id, answer.idempotency_key)?
        .map(Recorded::AlreadyRecorded)
        .ok_or_else(|| {
            DbError::Constraint(format!(
                "answer log insert for key '{}' ignored but no row found",
                answer.idempotency_key
            ))
        })
}

/// The stored response for a previously logged key, if any.
pub fn fetch_response(
    conn: &Connection,
    user_id: &str,
    idempotency_key: &str,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT response_payload FROM answer_log
             WHERE user_id = ?1 AND answer_idempotency_key = ?2",
            [user_id, idempotency_key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Number of logged answers for a user.
pub fn count_for_user(conn: &Connection, user_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM answer_log WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Logged answers per question difficulty, zero-filled for 1..=10.
pub fn difficulty_histogram(conn: &Connection, user_id: &str) -> Result<DifficultyHistogram> {
    let mut stmt = conn.prepare(
        "SELECT difficulty, COUNT(*) FROM answer_log WHERE user_id = ?1 GROUP BY difficulty",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut histogram = DifficultyHistogram::zeroed();
    for (difficulty, count) in rows {
        match Difficulty::try_from(difficulty) {
            Ok(d) => histogram.set(d, count as u64),
            Err(e) => tracing::warn!(user_id, "skipping answer log bucket: {e}"),
        }
    }
    Ok(histogram)
}
