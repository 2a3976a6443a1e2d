//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Users & adaptive state
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_state (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    session_id TEXT NOT NULL,
    current_difficulty INTEGER NOT NULL DEFAULT 1
        CHECK (current_difficulty BETWEEN 1 AND 10),
    streak INTEGER NOT NULL DEFAULT 0 CHECK (streak >= 0),
    wrong_streak INTEGER NOT NULL DEFAULT 0 CHECK (wrong_streak >= 0),
    max_streak INTEGER NOT NULL DEFAULT 0 CHECK (max_streak >= streak),
    total_score INTEGER NOT NULL DEFAULT 0,
    accuracy REAL NOT NULL DEFAULT 0 CHECK (accuracy BETWEEN 0 AND 1),
    answers_count INTEGER NOT NULL DEFAULT 0 CHECK (answers_count >= 0),
    last_question_id TEXT,
    cycle_position INTEGER NOT NULL DEFAULT 0 CHECK (cycle_position >= 0),
    queue_difficulty INTEGER CHECK (queue_difficulty BETWEEN 1 AND 10),
    difficulty_question_queue TEXT NOT NULL DEFAULT '[]',
    recent_question_ids TEXT NOT NULL DEFAULT '[]',
    last_answer_at INTEGER,
    recent_performance TEXT NOT NULL DEFAULT '[]',
    state_version INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);

-- ============================================================
-- Append-only answer log (idempotency ledger)
-- ============================================================

CREATE TABLE IF NOT EXISTS answer_log (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    question_id TEXT NOT NULL,
    difficulty INTEGER NOT NULL,
    answer TEXT NOT NULL,
    correct INTEGER NOT NULL,
    score_delta INTEGER NOT NULL,
    streak_at_answer INTEGER NOT NULL,
    answer_idempotency_key TEXT NOT NULL,
    response_payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, answer_idempotency_key)
);

CREATE INDEX IF NOT EXISTS idx_answer_log_user_difficulty
    ON answer_log(user_id, difficulty);

-- ============================================================
-- Ranked leaderboard tables (source of truth for the cache)
-- ============================================================

CREATE TABLE IF NOT EXISTS leaderboard_score (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    total_score INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leaderboard_score_value
    ON leaderboard_score(total_score DESC);

CREATE TABLE IF NOT EXISTS leaderboard_streak (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    max_streak INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leaderboard_streak_value
    ON leaderboard_streak(max_streak DESC);
"#;

/// v2: mark the idle gap an inactivity decay was applied for.
pub const MIGRATION_V2: &str = r#"
ALTER TABLE user_state ADD COLUMN streak_decayed_at INTEGER;
"#;
