//! Persistent per-user quiz state.

use serde::{Deserialize, Serialize};

use crate::{Difficulty, QuestionId, UserId};

/// One row per user, owned by the state store and only mutated inside a
/// locked transaction.
///
/// `state_version` is the optimistic-concurrency token: every persisted
/// mutation must present the version it read and bumps it by exactly one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub user_id: UserId,
    pub session_id: String,
    pub current_difficulty: Difficulty,
    pub streak: u32,
    pub wrong_streak: u32,
    /// Always `>= streak` once persisted.
    pub max_streak: u32,
    pub total_score: i64,
    /// Cumulative running mean of correctness in `[0, 1]`.
    pub accuracy: f64,
    pub answers_count: u64,
    pub last_question_id: Option<QuestionId>,
    /// Index into `difficulty_question_queue`.
    pub cycle_position: usize,
    /// Difficulty the current queue was built for.
    pub queue_difficulty: Option<Difficulty>,
    pub difficulty_question_queue: Vec<QuestionId>,
    /// Most-recent-first, bounded by [`crate::RECENT_QUESTIONS_WINDOW`].
    pub recent_question_ids: Vec<QuestionId>,
    /// Unix epoch seconds.
    pub last_answer_at: Option<u64>,
    /// When inactivity decay last fired. At most one decay per idle gap:
    /// a value at or after `last_answer_at` means this gap is spent.
    #[serde(default)]
    pub streak_decayed_at: Option<u64>,
    /// Oldest-first 0/1 flags, bounded by [`crate::RECENT_PERFORMANCE_WINDOW`].
    pub recent_performance: Vec<u8>,
    pub state_version: u64,
}

impl UserState {
    /// Default-initialised state for a user seen for the first time.
    pub fn new(user_id: impl Into<UserId>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            current_difficulty: Difficulty::MIN,
            streak: 0,
            wrong_streak: 0,
            max_streak: 0,
            total_score: 0,
            accuracy: 0.0,
            answers_count: 0,
            last_question_id: None,
            cycle_position: 0,
            queue_difficulty: None,
            difficulty_question_queue: Vec::new(),
            recent_question_ids: Vec::new(),
            last_answer_at: None,
            streak_decayed_at: None,
            recent_performance: Vec::new(),
            state_version: 0,
        }
    }

    /// Push a served question onto the bounded recent list.
    pub fn remember_question(&mut self, question_id: &str) {
        self.recent_question_ids.insert(0, question_id.to_string());
        self.recent_question_ids
            .truncate(crate::RECENT_QUESTIONS_WINDOW);
    }

    /// Append a correctness flag, evicting the oldest past the window.
    pub fn record_performance(&mut self, correct: bool) {
        self.recent_performance.push(u8::from(correct));
        let overflow = self
            .recent_performance
            .len()
            .saturating_sub(crate::RECENT_PERFORMANCE_WINDOW);
        self.recent_performance.drain(..overflow);
    }
}
