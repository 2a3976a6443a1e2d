//! Request/response payloads for the quiz operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Difficulty, QuestionId};

/// Result of an accepted answer. Stored verbatim in the answer log so a
/// duplicate submission replays the exact same bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub correct: bool,
    pub new_difficulty: Difficulty,
    pub new_streak: u32,
    pub score_delta: i64,
    pub total_score: i64,
    pub state_version: u64,
    pub leaderboard_rank_score: u64,
    pub leaderboard_rank_streak: u64,
}

/// The next question to show, plus the state the client must echo back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestion {
    pub question_id: QuestionId,
    /// The user's current difficulty, not necessarily the question's bucket.
    pub difficulty: Difficulty,
    pub prompt: String,
    pub choices: Vec<String>,
    pub session_id: String,
    pub state_version: u64,
    pub current_score: i64,
    pub current_streak: u32,
}

/// Count of logged answers per question difficulty, zero-filled for 1..=10.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(transparent)]
pub struct DifficultyHistogram(pub BTreeMap<u8, u64>);

impl DifficultyHistogram {
    pub fn zeroed() -> Self {
        Self(Difficulty::all().map(|d| (d.get(), 0)).collect())
    }

    pub fn set(&mut self, difficulty: Difficulty, count: u64) {
        self.0.insert(difficulty.get(), count);
    }

    pub fn get(&self, difficulty: Difficulty) -> u64 {
        self.0.get(&difficulty.get()).copied().unwrap_or(0)
    }
}

/// Per-user metrics view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuizMetrics {
    pub current_difficulty: Difficulty,
    pub streak: u32,
    pub max_streak: u32,
    pub total_score: i64,
    pub accuracy: f64,
    pub difficulty_histogram: DifficultyHistogram,
    pub recent_performance: Vec<u8>,
}
