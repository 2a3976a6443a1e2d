//! # quiz-types
//!
//! Shared domain types for the adaptive quiz workspace.
//!
//! Wire-facing structures serialize with camelCase field names, which is
//! the shape the UI and HTTP collaborators consume.

pub mod answer;
pub mod difficulty;
pub mod leaderboard;
pub mod question;
pub mod state;

pub use answer::{AnswerResult, DifficultyHistogram, NextQuestion, QuizMetrics};
pub use difficulty::{Difficulty, InvalidDifficulty};
pub use leaderboard::{LeaderboardDimension, LeaderboardEntry, LeaderboardEvent, LeaderboardPage};
pub use question::{QuestionId, QuizQuestion};
pub use state::UserState;

/// Opaque stable user identifier.
pub type UserId = String;

/// Maximum number of correctness flags kept in `recent_performance`.
pub const RECENT_PERFORMANCE_WINDOW: usize = 10;

/// Maximum number of served question ids kept in `recent_question_ids`.
pub const RECENT_QUESTIONS_WINDOW: usize = 10;
