//! # quiz-engine
//!
//! The pure core of the adaptive quiz. Nothing in this crate performs I/O
//! beyond loading question content; every function is synchronous and safe
//! to call while holding the state store's row lock.
//!
//! ## Modules
//!
//! - [`scoring`]: signed score delta for one answer
//! - [`adaptive`]: difficulty/streak transitions and inactivity decay
//! - [`picker`]: circular per-difficulty queue and random fallback picker
//! - [`bank`]: question content partitioned into difficulty buckets

pub mod adaptive;
pub mod bank;
pub mod picker;
pub mod scoring;

pub use bank::QuestionBank;

use quiz_types::Difficulty;

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested bucket (or, for the fallback picker, every bucket) is empty.
    #[error("no questions available{}", .0.map(|d| format!(" at difficulty {d}")).unwrap_or_default())]
    NoQuestionsAvailable(Option<Difficulty>),

    /// A question id does not resolve to loaded content.
    #[error("question not found: {0}")]
    QuestionNotFound(String),

    /// Question content failed validation while loading.
    #[error("invalid question content: {0}")]
    InvalidContent(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
