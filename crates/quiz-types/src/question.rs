//! Read-only question content.

use serde::{Deserialize, Serialize};

use crate::Difficulty;

/// Question identifier.
pub type QuestionId = String;

/// One quiz question. Immutable reference data, partitioned by difficulty.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QuizQuestion {
    pub fn is_correct(&self, answer_index: usize) -> bool {
        self.correct_index == answer_index
    }
}
