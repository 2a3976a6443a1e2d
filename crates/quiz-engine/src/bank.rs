//! Question content partitioned into per-difficulty buckets.
//!
//! Loaded once at process start and never mutated afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use quiz_types::{Difficulty, QuizQuestion};

use crate::{EngineError, Result};

/// Question set shipped with the crate.
const BUILTIN_QUESTIONS: &str = include_str!("../data/questions.json");

/// Read-only question content indexed by id and by difficulty.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    buckets: BTreeMap<Difficulty, Vec<QuizQuestion>>,
    index: HashMap<String, (Difficulty, usize)>,
}

impl QuestionBank {
    /// Build a bank, validating ids and answer indices.
    pub fn from_questions(questions: Vec<QuizQuestion>) -> Result<Self> {
        let mut bank = Self::default();
        for question in questions {
            if question.id.is_empty() {
                return Err(EngineError::InvalidContent("empty question id".into()));
            }
            if question.choices.is_empty() {
                return Err(EngineError::InvalidContent(format!(
                    "question {} has no choices",
                    question.id
                )));
            }
            if question.correct_index >= question.choices.len() {
                return Err(EngineError::InvalidContent(format!(
                    "question {} correct index {} out of {} choices",
                    question.id,
                    question.correct_index,
                    question.choices.len()
                )));
            }
            if bank.index.contains_key(&question.id) {
                return Err(EngineError::InvalidContent(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }

            let bucket = bank.buckets.entry(question.difficulty).or_default();
            bank.index
                .insert(question.id.clone(), (question.difficulty, bucket.len()));
            bucket.push(question);
        }
        Ok(bank)
    }

    /// Parse a JSON array of questions.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let questions: Vec<QuizQuestion> = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidContent(e.to_string()))?;
        Self::from_questions(questions)
    }

    /// Load a JSON question file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let bank = Self::from_json_str(&content)?;
        tracing::info!(path = %path.display(), questions = bank.len(), "loaded question bank");
        Ok(bank)
    }

    /// The built-in question set (four questions per level).
    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_QUESTIONS)
    }

    /// All questions at `difficulty`, in load order. Empty if none.
    pub fn bucket(&self, difficulty: Difficulty) -> &[QuizQuestion] {
        self.buckets
            .get(&difficulty)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, id: &str) -> Option<&QuizQuestion> {
        let (difficulty, position) = self.index.get(id)?;
        self.buckets.get(difficulty)?.get(*position)
    }

    /// Like [`QuestionBank::get`] but maps a miss to [`EngineError::QuestionNotFound`].
    pub fn require(&self, id: &str) -> Result<&QuizQuestion> {
        self.get(id)
            .ok_or_else(|| EngineError::QuestionNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
