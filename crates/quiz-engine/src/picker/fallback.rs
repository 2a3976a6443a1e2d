//! Random question pick with repeat avoidance and nearest-bucket search.

use quiz_types::{Difficulty, QuizQuestion};
use rand::Rng;

use crate::{EngineError, QuestionBank, Result};

/// The closest non-empty bucket to `difficulty`: exact first, then
/// outward by increasing distance, trying the harder side before the easier.
pub fn nearest_bucket(bank: &QuestionBank, difficulty: Difficulty) -> Option<&[QuizQuestion]> {
    let exact = bank.bucket(difficulty);
    if !exact.is_empty() {
        return Some(exact);
    }

    let level = i64::from(difficulty.get());
    let span = i64::from(Difficulty::MAX.get() - Difficulty::MIN.get());
    for delta in 1..=span {
        for candidate in [level + delta, level - delta] {
            if let Ok(d) = Difficulty::try_from(candidate) {
                let bucket = bank.bucket(d);
                if !bucket.is_empty() {
                    return Some(bucket);
                }
            }
        }
    }
    None
}

/// Pick uniformly at random near `difficulty`, skipping `last_question_id`
/// and `recent_ids` unless that would leave nothing to pick.
pub fn pick_random<'a, R: Rng + ?Sized>(
    bank: &'a QuestionBank,
    difficulty: Difficulty,
    last_question_id: Option<&str>,
    recent_ids: &[String],
    rng: &mut R,
) -> Result<&'a QuizQuestion> {
    let pool = nearest_bucket(bank, difficulty).ok_or(EngineError::NoQuestionsAvailable(None))?;

    let filtered: Vec<&QuizQuestion> = pool
        .iter()
        .filter(|q| Some(q.id.as_str()) != last_question_id && !recent_ids.contains(&q.id))
        .collect();

    if filtered.is_empty() {
        return Ok(&pool[rng.gen_range(0..pool.len())]);
    }
    Ok(filtered[rng.gen_range(0..filtered.len())])
}
