//! Circular per-difficulty question queue.
//!
//! The queue is a seeded permutation of one difficulty bucket. Every
//! question is served exactly once before any repeats; the queue is rebuilt
//! when it is empty, was built for a different difficulty, or no longer
//! matches the bucket after the question set changed.

use quiz_types::{Difficulty, QuizQuestion, UserState};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::{EngineError, QuestionBank, Result};

/// Deterministic Fisher-Yates permutation of `ids`. The same seed always
/// yields the same order.
pub fn shuffle_with_seed(ids: &[String], seed: u64) -> Vec<String> {
    let mut shuffled = ids.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);
    shuffled
}

/// Seed for a fresh cycle. Mixes the difficulty with the wall-clock time so
/// successive cycles come out in different orders.
pub fn cycle_seed(difficulty: Difficulty, now_millis: u64) -> u64 {
    (u64::from(difficulty.get()) << 56) ^ now_millis
}

/// Whether a saved queue is still a full permutation of the bucket.
fn queue_matches_bucket(
    bank: &QuestionBank,
    queue: &[String],
    difficulty: Difficulty,
    bucket_len: usize,
) -> bool {
    queue.len() == bucket_len
        && queue
            .iter()
            .all(|id| bank.get(id).is_some_and(|q| q.difficulty == difficulty))
}

/// Serve the next question for `difficulty` from the user's queue,
/// rebuilding the queue with `seed` when required. Mutates only the queue
/// fields of `state`.
pub fn pick_circular<'a>(
    bank: &'a QuestionBank,
    state: &mut UserState,
    difficulty: Difficulty,
    seed: u64,
) -> Result<&'a QuizQuestion> {
    let pool = bank.bucket(difficulty);
    if pool.is_empty() {
        return Err(EngineError::NoQuestionsAvailable(Some(difficulty)));
    }

    let needs_reset = state.queue_difficulty != Some(difficulty)
        || !queue_matches_bucket(bank, &state.difficulty_question_queue, difficulty, pool.len());
    if needs_reset {
        let ids: Vec<String> = pool.iter().map(|q| q.id.clone()).collect();
        state.difficulty_question_queue = shuffle_with_seed(&ids, seed);
        state.cycle_position = 0;
        state.queue_difficulty = Some(difficulty);
        tracing::debug!(
            user_id = %state.user_id,
            %difficulty,
            size = ids.len(),
            "rebuilt question queue"
        );
    }

    let len = state.difficulty_question_queue.len();
    if state.cycle_position >= len {
        state.cycle_position = 0;
    }

    let question_id = &state.difficulty_question_queue[state.cycle_position];
    let question = bank.require(question_id)?;
    state.cycle_position = (state.cycle_position + 1) % len;
    Ok(question)
}
