//! Score delta for a single answer.
//!
//! ```text
//! base        = difficulty * 10
//! wrong       = -round(base * 0.25)
//! correct     = round(base * streak_mult * accuracy_mult * recent_bonus)
//! streak_mult = 1 + sqrt(min(streak, 8) / 8) * 0.8        in [1.0, 1.8]
//! accuracy    = 0.6 + clamp(accuracy, 0, 1) * 0.5          in [0.6, 1.1]
//! recent      = clamp(1 + (avg - 0.5) * 0.2, 0.9, 1.1)     1.0 when empty
//! ```

use quiz_types::{Difficulty, RECENT_PERFORMANCE_WINDOW};

const STREAK_CAP: u32 = 8;
const STREAK_MULTIPLIER_CAP: f64 = 1.8;
const MIN_ACCURACY_MULTIPLIER: f64 = 0.6;
const MAX_ACCURACY_MULTIPLIER: f64 = 1.1;
/// Recent bonus moves at most this far from 1.0 in either direction.
const RECENT_BONUS_RANGE: f64 = 0.1;
const WRONG_PENALTY_FACTOR: f64 = 0.25;

/// Inputs to [`score_delta`]. Streak, accuracy and recent performance are
/// the values *after* this answer has been applied.
#[derive(Clone, Copy, Debug)]
pub struct ScoreInput<'a> {
    pub difficulty: Difficulty,
    pub streak: u32,
    pub accuracy: f64,
    pub recent_performance: &'a [u8],
    pub correct: bool,
}

pub fn streak_multiplier(streak: u32) -> f64 {
    let capped = f64::from(streak.min(STREAK_CAP));
    let eased = (capped / f64::from(STREAK_CAP)).sqrt();
    1.0 + eased * (STREAK_MULTIPLIER_CAP - 1.0)
}

pub fn accuracy_multiplier(accuracy: f64) -> f64 {
    let normalized = if accuracy.is_nan() {
        0.0
    } else {
        accuracy.clamp(0.0, 1.0)
    };
    MIN_ACCURACY_MULTIPLIER + normalized * (MAX_ACCURACY_MULTIPLIER - MIN_ACCURACY_MULTIPLIER)
}

/// Bonus from the last [`RECENT_PERFORMANCE_WINDOW`] flags.
pub fn recent_bonus(recent_performance: &[u8]) -> f64 {
    let start = recent_performance
        .len()
        .saturating_sub(RECENT_PERFORMANCE_WINDOW);
    let window = &recent_performance[start..];
    if window.is_empty() {
        return 1.0;
    }

    let hits: u32 = window.iter().map(|&flag| u32::from(flag.min(1))).sum();
    let avg = f64::from(hits) / window.len() as f64;
    let nudged = 1.0 + (avg - 0.5) * (RECENT_BONUS_RANGE * 2.0);
    nudged.clamp(1.0 - RECENT_BONUS_RANGE, 1.0 + RECENT_BONUS_RANGE)
}

/// Signed score delta for one answer.
pub fn score_delta(input: &ScoreInput<'_>) -> i64 {
    let base = f64::from(input.difficulty.get()) * 10.0;

    if !input.correct {
        return -((base * WRONG_PENALTY_FACTOR).round() as i64);
    }

    let raw = base
        * streak_multiplier(input.streak)
        * accuracy_multiplier(input.accuracy)
        * recent_bonus(input.recent_performance);
    raw.round() as i64
}
