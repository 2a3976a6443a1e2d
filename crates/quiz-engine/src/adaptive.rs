//! Adaptive difficulty state machine.
//!
//! - Streak: `+1` on correct, `-1` (floor 0) on wrong.
//! - Wrong streak: reset on correct, `+1` on wrong.
//! - Promotion when `streak >= 2` and below max; streak carries over.
//! - Otherwise demotion when `wrong_streak >= 2` and above min; the wrong
//!   streak resets because it is scoped to a level.
//!
//! Inactivity decay is a separate step that runs before the transition.

use quiz_types::{Difficulty, UserState};

/// Consecutive correct answers needed to move up a level.
pub const MIN_STREAK_TO_RISE: u32 = 2;

/// Consecutive wrong answers needed to move down a level.
pub const MIN_WRONG_STREAK_TO_DROP: u32 = 2;

/// Default inactivity window before a streak decays.
pub const DEFAULT_DECAY_MINUTES: u64 = 10;

/// The slice of user state the machine reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub difficulty: Difficulty,
    pub streak: u32,
    pub wrong_streak: u32,
}

impl Progress {
    pub fn of(state: &UserState) -> Self {
        Self {
            difficulty: state.current_difficulty,
            streak: state.streak,
            wrong_streak: state.wrong_streak,
        }
    }
}

/// Apply one answer to `prev`.
pub fn next_state(prev: Progress, correct: bool) -> Progress {
    let streak = if correct {
        prev.streak.saturating_add(1)
    } else {
        prev.streak.saturating_sub(1)
    };
    let mut wrong_streak = if correct {
        0
    } else {
        prev.wrong_streak.saturating_add(1)
    };

    let mut difficulty = prev.difficulty;
    if streak >= MIN_STREAK_TO_RISE && difficulty < Difficulty::MAX {
        difficulty = difficulty.harder();
    } else if wrong_streak >= MIN_WRONG_STREAK_TO_DROP && difficulty > Difficulty::MIN {
        difficulty = difficulty.easier();
        wrong_streak = 0;
    }

    Progress {
        difficulty,
        streak,
        wrong_streak,
    }
}

/// Streak after inactivity: one point is lost once `threshold_minutes`
/// have elapsed since the last answer. `now` and `last_answer_at` are
/// unix seconds.
pub fn decay_streak(
    streak: u32,
    last_answer_at: Option<u64>,
    now: u64,
    threshold_minutes: u64,
) -> u32 {
    let Some(last) = last_answer_at else {
        return streak;
    };
    let elapsed = now.saturating_sub(last);
    if elapsed < threshold_minutes.saturating_mul(60) {
        return streak;
    }
    streak.saturating_sub(1)
}

/// Apply inactivity decay to `state` in place. When the streak actually
/// drops, the wrong streak is cleared as well and the gap is marked spent,
/// so a later call before the next answer does not decay again. Returns
/// whether it fired.
pub fn apply_inactivity_decay(state: &mut UserState, now: u64, threshold_minutes: u64) -> bool {
    if let (Some(decayed_at), Some(last)) = (state.streak_decayed_at, state.last_answer_at) {
        if decayed_at >= last {
            return false;
        }
    }
    let decayed = decay_streak(state.streak, state.last_answer_at, now, threshold_minutes);
    if decayed == state.streak {
        return false;
    }
    tracing::debug!(
        user_id = %state.user_id,
        from = state.streak,
        to = decayed,
        "streak decayed for inactivity"
    );
    state.streak = decayed;
    state.wrong_streak = 0;
    state.streak_decayed_at = Some(now);
    true
}
