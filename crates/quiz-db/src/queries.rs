//! Database query functions organized by domain.

pub mod answers;
pub mod leaderboard;
pub mod state;
