//! Leaderboard views and live-update events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two ranking dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardDimension {
    /// Ranked by total score.
    Score,
    /// Ranked by best streak.
    Streak,
}

impl LeaderboardDimension {
    pub const ALL: [LeaderboardDimension; 2] = [Self::Score, Self::Streak];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Streak => "streak",
        }
    }
}

impl fmt::Display for LeaderboardDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Self::Score),
            "streak" => Ok(Self::Streak),
            other => Err(format!("unknown leaderboard dimension '{other}'")),
        }
    }
}

/// A derived leaderboard row. Never persisted on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub score: i64,
    /// 1-based.
    pub rank: u64,
}

/// A page of the leaderboard plus the caller's own cached rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    /// 0 when the caller is not in the cached set.
    pub user_rank: u64,
}

/// Change event published on every accepted answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEvent {
    pub user_id: String,
    pub total_score: i64,
    pub max_streak: u32,
}
