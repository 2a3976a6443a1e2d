//! Live leaderboard stream for one subscriber.
//!
//! A subscriber sees `connected` once, then every published update, with
//! `ping` heartbeats in between.

use std::time::Duration;

use quiz_types::LeaderboardEvent;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::warn;

/// One message on the live stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum FeedMessage {
    Connected { ok: bool },
    Leaderboard(LeaderboardEvent),
    /// `t` is unix milliseconds.
    Ping { t: u64 },
}

pub struct LeaderboardFeed {
    updates: broadcast::Receiver<String>,
    ping: Interval,
    greeted: bool,
}

impl LeaderboardFeed {
    pub fn new(updates: broadcast::Receiver<String>, ping_every: Duration) -> Self {
        let period = ping_every.max(Duration::from_millis(1));
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            updates,
            ping,
            greeted: false,
        }
    }

    /// Next message for this subscriber; `None` once the channel closes.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        if !self.greeted {
            self.greeted = true;
            return Some(FeedMessage::Connected { ok: true });
        }

        loop {
            tokio::select! {
                update = self.updates.recv() => match update {
                    Ok(payload) => match serde_json::from_str::<LeaderboardEvent>(&payload) {
                        Ok(event) => return Some(FeedMessage::Leaderboard(event)),
                        Err(e) => warn!("dropping malformed leaderboard update: {e}"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "leaderboard subscriber lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = self.ping.tick() => {
                    return Some(FeedMessage::Ping { t: crate::unix_millis() });
                }
            }
        }
    }
}
