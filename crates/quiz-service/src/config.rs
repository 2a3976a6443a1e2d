//! Tunables for the quiz service.

use serde::{Deserialize, Serialize};

/// Which picker serves next-question requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickerMode {
    /// Shuffled per-difficulty queue, no repeats within a cycle.
    #[default]
    Circular,
    /// Random pick with nearest-difficulty search.
    Random,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub picker: PickerMode,
    pub decay_minutes: u64,
    pub answer_max_per_user: u64,
    pub answer_max_per_client: u64,
    pub next_max_per_user: u64,
    pub next_max_per_client: u64,
    pub hydrate_limit: usize,
    pub max_page_size: usize,
    pub default_page_size: usize,
    pub ping_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            picker: PickerMode::Circular,
            decay_minutes: quiz_engine::adaptive::DEFAULT_DECAY_MINUTES,
            answer_max_per_user: 300,
            answer_max_per_client: 500,
            next_max_per_user: 600,
            next_max_per_client: 1000,
            hydrate_limit: 200,
            max_page_size: 100,
            default_page_size: 10,
            ping_interval_secs: 15,
        }
    }
}

impl ServiceConfig {
    /// Resolve a requested page size: absent means the default, anything
    /// else is clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}
