//! Configuration file management.
//!
//! `$QUIZ_DATA_DIR/config.toml` (or `~/.adaptive-quiz/config.toml`); every
//! field has a default so a missing file or section is fine.

use std::path::PathBuf;

use quiz_service::{PickerMode, ServiceConfig};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "QUIZ_DATA_DIR";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// JSON question file. Empty = built-in question set.
    #[serde(default)]
    pub question_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    #[serde(default)]
    pub picker: PickerMode,
    /// Minutes of inactivity before a streak loses a point.
    #[serde(default = "default_decay_minutes")]
    pub decay_minutes: u64,
}

/// Fixed-window rate limits, per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_answer_max_per_user")]
    pub answer_max_per_user: u64,
    #[serde(default = "default_answer_max_per_client")]
    pub answer_max_per_client: u64,
    #[serde(default = "default_next_max_per_user")]
    pub next_max_per_user: u64,
    #[serde(default = "default_next_max_per_client")]
    pub next_max_per_client: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Rows per dimension copied into the cache on hydrate.
    #[serde(default = "default_hydrate_limit")]
    pub hydrate_limit: usize,
    /// 0 disables the periodic rebuild.
    #[serde(default = "default_hydrate_interval")]
    pub hydrate_interval_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

/// Leaderboard and rate-limit cache backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL, e.g. `redis://127.0.0.1:6379/0`. Empty = in-process cache,
    /// which is not shared between daemons.
    #[serde(default)]
    pub url: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// "production" | "development". Development bypasses rate limits.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_decay_minutes() -> u64 {
    quiz_engine::adaptive::DEFAULT_DECAY_MINUTES
}

fn default_window_seconds() -> u64 {
    60
}

fn default_answer_max_per_user() -> u64 {
    300
}

fn default_answer_max_per_client() -> u64 {
    500
}

fn default_next_max_per_user() -> u64 {
    600
}

fn default_next_max_per_client() -> u64 {
    1000
}

fn default_hydrate_limit() -> usize {
    200
}

fn default_hydrate_interval() -> u64 {
    60
}

fn default_ping_interval() -> u64 {
    15
}

fn default_max_page_size() -> usize {
    100
}

fn default_page_size() -> usize {
    10
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            picker: PickerMode::default(),
            decay_minutes: default_decay_minutes(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: default_window_seconds(),
            answer_max_per_user: default_answer_max_per_user(),
            answer_max_per_client: default_answer_max_per_client(),
            next_max_per_user: default_next_max_per_user(),
            next_max_per_client: default_next_max_per_client(),
        }
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            hydrate_limit: default_hydrate_limit(),
            hydrate_interval_secs: default_hydrate_interval(),
            ping_interval_secs: default_ping_interval(),
            max_page_size: default_max_page_size(),
            default_page_size: default_page_size(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Redis URL when a shared cache is configured.
    pub fn cache_url(&self) -> Option<&str> {
        let url = self.cache.url.trim();
        (!url.is_empty()).then_some(url)
    }

    /// Whether rate limiting is bypassed.
    pub fn is_development(&self) -> bool {
        self.advanced.environment.eq_ignore_ascii_case("development")
    }

    pub fn limits_active(&self) -> bool {
        self.limits.enabled && !self.is_development()
    }

    /// Tunables handed to the quiz service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            picker: self.quiz.picker,
            decay_minutes: self.quiz.decay_minutes,
            answer_max_per_user: self.limits.answer_max_per_user,
            answer_max_per_client: self.limits.answer_max_per_client,
            next_max_per_user: self.limits.next_max_per_user,
            next_max_per_client: self.limits.next_max_per_client,
            hydrate_limit: self.leaderboard.hydrate_limit,
            max_page_size: self.leaderboard.max_page_size,
            default_page_size: self.leaderboard.default_page_size,
            ping_interval_secs: self.leaderboard.ping_interval_secs,
        }
    }

    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".adaptive-quiz"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/adaptive-quiz"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.quiz.picker, PickerMode::Circular);
        assert_eq!(config.quiz.decay_minutes, 10);
        assert_eq!(config.limits.window_seconds, 60);
        assert_eq!(config.limits.answer_max_per_user, 300);
        assert_eq!(config.leaderboard.hydrate_limit, 200);
        assert!(config.limits_active());
        assert_eq!(config.cache_url(), None);
    }

    #[test]
    fn test_cache_section() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [cache]
            url = " redis://127.0.0.1:6379/0 "
            "#,
        )
        .expect("parse");
        assert_eq!(config.cache_url(), Some("redis://127.0.0.1:6379/0"));

        let config: DaemonConfig = toml::from_str("[cache]\nurl = \"\"\n").expect("parse");
        assert_eq!(config.cache_url(), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [quiz]
            picker = "random"

            [advanced]
            environment = "development"
            "#,
        )
        .expect("parse");
        assert_eq!(config.quiz.picker, PickerMode::Random);
        assert_eq!(config.quiz.decay_minutes, 10);
        assert!(config.is_development());
        assert!(!config.limits_active());
        assert_eq!(config.service_config().next_max_per_user, 600);
    }
}
