//! Fixed-window rate limiting on top of [`CacheStore`] counters.
//!
//! One counter per `ratelimit:<scope>:<key>`; the first increment in a
//! window sets its expiry in the same step, so concurrent first requests
//! cannot race on it. A request is allowed while the counter stays at or
//! below the limit.
//!
//! The limiter fails open: when the backend errors the request is allowed
//! and the outcome is reported as [`RateLimitDecision::Degraded`].

use std::sync::Arc;
use std::time::Duration;

use crate::CacheStore;

/// Outcome of a limiter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u64 },
    Denied { count: u64, max: u64 },
    /// Backend failure; the request goes through unchecked.
    Degraded,
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateLimitDecision::Denied { .. })
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    window: Duration,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, window: Duration) -> Self {
        Self {
            store,
            window,
            enabled: true,
        }
    }

    /// Turn every check into an unconditional allow.
    pub fn bypassed(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request against `scope`/`key` and decide whether it fits
    /// within `max` for the current window.
    pub async fn check(&self, scope: &str, key: &str, max: u64) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision::Allowed { remaining: max };
        }

        let counter_key = format!("ratelimit:{scope}:{key}");
        match self.store.incr_with_expiry(&counter_key, self.window).await {
            Ok(count) if count <= max => RateLimitDecision::Allowed {
                remaining: max - count,
            },
            Ok(count) => {
                tracing::debug!(scope, key, count, max, "rate limit exceeded");
                RateLimitDecision::Denied { count, max }
            }
            Err(e) => {
                tracing::warn!(scope, key, "rate limiter degraded, allowing request: {e}");
                RateLimitDecision::Degraded
            }
        }
    }
}
