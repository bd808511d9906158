//! Fixed-window rate limiting, global and per submitter.
//!
//! State is process-local: counters are created with the limiter and
//! discarded with it. Nothing survives a restart.
//!
//! Each counter resets lazily when it is next touched after its window
//! has elapsed. The global counter and each submitter's counter keep
//! their own window start, so boundaries are not synchronized.
//!
//! Only accepted attempts are counted. A submitter who is over their own
//! limit never consumes global budget, so one noisy submitter can't lock
//! everyone else out while being individually rejected.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::Result;

/// Which limit rejected an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Global,
    PerUser,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::PerUser => "per_user",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`RateLimiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected(Scope),
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Point-in-time view of the limiter, for logs and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSnapshot {
    pub global_count: u32,
    pub tracked_submitters: usize,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: Instant,
    count: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            *self = Self::new(now);
        }
    }
}

#[derive(Debug)]
struct Windows {
    global: WindowCounter,
    per_user: HashMap<String, WindowCounter>,
}

/// Fixed-window limiter over one global counter and one counter per submitter.
///
/// All counters live behind a single mutex, so check-and-increment is one
/// critical section and concurrent callers can't over-admit.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    /// Create a limiter. Fails if any limit is non-positive.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            windows: Mutex::new(Windows {
                global: WindowCounter::new(Instant::now()),
                per_user: HashMap::new(),
            }),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or reject one submission attempt by `submitter_id`.
    pub async fn admit(&self, submitter_id: &str) -> Admission {
        let mut guard = self.windows.lock().await;
        let windows = &mut *guard;
        let now = Instant::now();
        let window = self.config.window;

        windows.global.roll(now, window);
        let global_count = windows.global.count;

        let user = windows
            .per_user
            .entry(submitter_id.to_string())
            .or_insert_with(|| WindowCounter::new(now));
        user.roll(now, window);

        if global_count >= self.config.global_limit {
            debug!(submitter_id, global_count, "rejected: global limit");
            return Admission::Rejected(Scope::Global);
        }
        if user.count >= self.config.per_user_limit {
            debug!(submitter_id, user_count = user.count, "rejected: per-user limit");
            return Admission::Rejected(Scope::PerUser);
        }

        user.count += 1;
        windows.global.count += 1;
        Admission::Allowed
    }

    pub async fn snapshot(&self) -> LimiterSnapshot {
        let windows = self.windows.lock().await;
        let expired = Instant::now().saturating_duration_since(windows.global.window_start)
            >= self.config.window;
        LimiterSnapshot {
            global_count: if expired { 0 } else { windows.global.count },
            tracked_submitters: windows.per_user.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: u32, per_user: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(60, global, per_user).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn per_user_rejection_does_not_spend_global_budget() {
        let limiter = limiter(3, 1);

        assert_eq!(limiter.admit("alice").await, Admission::Allowed);
        for _ in 0..10 {
            assert_eq!(
                limiter.admit("alice").await,
                Admission::Rejected(Scope::PerUser)
            );
        }

        // Global budget is 3, and only one of alice's attempts counted.
        assert_eq!(limiter.admit("bob").await, Admission::Allowed);
        assert_eq!(limiter.admit("carol").await, Admission::Allowed);
        assert_eq!(
            limiter.admit("dave").await,
            Admission::Rejected(Scope::Global)
        );
    }

    #[tokio::test]
    async fn global_check_takes_precedence() {
        let limiter = limiter(1, 1);
        assert!(limiter.admit("alice").await.is_allowed());
        // alice is over both limits; global is reported.
        assert_eq!(
            limiter.admit("alice").await,
            Admission::Rejected(Scope::Global)
        );
    }

    #[test]
    fn rejects_invalid_config() {
        let config = RateLimitConfig {
            window: Duration::from_secs(60),
            global_limit: 0,
            per_user_limit: 1,
        };
        assert!(RateLimiter::new(config).is_err());
    }
}
