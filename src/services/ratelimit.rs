use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::RateLimitConfig;
use crate::error::{AppError, Result};

/// Decision for one hit against a window
#[derive(Debug, Clone, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Pluggable counter backend so the in-process map can be swapped for a
/// shared store without touching call sites.
pub trait CounterStore: Send + Sync {
    fn hit(&self, key: &str, limit: u32, window: Duration, now: DateTime<Utc>) -> RateDecision;
}

struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Single-instance in-memory counter store. Not safe across multiple
/// processes; replace the backend for multi-instance deployments.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn hit(&self, key: &str, limit: u32, window: Duration, now: DateTime<Utc>) -> RateDecision {
        let mut windows = self.windows.lock();

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window,
        });

        // Expired windows reset before use
        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            remaining: limit - entry.count,
            reset_at: entry.reset_at,
        }
    }
}

/// Fixed-window limiter keyed by `(user, action)`
pub struct RateLimiter {
    store: Box<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Box<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, user_id: &str, action: &str, limit: u32, window: Duration) -> RateDecision {
        let key = format!("{}:{}", user_id, action);
        self.store.hit(&key, limit, window, Utc::now())
    }

    /// Gate an upload-class request against the configured window. Every
    /// path that writes a new object goes through here.
    pub fn check_upload(&self, config: &RateLimitConfig, user_id: &str) -> Result<()> {
        let decision = self.check(
            user_id,
            "upload",
            config.upload_limit,
            Duration::seconds(config.upload_window_secs as i64),
        );
        if decision.allowed {
            Ok(())
        } else {
            Err(AppError::BadRequest(format!(
                "rate limit exceeded; retry after {}",
                decision.reset_at.to_rfc3339()
            )))
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Box::new(MemoryCounterStore::new()))
    }
}
