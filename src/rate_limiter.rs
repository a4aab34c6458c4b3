use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::category::RateLimitCategory;
use crate::clock::{Clock, SystemClock};
use crate::error::{GateError, Result};
use crate::identity::RateLimitKey;
use crate::rate_limit_config::RateLimitConfig;

/// Process-local fixed-window rate limiter.
///
/// Counters live only in this process; a restart resets every quota and
/// separate processes never share counts.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    clock: Arc<dyn Clock>,
    windows: Arc<RwLock<HashMap<RateLimitKey, RateWindow>>>,
}

/// Counter state for one `(identity, category)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at_ms: u64,
}

impl RateWindow {
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.reset_at_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
}

impl RateLimitDecision {
    /// Reset time as whole epoch seconds, rounded up.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }

    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at_ms.saturating_sub(now_ms).div_ceil(1000)
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        RateLimiter {
            config: Arc::new(config),
            clock,
            windows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Count one request against the caller's window for `category`.
    ///
    /// Runs entirely under the write lock so concurrent callers on the same
    /// key can never admit more than the quota.
    pub fn check_and_increment(
        &self,
        identity: &str,
        category: RateLimitCategory,
    ) -> Result<RateLimitDecision> {
        let limit = self.config.quota(category);
        let key = RateLimitKey::new(identity, category);
        let now = self.clock.now_millis();

        let mut windows = self.windows.write()
            .map_err(|_| GateError::Internal("Failed to acquire write lock on rate windows".to_string()))?;

        let window = windows.entry(key).or_insert(RateWindow {
            count: 0,
            reset_at_ms: 0,
        });

        if window.count == 0 || window.is_expired(now) {
            *window = RateWindow {
                count: 1,
                reset_at_ms: now + self.config.window_millis(),
            };
            return Ok(RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(1),
                reset_at_ms: window.reset_at_ms,
            });
        }

        if window.count >= limit {
            return Ok(RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at_ms: window.reset_at_ms,
            });
        }

        window.count += 1;
        Ok(RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit - window.count,
            reset_at_ms: window.reset_at_ms,
        })
    }

    /// Current window for a pair, if one is tracked.
    pub fn window(&self, identity: &str, category: RateLimitCategory) -> Result<Option<RateWindow>> {
        let windows = self.windows.read()
            .map_err(|_| GateError::Internal("Failed to acquire read lock on rate windows".to_string()))?;

        Ok(windows.get(&RateLimitKey::new(identity, category)).copied())
    }

    /// Drop every window whose reset time has passed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();

        let mut windows = self.windows.write()
            .map_err(|_| GateError::Internal("Failed to acquire write lock on rate windows".to_string()))?;

        let initial_count = windows.len();
        windows.retain(|_, window| !window.is_expired(now));

        Ok(initial_count - windows.len())
    }

    pub fn tracked_windows(&self) -> Result<usize> {
        let windows = self.windows.read()
            .map_err(|_| GateError::Internal("Failed to acquire read lock on rate windows".to_string()))?;

        Ok(windows.len())
    }

    /// Poison the window lock by panicking while holding it.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let windows = Arc::clone(&self.windows);
        let _ = std::thread::spawn(move || {
            let _guard = windows.write().unwrap();
            panic!("poisoning rate windows");
        })
        .join();
    }

    /// Sweep expired windows on a fixed interval, independent of traffic.
    pub fn spawn_cleanup_task(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match limiter.cleanup_expired() {
                    Ok(0) => {}
                    Ok(removed) => {
                        tracing::debug!(removed, "swept expired rate windows");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "rate window sweep failed");
                    }
                }
            }
        })
    }
}
