use crate::category::RateLimitCategory;
use std::time::Duration;

/// Length of one fixed counting window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Per-category quotas applied by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub listing: u32,
    pub search: u32,
    pub print: u32,
    pub default: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: WINDOW,
            listing: 10,
            search: 20,
            print: 20,
            default: 30,
        }
    }
}

impl RateLimitConfig {
    /// Requests admitted per window for a category.
    pub fn quota(&self, category: RateLimitCategory) -> u32 {
        match category {
            RateLimitCategory::Listing => self.listing,
            RateLimitCategory::Search => self.search,
            RateLimitCategory::Print => self.print,
            RateLimitCategory::Default => self.default,
        }
    }

    /// Same quota for every category, handy in tests.
    pub fn uniform(quota: u32) -> Self {
        Self {
            window: WINDOW,
            listing: quota,
            search: quota,
            print: quota,
            default: quota,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.window.is_zero() {
            return Err("Window size must be greater than 0".to_string());
        }
        for category in RateLimitCategory::ALL {
            if self.quota(category) == 0 {
                return Err(format!("Quota for '{}' must be greater than 0", category));
            }
        }
        Ok(())
    }
}
