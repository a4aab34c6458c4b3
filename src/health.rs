use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::proxy::Upstream;
use crate::rate_limiter::RateLimiter;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub tracked_windows: Option<usize>,
    pub upstream: ServiceStatus,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct HealthChecker {
    rate_limiter: RateLimiter,
    upstream: Upstream,
    started_at: Instant,
}

impl HealthChecker {
    pub fn new(rate_limiter: RateLimiter, upstream: Upstream) -> Self {
        Self {
            rate_limiter,
            upstream,
            started_at: Instant::now(),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let upstream = self.check_upstream().await;

        let overall_status = if upstream.status == "healthy" {
            "healthy"
        } else {
            // The gate still answers; only forwarding is affected.
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            tracked_windows: self.rate_limiter.tracked_windows().ok(),
            upstream,
        }
    }

    /// Ready once the rate limit store can be read.
    pub fn is_ready(&self) -> bool {
        self.rate_limiter.tracked_windows().is_ok()
    }

    async fn check_upstream(&self) -> ServiceStatus {
        match self.upstream.probe().await {
            Ok(elapsed) => ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms: elapsed.as_millis() as u64,
                error: None,
            },
            Err(e) => ServiceStatus {
                status: "unhealthy".to_string(),
                response_time_ms: 0,
                error: Some(e.to_string()),
            },
        }
    }
}
