//! Caller identity used to partition rate limit counters.

use crate::category::RateLimitCategory;
use axum::http::HeaderMap;

pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Best-effort client address from proxy headers.
///
/// The deployment sits behind a proxy that sets these headers, so no attempt
/// is made to validate them or detect spoofing.
pub fn resolve_client_ip(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| header_str(headers, "x-real-ip").filter(|ip| !ip.is_empty()))
        .unwrap_or(UNKNOWN_IDENTITY)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Store key for one `(identity, category)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(identity: &str, category: RateLimitCategory) -> Self {
        Self(format!("{}:{}", identity, category))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
