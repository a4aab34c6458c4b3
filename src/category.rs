use serde::Serialize;
use std::fmt;

/// Rate limit bucket a gated path falls into. Each category carries its own
/// quota, see [`crate::rate_limit_config::RateLimitConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitCategory {
    /// Full machine id listing, the most expensive endpoint.
    Listing,
    Search,
    Print,
    /// Any other gated API path.
    Default,
}

/// Most specific prefix first.
const PREFIXES: &[(&str, RateLimitCategory)] = &[
    ("/api/pinrules/opendbids", RateLimitCategory::Listing),
    ("/api/pinrules/search", RateLimitCategory::Search),
    ("/print/", RateLimitCategory::Print),
];

impl RateLimitCategory {
    pub const ALL: [RateLimitCategory; 4] = [
        RateLimitCategory::Listing,
        RateLimitCategory::Search,
        RateLimitCategory::Print,
        RateLimitCategory::Default,
    ];

    /// Classify a request path by prefix.
    pub fn classify(path: &str) -> Self {
        PREFIXES
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix))
            .map(|(_, category)| *category)
            .unwrap_or(RateLimitCategory::Default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitCategory::Listing => "opendbids",
            RateLimitCategory::Search => "search",
            RateLimitCategory::Print => "print",
            RateLimitCategory::Default => "api_default",
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
