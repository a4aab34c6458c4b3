//! Per-request gate: bot filtering, CORS preflight and rate limiting.
//!
//! [`Gate::evaluate`] reaches a terminal [`GateOutcome`] for a request
//! without touching the body or doing any I/O. [`gate_middleware`] renders
//! that outcome as a response, or forwards the request and decorates the
//! downstream response with quota headers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::bot_filter::{BotFilter, BotVerdict};
use crate::category::RateLimitCategory;
use crate::error::Result;
use crate::identity::resolve_client_ip;
use crate::rate_limiter::{RateLimitDecision, RateLimiter};
use crate::response;

#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Path is outside the gated surface.
    Bypass,
    Forbidden,
    Preflight {
        origin: Option<HeaderValue>,
    },
    Limited {
        decision: RateLimitDecision,
        retry_after_secs: u64,
    },
    Forward {
        decision: RateLimitDecision,
        cors_origin: Option<HeaderValue>,
    },
}

#[derive(Clone)]
pub struct Gate {
    limiter: RateLimiter,
    bot_filter: Arc<BotFilter>,
}

impl Gate {
    pub fn new(limiter: RateLimiter, bot_filter: BotFilter) -> Self {
        Self {
            limiter,
            bot_filter: Arc::new(bot_filter),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decide a request. `path` is normalized first, so dot segments and
    /// escaped dots cannot move a request out of its category.
    pub fn evaluate(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<GateOutcome> {
        let path = normalize_path(path);
        let path = path.as_str();

        if !is_gated(path) {
            return Ok(GateOutcome::Bypass);
        }

        let identity = resolve_client_ip(headers);

        // Non-ASCII bytes are still a User-Agent.
        let user_agent = headers
            .get(USER_AGENT)
            .map(|ua| String::from_utf8_lossy(ua.as_bytes()));
        let verdict = self.bot_filter.check(user_agent.as_deref());
        if verdict.is_rejected() {
            match verdict {
                BotVerdict::Signature(signature) => {
                    warn!(identity = %identity, path, signature, "rejected bot user agent");
                }
                _ => warn!(identity = %identity, path, "rejected request without user agent"),
            }
            return Ok(GateOutcome::Forbidden);
        }

        let is_api = is_api_path(path);
        let origin = headers.get(ORIGIN).cloned();

        if is_api && *method == Method::OPTIONS {
            return Ok(GateOutcome::Preflight { origin });
        }

        let category = RateLimitCategory::classify(path);
        let decision = self.limiter.check_and_increment(&identity, category)?;

        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs(self.limiter.now_millis());
            warn!(
                identity = %identity,
                category = %category,
                retry_after_secs,
                "rate limit exceeded"
            );
            return Ok(GateOutcome::Limited {
                decision,
                retry_after_secs,
            });
        }

        Ok(GateOutcome::Forward {
            decision,
            cors_origin: origin.filter(|_| is_api),
        })
    }
}

/// Axum middleware applying [`Gate::evaluate`] to every request.
///
/// The request URI is rewritten to its normalized path before it reaches the
/// proxy, so the upstream sees exactly the path the gate decided on.
pub async fn gate_middleware(State(gate): State<Gate>, mut request: Request, next: Next) -> Response {
    let path = normalize_path(request.uri().path());
    if path != request.uri().path() {
        match with_path(request.uri(), &path) {
            Ok(uri) => *request.uri_mut() = uri,
            Err(e) => {
                warn!(error = %e, uri = %request.uri(), "rejected unparseable normalized path");
                return response::bad_request();
            }
        }
    }

    let outcome = gate.evaluate(request.method(), &path, request.headers());

    match outcome {
        Ok(GateOutcome::Bypass) => next.run(request).await,
        Ok(GateOutcome::Forbidden) => response::forbidden(),
        Ok(GateOutcome::Preflight { origin }) => response::preflight(origin.as_ref()),
        Ok(GateOutcome::Limited {
            decision,
            retry_after_secs,
        }) => response::too_many_requests(&decision, retry_after_secs),
        Ok(GateOutcome::Forward {
            decision,
            cors_origin,
        }) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            response::apply_rate_limit_headers(headers, &decision);
            if let Some(origin) = cors_origin {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "gate failed to reach a decision");
            response::gate_unavailable()
        }
    }
}

/// Paths that get CORS treatment. Bare `/api` is gated but not one of them.
fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

fn is_gated(path: &str) -> bool {
    path == "/api" || is_api_path(path) || path == "/print" || path.starts_with("/print/")
}

/// Canonical form of a request path, resolved the way URL parsers resolve it
/// before the request reaches the upstream: escaped unreserved characters
/// are decoded, `\` counts as a separator, empty and `.` segments are
/// dropped and `..` pops the previous segment.
pub fn normalize_path(path: &str) -> String {
    let decoded = decode_unreserved(path);

    let mut segments: Vec<&str> = Vec::new();
    let mut last = "";
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
        last = segment;
    }

    let mut normalized = String::with_capacity(decoded.len());
    for segment in &segments {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() || matches!(last, "" | "." | "..") {
        normalized.push('/');
    }
    normalized
}

/// Decode `%XX` escapes of unreserved characters (RFC 3986 section 2.3);
/// every other escape is left as is.
fn decode_unreserved(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(b) = hex.filter(|b| b.is_ascii_alphanumeric() || b"-._~".contains(b)) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| path.to_string())
}

fn with_path(uri: &Uri, path: &str) -> std::result::Result<Uri, axum::http::Error> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse()?);
    Ok(Uri::from_parts(parts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::rate_limit_config::RateLimitConfig;

    const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15";

    fn gate(config: RateLimitConfig) -> (Gate, MockClock) {
        let clock = MockClock::new(0);
        let limiter = RateLimiter::with_clock(config, Arc::new(clock.clone()));
        (Gate::new(limiter, BotFilter::default()), clock)
    }

    fn headers(ip: &str, ua: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
        headers.insert(USER_AGENT, HeaderValue::from_str(ua).unwrap());
        headers
    }

    #[test]
    fn test_ungated_paths_bypass() {
        let (gate, _) = gate(RateLimitConfig::default());
        let outcome = gate.evaluate(&Method::GET, "/rules/G5pe4", &HeaderMap::new()).unwrap();
        assert_eq!(outcome, GateOutcome::Bypass);
        assert_eq!(gate.limiter().tracked_windows().unwrap(), 0);
    }

    #[test]
    fn test_bot_rejected_regardless_of_quota() {
        let (gate, _) = gate(RateLimitConfig::default());
        let outcome = gate
            .evaluate(&Method::GET, "/api/pinrules/search", &headers("1.2.3.4", "curl/8.4.0"))
            .unwrap();
        assert_eq!(outcome, GateOutcome::Forbidden);

        let outcome = gate
            .evaluate(&Method::GET, "/print/abc", &HeaderMap::new())
            .unwrap();
        assert_eq!(outcome, GateOutcome::Forbidden);
        assert_eq!(gate.limiter().tracked_windows().unwrap(), 0);
    }

    #[test]
    fn test_preflight_not_counted() {
        let (gate, _) = gate(RateLimitConfig::uniform(1));
        let mut h = headers("1.2.3.4", BROWSER);
        h.insert(ORIGIN, HeaderValue::from_static("https://example.org"));

        for _ in 0..5 {
            let outcome = gate.evaluate(&Method::OPTIONS, "/api/pinrules/search", &h).unwrap();
            assert_eq!(
                outcome,
                GateOutcome::Preflight {
                    origin: Some(HeaderValue::from_static("https://example.org"))
                }
            );
        }
        assert_eq!(gate.limiter().tracked_windows().unwrap(), 0);
    }

    #[test]
    fn test_search_scenario() {
        let (gate, clock) = gate(RateLimitConfig::default());
        let h = headers("1.2.3.4", BROWSER);

        for _ in 0..20 {
            let outcome = gate.evaluate(&Method::GET, "/api/pinrules/search", &h).unwrap();
            assert!(matches!(outcome, GateOutcome::Forward { .. }));
        }

        clock.advance_secs(5);
        match gate.evaluate(&Method::GET, "/api/pinrules/search", &h).unwrap() {
            GateOutcome::Limited {
                decision,
                retry_after_secs,
            } => {
                assert_eq!(retry_after_secs, 55);
                assert_eq!(decision.limit, 20);
                assert_eq!(decision.reset_at_ms, 60_000);
            }
            other => panic!("expected Limited, got {:?}", other),
        }

        clock.advance_secs(56);
        match gate.evaluate(&Method::GET, "/api/pinrules/search", &h).unwrap() {
            GateOutcome::Forward { decision, .. } => {
                assert_eq!(decision.remaining, 19);
                assert_eq!(decision.reset_at_ms, 121_000);
            }
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn test_cors_origin_only_echoed_on_api() {
        let (gate, _) = gate(RateLimitConfig::default());
        let mut h = headers("1.2.3.4", BROWSER);
        h.insert(ORIGIN, HeaderValue::from_static("https://example.org"));

        match gate.evaluate(&Method::GET, "/api/pinrules/abc", &h).unwrap() {
            GateOutcome::Forward { cors_origin, .. } => {
                assert_eq!(cors_origin, Some(HeaderValue::from_static("https://example.org")));
            }
            other => panic!("expected Forward, got {:?}", other),
        }

        match gate.evaluate(&Method::GET, "/print/abc", &h).unwrap() {
            GateOutcome::Forward { cors_origin, .. } => assert_eq!(cors_origin, None),
            other => panic!("expected Forward, got {:?}", other),
        }
    }

    #[test]
    fn test_options_on_print_is_rate_limited() {
        let (gate, _) = gate(RateLimitConfig::default());
        let outcome = gate
            .evaluate(&Method::OPTIONS, "/print/abc", &headers("1.2.3.4", BROWSER))
            .unwrap();
        assert!(matches!(outcome, GateOutcome::Forward { .. }));
        assert_eq!(gate.limiter().tracked_windows().unwrap(), 1);
    }

    #[test]
    fn test_unknown_identity_shares_a_bucket() {
        let (gate, _) = gate(RateLimitConfig::uniform(1));
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_static(BROWSER));

        assert!(matches!(
            gate.evaluate(&Method::GET, "/api/x", &h).unwrap(),
            GateOutcome::Forward { .. }
        ));
        assert!(matches!(
            gate.evaluate(&Method::GET, "/api/y", &h).unwrap(),
            GateOutcome::Limited { .. }
        ));
        assert!(gate
            .limiter()
            .window("unknown", RateLimitCategory::Default)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_gated_prefixes() {
        assert!(is_gated("/api"));
        assert!(is_gated("/api/pinrules/search"));
        assert!(is_gated("/print/abc"));
        assert!(!is_gated("/apix"));
        assert!(!is_gated("/printer"));
        assert!(!is_gated("/"));

        assert!(!is_api_path("/api"));
        assert!(is_api_path("/api/pinrules"));
    }

    #[test]
    fn test_options_on_bare_api_is_rate_limited() {
        let (gate, _) = gate(RateLimitConfig::uniform(1));
        let mut h = headers("1.2.3.4", BROWSER);
        h.insert(ORIGIN, HeaderValue::from_static("https://example.org"));

        match gate.evaluate(&Method::OPTIONS, "/api", &h).unwrap() {
            GateOutcome::Forward { cors_origin, .. } => assert_eq!(cors_origin, None),
            other => panic!("expected Forward, got {:?}", other),
        }
        assert!(matches!(
            gate.evaluate(&Method::OPTIONS, "/api", &h).unwrap(),
            GateOutcome::Limited { .. }
        ));
    }

    #[test]
    fn test_non_ascii_user_agent_is_not_missing() {
        let (gate, _) = gate(RateLimitConfig::default());
        let mut h = HeaderMap::new();
        h.insert(
            USER_AGENT,
            HeaderValue::from_bytes(
                b"Mozilla/5.0 (Linux; Android 13; Gal\xe1xy S23) AppleWebKit/537.36 Chrome/129.0 Mobile Safari/537.36",
            )
            .unwrap(),
        );

        let outcome = gate.evaluate(&Method::GET, "/api/pinrules/search", &h).unwrap();
        assert!(matches!(outcome, GateOutcome::Forward { .. }));
    }

    #[test]
    fn test_non_ascii_user_agent_still_matches_signatures() {
        let (gate, _) = gate(RateLimitConfig::default());
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, HeaderValue::from_bytes(b"python-requests/2.31 \xff").unwrap());

        let outcome = gate.evaluate(&Method::GET, "/print/abc", &h).unwrap();
        assert_eq!(outcome, GateOutcome::Forbidden);
    }

    #[test]
    fn test_dot_segments_cannot_escape_the_gate() {
        let (gate, _) = gate(RateLimitConfig::default());
        let bot = headers("1.2.3.4", "curl/8.4.0");

        for path in [
            "/x/../api/pinrules/search",
            "/./print/abc",
            "/x/%2e%2e/api/pinrules/search",
            "/x/%2E%2e/print/abc",
            "/static\\..\\api/pinrules",
            "//api/pinrules",
        ] {
            assert_eq!(
                gate.evaluate(&Method::GET, path, &bot).unwrap(),
                GateOutcome::Forbidden,
                "{} was not gated",
                path
            );
        }
    }

    #[test]
    fn test_dot_segments_cannot_change_category() {
        let (gate, _) = gate(RateLimitConfig::default());
        let h = headers("1.2.3.4", BROWSER);

        match gate
            .evaluate(&Method::GET, "/api/pinrules/x/../opendbids", &h)
            .unwrap()
        {
            GateOutcome::Forward { decision, .. } => assert_eq!(decision.limit, 10),
            other => panic!("expected Forward, got {:?}", other),
        }
        assert!(gate
            .limiter()
            .window("1.2.3.4", RateLimitCategory::Listing)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/api/pinrules/search"), "/api/pinrules/search");
        assert_eq!(normalize_path("/print/"), "/print/");
        assert_eq!(normalize_path("/x/../api/pinrules"), "/api/pinrules");
        assert_eq!(normalize_path("/../../api"), "/api");
        assert_eq!(normalize_path("/api/x/.."), "/api/");
        assert_eq!(normalize_path("/api/./x/."), "/api/x/");
        assert_eq!(normalize_path("/x/%2e%2E/%61pi"), "/api");
        assert_eq!(normalize_path("/a%2Fb/%20c"), "/a%2Fb/%20c");
        assert_eq!(normalize_path("/a%2"), "/a%2");
        assert_eq!(normalize_path("/a\\..\\print"), "/print");
    }

    #[test]
    fn test_with_path_keeps_query() {
        let uri: Uri = "/x/../api/pinrules/search?query=addams".parse().unwrap();
        let rewritten = with_path(&uri, &normalize_path(uri.path())).unwrap();
        assert_eq!(rewritten, "/api/pinrules/search?query=addams");
    }
}
