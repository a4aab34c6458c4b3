use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE, RETRY_AFTER,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::rate_limiter::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

const PREFLIGHT_METHODS: &str = "GET, POST, OPTIONS";
const PREFLIGHT_HEADERS: &str = "Content-Type";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Body for rate limit denials and gate failures.
#[derive(Debug, Serialize)]
pub struct GateErrorBody {
    pub error: String,
}

impl GateErrorBody {
    pub fn new(error: &str) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Bare 403 for rejected clients.
pub fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
        "Forbidden",
    )
        .into_response()
}

/// 204 answer to a CORS preflight, echoing the caller's origin when given.
pub fn preflight(origin: Option<&HeaderValue>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        origin.cloned().unwrap_or_else(|| HeaderValue::from_static("*")),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(PREFLIGHT_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(PREFLIGHT_HEADERS));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(PREFLIGHT_MAX_AGE));

    response
}

/// 429 with a retry hint and the exhausted quota.
pub fn too_many_requests(decision: &RateLimitDecision, retry_after_secs: u64) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(GateErrorBody::new(RATE_LIMITED_MESSAGE)),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    apply_rate_limit_headers(headers, decision);

    response
}

/// 400 for request targets that cannot be forwarded.
pub fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, Json(GateErrorBody::new("Bad request."))).into_response()
}

/// 503 used when the gate itself cannot reach a decision.
pub fn gate_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(GateErrorBody::new("Service temporarily unavailable.")),
    )
        .into_response()
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs()));
}
