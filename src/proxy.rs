//! Forwards requests that pass the gate to the upstream web application.

use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderName};
use axum::http::HeaderMap;
use axum::response::Response;
use http_body_util::LengthLimitError;
use reqwest::Client;

use crate::error::{GateError, Result};

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct Upstream {
    base_url: String,
    client: Client,
}

impl Upstream {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GateError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Relay one request and return the upstream response unchanged apart
    /// from hop-by-hop headers.
    pub async fn forward(&self, request: Request) -> Result<Response> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
            return Err(GateError::PayloadTooLarge(MAX_BODY_BYTES));
        }

        let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            if is_length_limit(&e) {
                GateError::PayloadTooLarge(MAX_BODY_BYTES)
            } else {
                GateError::Validation(format!("Failed to read request body: {}", e))
            }
        })?;

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers());
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.headers_mut().remove(header::CONTENT_LENGTH);

        Ok(response)
    }

    /// Round-trip time to the upstream root, used by the health endpoint.
    pub async fn probe(&self) -> Result<Duration> {
        let start = Instant::now();
        self.client.head(&self.base_url).send().await?;
        Ok(start.elapsed())
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers
}

/// Fallback handler relaying everything the router does not serve itself.
pub async fn proxy_handler(
    State(upstream): State<Upstream>,
    request: Request,
) -> Result<Response> {
    upstream.forward(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let upstream = Upstream::new("http://127.0.0.1:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(upstream.base_url(), "http://127.0.0.1:8080");
    }

    fn upstream() -> Upstream {
        // Nothing listens here; oversized bodies are refused before connecting.
        Upstream::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/pinrules/search")
            .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
            .unwrap();

        let err = upstream().forward(request).await.unwrap_err();
        assert!(matches!(err, GateError::PayloadTooLarge(MAX_BODY_BYTES)));
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_payload_too_large() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/pinrules/search")
            .header(header::CONTENT_LENGTH, (MAX_BODY_BYTES + 1).to_string())
            .body(Body::empty())
            .unwrap();

        let err = upstream().forward(request).await.unwrap_err();
        assert!(matches!(err, GateError::PayloadTooLarge(_)));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let stripped = strip_hop_by_hop(&headers);
        assert!(stripped.get(header::CONNECTION).is_none());
        assert!(stripped.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(stripped[header::CONTENT_TYPE], "application/json");
    }
}
