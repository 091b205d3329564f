//! Single-attempt forwarding to one upstream endpoint.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use hyper::body::Bytes;
use relay_common::error::{RelayError, Result};

/// Request headers that describe the inbound connection rather than the
/// request, and are therefore left for the outbound client to set.
const CONNECTION_HEADERS: [HeaderName; 7] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Response headers relayed back to the caller along with status and body.
const RELAYED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::CONTENT_ENCODING];

/// The inbound request, read once.
///
/// The body is buffered so the same bytes can be sent to every candidate a
/// request is tried against.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    /// Path plus query string, always starting with `/`
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestSnapshot {
    pub fn new(method: Method, path_and_query: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers,
            body,
        }
    }
}

/// A response that will be relayed to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// `Content-Type` and `Content-Encoding`, when the upstream sent them
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Classified result of one forward attempt.
#[derive(Debug)]
pub enum Attempt {
    /// Any status other than 429, relayed unchanged
    Usable(UpstreamResponse),
    /// The endpoint answered 429 Too Many Requests
    RateLimited,
    /// The call could not complete
    TransportError(RelayError),
}

/// Outbound HTTP client making one attempt per call.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    /// Creates a forwarder whose attempts give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Joins an endpoint base address and the inbound path.
    pub fn target_url(endpoint: &str, path_and_query: &str) -> String {
        format!("{}{}", endpoint, path_and_query)
    }

    /// Sends `request` to `endpoint` and classifies the outcome.
    pub async fn forward(&self, endpoint: &str, request: &RequestSnapshot) -> Attempt {
        match self.send(endpoint, request).await {
            Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => Attempt::RateLimited,
            Ok(response) => Attempt::Usable(response),
            Err(e) => Attempt::TransportError(e),
        }
    }

    async fn send(&self, endpoint: &str, request: &RequestSnapshot) -> Result<UpstreamResponse> {
        let url = Self::target_url(endpoint, &request.path_and_query);

        let mut headers = request.headers.clone();
        for name in &CONNECTION_HEADERS {
            headers.remove(name);
        }

        let response = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let mut relayed = HeaderMap::new();
        for name in &RELAYED_HEADERS {
            if let Some(value) = response.headers().get(name) {
                relayed.insert(name.clone(), value.clone());
            }
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(UpstreamResponse {
            status,
            headers: relayed,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout(self.timeout.as_millis() as u64)
        } else {
            RelayError::Transport(format!("HTTP request failed: {}", err))
        }
    }
}
