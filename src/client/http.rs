//! HTTP Client
//!
//! Async HTTP client shared by every bound credential and the webhook sink.
//! Each call is a single request: fallback across credentials happens in the
//! dispatcher, so nothing here retries.

use crate::api::ApiErrorBody;
use crate::error::{RelayError, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client with upstream status classification
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// Inner reqwest client
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a client with the stock timeouts (120s request, 10s connect)
    pub fn with_default_timeouts() -> Result<Self> {
        Self::new(Duration::from_secs(120), Duration::from_secs(10))
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json<T, R>(&self, url: &str, body: &T, extra_headers: &HeaderMap) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let body = self.post(url, body, extra_headers).await?;
        serde_json::from_str(&body).map_err(|e| {
            RelayError::Response(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                body.chars().take(500).collect::<String>()
            ))
        })
    }

    /// POST a JSON body and return the raw response text on success
    pub async fn post<T>(&self, url: &str, body: &T, extra_headers: &HeaderMap) -> Result<String>
    where
        T: Serialize,
    {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in extra_headers {
            headers.insert(key.clone(), value.clone());
        }

        let body_json = serde_json::to_string(body)?;

        let resp = self
            .client
            .post(url)
            .headers(headers)
            .body(body_json)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.text().await?);
        }

        Err(status_error(status, resp.text().await))
    }
}

/// Error for a non-success response; an unreadable body still classifies by status
fn status_error<E: std::fmt::Display>(
    status: StatusCode,
    body: std::result::Result<String, E>,
) -> RelayError {
    let body = body.unwrap_or_else(|e| {
        debug!(status = %status, error = %e, "failed to read error body");
        String::new()
    });
    classify_status(status, &body)
}

/// Map a non-success status to the upstream error taxonomy
pub fn classify_status(status: StatusCode, body: &str) -> RelayError {
    let message = ApiErrorBody::describe(body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return RelayError::RateLimited(message);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return RelayError::Auth(message);
    }

    RelayError::Api {
        status: status.as_u16(),
        message,
    }
}
