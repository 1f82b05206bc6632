//! Gemini Backend
//!
//! Binds an API key to the `generateContent` endpoint.

use crate::api::{GenerateRequest, GenerateResponse, GenerationConfig};
use crate::client::backend::{CredentialBinder, ModelBackend};
use crate::client::http::HttpClient;
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tracing::{debug, trace};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// A Gemini client bound to one API key
pub struct GeminiBackend {
    http: HttpClient,
    url: String,
    model: String,
    headers: HeaderMap,
    generation: GenerationConfig,
}

impl GeminiBackend {
    /// Bind `api_key`; fails when the key cannot be sent as a header
    pub fn bind(
        http: HttpClient,
        base_url: &str,
        model: &str,
        api_key: &Secret<String>,
        generation: GenerationConfig,
    ) -> Result<Self> {
        let key = api_key.expose_secret().trim();
        if key.is_empty() {
            return Err(RelayError::Config("API key is empty".to_string()));
        }

        let mut value = HeaderValue::from_str(key)
            .map_err(|e| RelayError::Config(format!("Invalid API key format: {}", e)))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(API_KEY_HEADER), value);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model
        );

        Ok(Self {
            http,
            url,
            model: model.to_string(),
            headers,
            generation,
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn describe(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest::from_prompt(prompt).with_generation_config(self.generation);

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "gemini request");

        let response: GenerateResponse = self
            .http
            .post_json(&self.url, &request, &self.headers)
            .await?;

        trace!(candidates = response.candidates.len(), "gemini response");

        if let Some(reason) = response.block_reason() {
            return Err(RelayError::Response(format!("prompt blocked: {}", reason)));
        }

        response.text().ok_or(RelayError::EmptyAnswer)
    }
}

/// Binds every configured secret to a [`GeminiBackend`] sharing one HTTP client
#[derive(Debug, Clone)]
pub struct GeminiBinder {
    http: HttpClient,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiBinder {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        model: impl Into<String>,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
            generation,
        }
    }
}

impl CredentialBinder for GeminiBinder {
    fn bind(&self, name: &str, secret: Secret<String>) -> Result<Arc<dyn ModelBackend>> {
        let backend = GeminiBackend::bind(
            self.http.clone(),
            &self.base_url,
            &self.model,
            &secret,
            self.generation,
        )
        .map_err(|e| RelayError::Binding {
            credential: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const PATH: &str = "/v1beta/models/gemini-test:generateContent";

    fn backend(base_url: &str, key: &str) -> GeminiBackend {
        backend_with(base_url, key, GenerationConfig::default())
    }

    fn backend_with(base_url: &str, key: &str, generation: GenerationConfig) -> GeminiBackend {
        GeminiBackend::bind(
            HttpClient::with_default_timeouts().unwrap(),
            base_url,
            "gemini-test",
            &Secret::new(key.to_string()),
            generation,
        )
        .unwrap()
    }

    #[test]
    fn test_binding_rejects_bad_keys() {
        let binder = GeminiBinder::new(
            HttpClient::with_default_timeouts().unwrap(),
            "http://localhost",
            "gemini-test",
            GenerationConfig::default(),
        );

        let err = binder.bind("Primary", Secret::new("   ".to_string())).err().unwrap();
        assert!(matches!(err, RelayError::Binding { ref credential, .. } if credential == "Primary"));

        let err = binder
            .bind("Secondary", Secret::new("bad\nkey".to_string()))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Binding { .. }));

        assert!(binder.bind("Tertiary", Secret::new("good-key".to_string())).is_ok());
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header(API_KEY_HEADER, "key-1")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "User question/request: hi"}]}]
            })))
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": " Hello! "}]}}]}"#)
            .create_async()
            .await;

        let answer = backend(&server.url(), "key-1")
            .generate("User question/request: hi")
            .await
            .unwrap();
        assert_eq!(answer, " Hello! ");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generation_config_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 64, "temperature": 0.25}
            })))
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}"#)
            .create_async()
            .await;

        let generation = GenerationConfig {
            max_output_tokens: Some(64),
            temperature: Some(0.25),
        };
        let answer = backend_with(&server.url(), "key-1", generation)
            .generate("q")
            .await
            .unwrap();
        assert_eq!(answer, "ok");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quota_error_is_api_class() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#)
            .create_async()
            .await;

        let err = backend(&server.url(), "key-1").generate("q").await.unwrap_err();
        assert!(matches!(err, RelayError::RateLimited(_)));
        assert_eq!(err.kind(), ErrorKind::ApiError);
    }

    #[tokio::test]
    async fn test_missing_candidates_is_unexpected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"{"candidates": []}"#)
            .create_async()
            .await;

        let err = backend(&server.url(), "key-1").generate("q").await.unwrap_err();
        assert!(matches!(err, RelayError::EmptyAnswer));
        assert_eq!(err.kind(), ErrorKind::UnexpectedError);
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_unexpected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .create_async()
            .await;

        let err = backend(&server.url(), "key-1").generate("q").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedError);
        assert!(err.to_string().contains("SAFETY"));
    }
}
