//! Relaybot Error Types
//!
//! Error handling for credential binding, upstream calls and the ambient stack.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for relaybot operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration errors (invalid JSON, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A credential secret could not be bound to a client
    #[error("Credential '{credential}' could not be bound: {reason}")]
    Binding { credential: String, reason: String },

    /// Upstream rejected the call with an error status
    #[error("Upstream API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Upstream reported a rate limit or exhausted quota
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// Upstream rejected the credential
    #[error("Authentication failed: {0}. Check the API key.")]
    Auth(String),

    /// HTTP request failed before a response arrived
    #[error("Request failed: {0}")]
    Request(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Response could not be parsed
    #[error("Response error: {0}")]
    Response(String),

    /// Upstream answered with no usable text
    #[error("Upstream returned an empty answer")]
    EmptyAnswer,

    /// An audit or messaging sink failed
    #[error("Sink error: {0}")]
    Sink(String),

    /// Chat platform refused an operation
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a failed attempt is reported in the audit trail.
///
/// Both kinds are recoverable: the dispatcher falls back to the next credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream recognized and rejected the call (status, quota, auth)
    ApiError,

    /// Transport, parse or empty-answer failure
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ApiError => "api_error",
            ErrorKind::UnexpectedError => "unexpected_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RelayError {
    /// Classify this error for the audit trail
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Api { .. } | RelayError::RateLimited(_) | RelayError::Auth(_) => {
                ErrorKind::ApiError
            }
            _ => ErrorKind::UnexpectedError,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout(err.to_string())
        } else if err.is_connect() {
            RelayError::Request(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            RelayError::Response(format!("Failed to decode response: {}", err))
        } else {
            RelayError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Response(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Config(format!("IO error: {}", err))
    }
}

/// Result type alias for relaybot operations
pub type Result<T> = std::result::Result<T, RelayError>;
