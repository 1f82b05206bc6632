//! Client Module
//!
//! HTTP client, the model backend seam and the Gemini binding.

pub mod backend;
pub mod gemini;
pub mod http;

pub use backend::{CredentialBinder, ModelBackend};
pub use gemini::{GeminiBackend, GeminiBinder};
pub use http::HttpClient;
