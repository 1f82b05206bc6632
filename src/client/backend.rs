//! Model Backend Seam
//!
//! The handle a credential is bound to, and the binder that produces it.

use crate::error::Result;
use async_trait::async_trait;
use secrecy::Secret;
use std::sync::Arc;

/// A bound client able to answer one prompt against the upstream model
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short description for logs (model id, endpoint)
    fn describe(&self) -> &str;

    /// Send a fully templated prompt and return the raw answer text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Turns a credential secret into a bound backend
pub trait CredentialBinder {
    /// Bind `secret` for the credential labelled `name`
    fn bind(&self, name: &str, secret: Secret<String>) -> Result<Arc<dyn ModelBackend>>;
}

impl<F> CredentialBinder for F
where
    F: Fn(&str, Secret<String>) -> Result<Arc<dyn ModelBackend>>,
{
    fn bind(&self, name: &str, secret: Secret<String>) -> Result<Arc<dyn ModelBackend>> {
        self(name, secret)
    }
}
