//! Credential Pool
//!
//! Ordered, read-only set of bound credentials. Registration order is the
//! fallback priority.

use crate::client::{CredentialBinder, ModelBackend};
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Priority labels for the first few positions
const PRIORITY_LABELS: &[&str] = &["Primary", "Secondary", "Tertiary"];

/// Label for the credential at `position` (zero-based)
pub fn priority_label(position: usize) -> String {
    PRIORITY_LABELS
        .get(position)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Backup {}", position + 1 - PRIORITY_LABELS.len()))
}

/// A named credential bound to an upstream client
#[derive(Clone)]
pub struct Credential {
    name: String,
    handle: Arc<dyn ModelBackend>,
}

impl Credential {
    pub fn new(name: impl Into<String>, handle: Arc<dyn ModelBackend>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    /// Priority label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound client
    pub fn handle(&self) -> &Arc<dyn ModelBackend> {
        &self.handle
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("backend", &self.handle.describe())
            .finish()
    }
}

/// Pool of bound credentials in fallback order
#[derive(Debug, Default, Clone)]
pub struct CredentialPool {
    entries: Vec<Credential>,
}

impl CredentialPool {
    /// Bind each non-empty secret in order, naming them by position.
    ///
    /// Binding failures are logged and the credential is left out.
    pub fn initialize<B>(secrets: Vec<Option<Secret<String>>>, binder: &B) -> Self
    where
        B: CredentialBinder + ?Sized,
    {
        let named = secrets
            .into_iter()
            .enumerate()
            .map(|(i, secret)| (priority_label(i), secret))
            .collect();
        Self::from_named(named, binder)
    }

    /// Like [`CredentialPool::initialize`] with explicit names
    pub fn from_named<B>(secrets: Vec<(String, Option<Secret<String>>)>, binder: &B) -> Self
    where
        B: CredentialBinder + ?Sized,
    {
        let mut entries = Vec::with_capacity(secrets.len());

        for (name, secret) in secrets {
            let Some(secret) = secret.filter(|s| !s.expose_secret().trim().is_empty()) else {
                continue;
            };

            match binder.bind(&name, secret) {
                Ok(handle) => entries.push(Credential::new(name, handle)),
                Err(e) => {
                    warn!(credential = %name, error = %e, "credential binding failed, skipping");
                }
            }
        }

        info!(usable = entries.len(), "credential pool initialized");
        Self { entries }
    }

    /// Build a pool from already bound credentials
    pub fn from_credentials(entries: Vec<Credential>) -> Self {
        Self { entries }
    }

    /// Number of usable credentials
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Credentials in fallback order
    pub fn entries(&self) -> &[Credential] {
        &self.entries
    }

    /// Names in fallback order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Credential::name).collect()
    }
}
