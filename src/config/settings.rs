//! Agent Configuration
//!
//! Defines the configuration schema for the relay agent.

use crate::api::GenerationConfig;
use crate::error::{RelayError, Result};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Placeholder substituted with the user's prompt
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Upstream model identifier (e.g. "gemini-2.0-flash")
    pub model: String,

    /// Base URL for the API
    pub base_url: String,

    /// Optional environment variable overriding the base URL
    #[serde(default)]
    pub base_url_env: Option<String>,

    /// Credentials in fallback priority order
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    /// Per-message size limit of the host platform, in characters
    pub message_limit: usize,

    /// Minimum characters reserved for continuation markers when splitting
    pub continuation_margin: usize,

    /// Instruction template wrapping every prompt
    pub prompt_template: String,

    /// Generic notice shown when no credential could answer
    pub failure_notice: String,

    /// Placeholder posted while the answer is being generated
    pub working_notice: String,

    /// Maximum tokens the model may generate
    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature; the model default when absent
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Total request timeout per upstream call
    pub request_timeout_secs: u64,

    /// Connect timeout per upstream call
    pub connect_timeout_secs: u64,

    /// Bind address of the liveness endpoint
    pub health_bind: String,

    /// Environment variable holding the audit webhook URL
    #[serde(default)]
    pub audit_webhook_env: Option<String>,

    /// Reaction-driven role grant
    #[serde(default)]
    pub role_grant: Option<RoleGrantConfig>,
}

/// One configured credential
#[derive(Clone, Deserialize)]
pub struct CredentialConfig {
    /// Human-readable priority label; derived from position when absent
    #[serde(default)]
    pub name: Option<String>,

    /// Environment variable holding the secret
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Inline secret (alternative to api_key_env)
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("name", &self.name)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CredentialConfig {
    /// Resolve the secret: the environment variable wins over the inline key
    pub fn resolve(&self) -> Option<Secret<String>> {
        if let Some(env_var) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                if !key.trim().is_empty() {
                    return Some(Secret::new(key));
                }
            }
        }
        self.api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .cloned()
    }
}

/// Reaction-driven role grant configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoleGrantConfig {
    /// Reaction that triggers the grant
    pub marker: String,

    /// Role a reviewer must hold for the reaction to count
    pub authorizer_role: u64,

    /// Role granted to the message author
    pub grant_role: u64,
}

impl AgentConfig {
    /// Get the effective base URL (from env var if configured, otherwise default)
    pub fn effective_base_url(&self) -> String {
        if let Some(env_var) = &self.base_url_env {
            if let Ok(url) = std::env::var(env_var) {
                return url;
            }
        }
        self.base_url.clone()
    }

    /// Resolve every configured credential in priority order.
    ///
    /// Missing secrets stay in the list as `None` so positional names remain stable.
    pub fn credential_secrets(&self) -> Vec<(Option<String>, Option<Secret<String>>)> {
        self.credentials
            .iter()
            .map(|c| (c.name.clone(), c.resolve()))
            .collect()
    }

    /// Audit webhook URL, when configured and present in the environment
    pub fn audit_webhook_url(&self) -> Option<String> {
        self.audit_webhook_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|url| !url.trim().is_empty())
    }

    /// Generation parameters sent with every request
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check invariants the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        if self.message_limit == 0 {
            return Err(RelayError::Config(
                "message_limit must be at least 1".to_string(),
            ));
        }
        if self.continuation_margin >= self.message_limit {
            return Err(RelayError::Config(format!(
                "continuation_margin ({}) must be smaller than message_limit ({})",
                self.continuation_margin, self.message_limit
            )));
        }
        if !self.prompt_template.contains(PROMPT_PLACEHOLDER) {
            return Err(RelayError::Config(format!(
                "prompt_template must contain the {} placeholder",
                PROMPT_PLACEHOLDER
            )));
        }
        if self.model.trim().is_empty() {
            return Err(RelayError::Config("model must not be empty".to_string()));
        }
        Ok(())
    }
}
