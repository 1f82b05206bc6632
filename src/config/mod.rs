//! Configuration Module
//!
//! Handles agent configuration loading and validation.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{AgentConfig, CredentialConfig, RoleGrantConfig, PROMPT_PLACEHOLDER};
