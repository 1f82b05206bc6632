//! Configuration Loader
//!
//! Loads the agent configuration and layers overrides from multiple sources.

use crate::config::settings::AgentConfig;
use crate::error::{RelayError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    layered: Value,
}

impl ConfigLoader {
    /// Create a new config loader and load from default locations
    pub fn new() -> Result<Self> {
        let mut loader = Self::with_defaults()?;

        // Then load from file system (can override built-ins)
        loader.load_from_default_paths()?;

        Ok(loader)
    }

    /// Create a loader with a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut loader = Self::with_defaults()?;
        loader.load_from_file(path)?;
        Ok(loader)
    }

    fn with_defaults() -> Result<Self> {
        let mut loader = Self {
            layered: Value::Object(Default::default()),
        };
        loader.load_builtin_defaults()?;
        Ok(loader)
    }

    /// Load built-in defaults
    fn load_builtin_defaults(&mut self) -> Result<()> {
        let defaults = include_str!("../../defaults.json");
        let value: Value = serde_json::from_str(defaults).map_err(|e| {
            RelayError::Config(format!("Failed to parse built-in defaults.json: {}", e))
        })?;

        self.merge(value);
        Ok(())
    }

    /// Load configuration from default paths
    fn load_from_default_paths(&mut self) -> Result<()> {
        for path in Self::get_config_paths() {
            if path.exists() {
                self.load_from_file(&path)?;
            }
        }

        Ok(())
    }

    /// Get list of config paths to check, lowest precedence first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".relaybot").join("config.json"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("relaybot").join("config.json"));
        }

        paths.push(PathBuf::from("relaybot.json"));

        if let Ok(custom_path) = std::env::var("RELAYBOT_CONFIG") {
            paths.push(PathBuf::from(custom_path));
        }

        paths
    }

    /// Load configuration from a specific file
    fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            RelayError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), "loaded config layer");
        self.merge(value);
        Ok(())
    }

    /// Merge another layer into this one (later layers override earlier)
    fn merge(&mut self, other: Value) {
        merge_values(&mut self.layered, other);
    }

    /// Build the typed configuration from all loaded layers
    pub fn config(&self) -> Result<AgentConfig> {
        let config: AgentConfig = serde_json::from_value(self.layered.clone())
            .map_err(|e| RelayError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> Result<AgentConfig> {
        self.config()
    }
}

/// Objects merge key by key; every other value (including arrays) is replaced.
fn merge_values(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(base_map), Value::Object(other_map)) => {
            for (key, value) in other_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
