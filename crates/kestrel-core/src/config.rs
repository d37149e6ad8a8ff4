//! Configuration management for Kestrel.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KestrelError, Result};
use crate::session::{default_enabled_models, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

/// Persistent settings, stored as TOML under the user config dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KestrelConfig {
    /// OpenRouter API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model id.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature, 0.0–1.0.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Model ids surfaced by the model picker.
    #[serde(default = "default_enabled_models")]
    pub enabled_models: Vec<String>,

    /// API base URL override (proxies, self-hosted gateways).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// HTTP-Referer value sent with completion requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            enabled_models: default_enabled_models(),
            api_base: None,
            referer: None,
        }
    }
}

impl KestrelConfig {
    /// Load config from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| KestrelError::Configuration(format!("Failed to read config: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| KestrelError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Save config to a TOML file, creating parent dirs as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KestrelError::Configuration(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kestrel")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KestrelConfig::load(&dir.path().join("nope.toml")).unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.enabled_models.len(), 4);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let config = KestrelConfig {
            api_key: Some("sk-or-abc123".to_string()),
            model: "openai/gpt-4-turbo".to_string(),
            temperature: 0.4,
            api_base: Some("http://localhost:8080/v1".to_string()),
            ..KestrelConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = KestrelConfig::load(&path).unwrap();
        assert_eq!(loaded.api_key.as_deref(), Some("sk-or-abc123"));
        assert_eq!(loaded.model, "openai/gpt-4-turbo");
        assert_eq!(loaded.temperature, 0.4);
        assert_eq!(loaded.api_base.as_deref(), Some("http://localhost:8080/v1"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = \"openai/gpt-3.5-turbo\"\n").unwrap();

        let config = KestrelConfig::load(&path).unwrap();
        assert_eq!(config.model, "openai/gpt-3.5-turbo");
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert!(config.api_key.is_none());
    }
}
