//! Configuration management
//!
//! Stores settings in ~/.config/change-audit/config.json. The backend
//! endpoint and model deployment can also come from the environment
//! (PROJECT_ENDPOINT / AGENT_MODEL_DEPLOYMENT_NAME), which takes precedence
//! over the file.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

fn default_batch_size() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_poll_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the reasoning backend's agents API.
    pub endpoint: Option<String>,
    /// Model deployment name used when creating runs.
    pub model: Option<String>,
    /// Optional bearer token for the backend.
    pub api_key: Option<String>,
    /// Records per analysis request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per batch before degrading to an empty result.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Interval between run-status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wall-clock cap on waiting for one run.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("change-audit"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk (or defaults), then apply env overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file().unwrap_or_default();
        if let Ok(endpoint) = std::env::var("PROJECT_ENDPOINT") {
            if !endpoint.is_empty() {
                config.endpoint = Some(endpoint);
            }
        }
        if let Ok(model) = std::env::var("AGENT_MODEL_DEPLOYMENT_NAME") {
            if !model.is_empty() {
                config.model = Some(model);
            }
        }
        config
    }

    fn load_file() -> Option<Self> {
        let path = Self::config_path()?;
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted, using defaults"
                );
                None
            }
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let Some(dir) = Self::config_dir() else {
            bail!("could not determine config directory");
        };
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(dir.join("config.json"), json)?;
        Ok(())
    }

    /// The backend connection settings, or a precondition error naming what
    /// is missing. Called once at startup, before any data is loaded.
    pub fn backend_settings(&self) -> Result<(&str, &str)> {
        match (self.endpoint.as_deref(), self.model.as_deref()) {
            (Some(endpoint), Some(model)) => Ok((endpoint, model)),
            (None, _) => bail!(
                "no backend endpoint configured (set PROJECT_ENDPOINT or the config file)"
            ),
            (_, None) => bail!(
                "no model deployment configured (set AGENT_MODEL_DEPLOYMENT_NAME or the config file)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_secs, 2);
        assert_eq!(config.poll_timeout_secs, 60);
    }

    #[test]
    fn missing_endpoint_is_a_precondition_error() {
        let config = Config {
            endpoint: None,
            model: Some("audit-4".to_string()),
            ..Config::default()
        };
        assert!(config.backend_settings().is_err());
    }

    #[test]
    fn partial_config_json_fills_in_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"endpoint":"https://api.example","model":"audit-4"}"#)
                .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.backend_settings().unwrap().1, "audit-4");
    }
}
