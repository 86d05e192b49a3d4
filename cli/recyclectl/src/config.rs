//! Configuration.
//!
//! Resolution order, later wins:
//! - built-in defaults
//! - `config.json` in the platform config directory
//! - `RECYCLE_*` environment variables
//! - command-line flags (applied by the commands)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use recycle_core::{
    StabilityPolicy, DEFAULT_EXECUTION_CEILING, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_SECS,
};
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("dev", "task-recycle", "recyclectl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Control-plane gateway URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Where to POST the final report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub stability_max_attempts: u32,

    #[serde(default = "default_poll_interval_secs")]
    pub stability_poll_interval_secs: u64,

    /// Host wall-clock ceiling; `null` disables the budget warning.
    #[serde(default = "default_execution_ceiling_secs")]
    pub execution_ceiling_secs: Option<u64>,

    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_execution_ceiling_secs() -> Option<u64> {
    Some(DEFAULT_EXECUTION_CEILING.as_secs())
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_token: None,
            webhook_url: None,
            stability_max_attempts: default_max_attempts(),
            stability_poll_interval_secs: default_poll_interval_secs(),
            execution_ceiling_secs: default_execution_ceiling_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Path of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(config_dir()?.join(CONFIG_FILE))
    }

    /// Load config from disk and the environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load config from a file, or return defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Overlay `RECYCLE_*` variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RECYCLE_API_URL") {
            self.api_url = url;
        }
        if let Some(token) = lookup("RECYCLE_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(url) = lookup("RECYCLE_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }
        if let Some(value) = lookup("RECYCLE_MAX_ATTEMPTS") {
            self.stability_max_attempts = parse_env("RECYCLE_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("RECYCLE_POLL_INTERVAL_SECS") {
            self.stability_poll_interval_secs = parse_env("RECYCLE_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("RECYCLE_EXECUTION_CEILING_SECS") {
            self.execution_ceiling_secs = match value.as_str() {
                "" | "none" | "off" => None,
                v => Some(parse_env("RECYCLE_EXECUTION_CEILING_SECS", v)?),
            };
        }
        if let Some(level) = lookup("RECYCLE_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Polling budget from the config.
    pub fn stability(&self) -> StabilityPolicy {
        StabilityPolicy {
            max_attempts: self.stability_max_attempts,
            poll_interval_secs: self.stability_poll_interval_secs,
        }
    }

    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        Self {
            api_token: self.api_token.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, value))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.api_url.is_empty());
        assert_eq!(config.stability(), StabilityPolicy::default());
        assert_eq!(config.execution_ceiling_secs, Some(900));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{"api_url": "https://gateway.internal", "stability_poll_interval_secs": 5, "execution_ceiling_secs": null}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url, "https://gateway.internal");
        assert_eq!(config.stability_poll_interval_secs, 5);
        assert_eq!(config.stability_max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.execution_ceiling_secs, None);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("RECYCLE_API_URL", "http://127.0.0.1:9000"),
                ("RECYCLE_API_TOKEN", "secret"),
                ("RECYCLE_MAX_ATTEMPTS", "10"),
                ("RECYCLE_EXECUTION_CEILING_SECS", "off"),
            ]))
            .unwrap();

        assert_eq!(config.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.stability_max_attempts, 10);
        assert_eq!(config.execution_ceiling_secs, None);
    }

    #[test]
    fn test_env_rejects_non_numeric() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("RECYCLE_POLL_INTERVAL_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("RECYCLE_POLL_INTERVAL_SECS"));
    }

    #[test]
    fn test_redacted_masks_token() {
        let config = Config {
            api_token: Some("secret".to_string()),
            ..Config::default()
        };
        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("secret"));
    }
}
