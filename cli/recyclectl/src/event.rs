//! Invocation payload.
//!
//! The JSON event a scheduler or function host hands to the recycler:
//!
//! ```json
//! {"cluster_name": "prod", "service_name": "web", "maintain_service_state": true, "wait_time": "30"}
//! ```
//!
//! `wait_time` is accepted as a number or a numeric string.

use std::fs;
use std::path::Path;

use recycle_core::{RecycleConfig, DEFAULT_WAIT_TIME_SECS};
use recycle_id::{ClusterName, ServiceName};
use serde::Deserialize;

use crate::error::CliError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WaitTime {
    Secs(u64),
    Text(String),
}

impl WaitTime {
    fn seconds(&self) -> Result<u64, CliError> {
        match self {
            Self::Secs(secs) => Ok(*secs),
            Self::Text(text) => text.trim().parse().map_err(|_| {
                CliError::InvalidEvent(format!(
                    "wait_time must be a non-negative integer, got '{}'",
                    text
                ))
            }),
        }
    }
}

/// Raw event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RecycleEvent {
    cluster_name: String,
    service_name: String,
    #[serde(default)]
    maintain_service_state: Option<bool>,
    #[serde(default)]
    wait_time: Option<WaitTime>,
}

impl RecycleEvent {
    /// Parse an event from JSON text.
    pub fn parse(json: &str) -> Result<Self, CliError> {
        serde_json::from_str(json).map_err(|e| CliError::InvalidEvent(e.to_string()))
    }

    /// Read and parse an event file.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::InvalidEvent(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    /// Validate the payload into a run configuration with default settings.
    pub fn into_config(self) -> Result<RecycleConfig, CliError> {
        let cluster = ClusterName::parse(&self.cluster_name)
            .map_err(|e| CliError::InvalidEvent(e.to_string()))?;
        let service = ServiceName::parse(&self.service_name)
            .map_err(|e| CliError::InvalidEvent(e.to_string()))?;
        let wait_time_secs = match &self.wait_time {
            Some(wait) => wait.seconds()?,
            None => DEFAULT_WAIT_TIME_SECS,
        };

        Ok(RecycleConfig::new(cluster, service)
            .with_maintain_service_state(self.maintain_service_state.unwrap_or(true))
            .with_wait_time_secs(wait_time_secs))
    }
}
