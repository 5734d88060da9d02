//! Configuration for labeler sessions.
//!
//! This module provides:
//! - Client configuration (`ClientConfig`) with environment defaults
//! - TOML file loading (`~/.labeler/config.toml` by default)
//! - Transport constants shared by the service and the pipelines

use crate::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::routes::DEFAULT_HOST;

/// Default request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timeout for the construction-time `?url_check=1` probe.
pub const URL_CHECK_TIMEOUT_SECS: u64 = 5;

/// Concurrent in-flight requests for annotation submission.
pub const SUBMIT_CONCURRENCY: usize = 5;

/// UUIDs per reconciliation request; keeps GET URLs under ~2048 characters.
pub const RECONCILIATION_BATCH_SIZE: usize = 45;

/// Default page size for searches.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Default batch size for metadata updates.
pub const METADATA_BATCH_SIZE: usize = 500;

pub const ENV_HOST: &str = "LABELER_HOST";
pub const ENV_PROJECT: &str = "LABELER_PROJECT";
pub const ENV_ACCESS_TOKEN: &str = "LABELER_ACCESS_TOKEN";

/// Default config directory name
pub const CONFIG_DIR: &str = ".labeler";

/// Default config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub project: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub url_check_timeout_secs: u64,
    pub submit_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: env_var(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            project: env_var(ENV_PROJECT).unwrap_or_default(),
            access_token: env_var(ENV_ACCESS_TOKEN),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            url_check_timeout_secs: URL_CHECK_TIMEOUT_SECS,
            submit_concurrency: SUBMIT_CONCURRENCY,
        }
    }
}

impl ClientConfig {
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Check the invariants a session needs before connecting.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.project.trim().is_empty() {
            return Err(CoreError::config("project cannot be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(CoreError::config("host cannot be empty"));
        }
        if self.submit_concurrency == 0 {
            return Err(CoreError::config("submit_concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// On-disk form; every key is optional and falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    host: Option<String>,
    project: Option<String>,
    access_token: Option<String>,
    request_timeout_secs: Option<u64>,
    url_check_timeout_secs: Option<u64>,
    submit_concurrency: Option<usize>,
}

/// Get the default config file path (~/.labeler/config.toml).
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Load a TOML config file.
///
/// # Arguments
///
/// * `path` - Path to the TOML file (defaults to ~/.labeler/config.toml)
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, CoreError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = fs::read_to_string(&path)
        .map_err(|e| CoreError::config(format!("failed to read config: {}", e)))?;
    parse_config(&content)
}

/// Parse a TOML config string over the defaults.
pub fn parse_config(content: &str) -> Result<ClientConfig, CoreError> {
    let file: ConfigFile = toml::from_str(content)
        .map_err(|e| CoreError::config(format!("failed to parse TOML: {}", e)))?;

    let mut config = ClientConfig::default();
    if let Some(host) = file.host {
        config.host = host;
    }
    if let Some(project) = file.project {
        config.project = project;
    }
    if file.access_token.is_some() {
        config.access_token = file.access_token;
    }
    if let Some(secs) = file.request_timeout_secs {
        config.request_timeout_secs = secs;
    }
    if let Some(secs) = file.url_check_timeout_secs {
        config.url_check_timeout_secs = secs;
    }
    if let Some(n) = file.submit_concurrency {
        config.submit_concurrency = n;
    }
    Ok(config)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
