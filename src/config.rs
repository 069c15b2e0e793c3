//! Configuration management for the Athena datasource.
//!
//! Handles loading configuration from TOML files and environment variables:
//! the `[datasource]` section supplies connection settings, the `[engine]`
//! section tunes polling and caching.

use crate::error::{DatasourceError, Result};
use crate::query::PollPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::datasource::SECRET_ACCESS_KEY;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub datasource: DatasourceConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Connection settings of the datasource.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DatasourceConfig {
    pub region: Option<String>,

    /// Default work group for queries that do not name one.
    pub work_group: Option<String>,

    /// "Static", "RoleArn" or "Default".
    pub auth_type: Option<String>,

    pub access_key: Option<String>,

    /// Secret access key (not recommended to store in config).
    pub secret_key: Option<String>,

    pub role_arn: Option<String>,

    /// Overrides the regional Athena endpoint.
    pub endpoint: Option<String>,

    /// Overrides the regional STS endpoint used for role assumption.
    pub sts_endpoint: Option<String>,
}

impl std::fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("region", &self.region)
            .field("work_group", &self.work_group)
            .field("auth_type", &self.auth_type)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("role_arn", &self.role_arn)
            .field("endpoint", &self.endpoint)
            .field("sts_endpoint", &self.sts_endpoint)
            .finish()
    }
}

impl DatasourceConfig {
    /// Merges another config into this one, with the other taking precedence.
    pub fn merge(&mut self, other: &DatasourceConfig) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        take(&mut self.region, &other.region);
        take(&mut self.work_group, &other.work_group);
        take(&mut self.auth_type, &other.auth_type);
        take(&mut self.access_key, &other.access_key);
        take(&mut self.secret_key, &other.secret_key);
        take(&mut self.role_arn, &other.role_arn);
        take(&mut self.endpoint, &other.endpoint);
        take(&mut self.sts_endpoint, &other.sts_endpoint);
    }

    /// Applies AWS environment variables as defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.region.is_none() {
            self.region = std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .ok();
        }
        if self.work_group.is_none() {
            self.work_group = std::env::var("ATHENA_WORK_GROUP").ok();
        }
        if self.access_key.is_none() {
            self.access_key = std::env::var("AWS_ACCESS_KEY_ID").ok();
        }
        if self.secret_key.is_none() {
            self.secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
        }
    }

    /// Checks that the endpoint overrides, if any, are http(s) URLs.
    pub fn validate(&self) -> Result<()> {
        for endpoint in [&self.endpoint, &self.sts_endpoint].into_iter().flatten() {
            let url = Url::parse(endpoint)
                .map_err(|e| DatasourceError::config(format!("Invalid endpoint: {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(DatasourceError::config(format!(
                    "Invalid endpoint scheme '{}'. Expected 'http' or 'https'",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Renders the settings as the datasource JSON object a host would send.
    pub fn to_settings_json(&self) -> String {
        let mut settings = Map::new();
        let fields = [
            ("region", &self.region),
            ("workGroup", &self.work_group),
            ("authType", &self.auth_type),
            ("accessKey", &self.access_key),
            ("roleArn", &self.role_arn),
            ("endpoint", &self.endpoint),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                settings.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        Value::Object(settings).to_string()
    }

    /// Returns the secure settings, i.e. the secret key when present.
    pub fn secure_json(&self) -> HashMap<String, String> {
        self.secret_key
            .iter()
            .map(|secret| (SECRET_ACCESS_KEY.to_string(), secret.clone()))
            .collect()
    }

    /// Returns a display-safe string (no secrets).
    pub fn display_string(&self) -> String {
        let work_group = self.work_group.as_deref().unwrap_or("primary");
        let region = self.region.as_deref().unwrap_or("unknown");
        format!("{work_group} @ {region}")
    }
}

/// Polling and caching parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_poll_timeout_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> u64 {
    12 * 60 * 60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        let secs = i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("athena-datasource")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file; a missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasourceError::config(format!("Failed to read config file: {e}")))?;

        let config = Self::parse_toml(&content, path)?;
        config.datasource.validate()?;
        Ok(config)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DatasourceError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
