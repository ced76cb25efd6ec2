use chrono_tz::Tz;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of the query engine connection and the executor pool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_catalog")]
    pub catalog: String,
    /// Catalog the event collections are stored in.
    #[serde(default = "default_catalog")]
    pub cold_storage_connector: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_user")]
    pub source: String,
    /// IANA zone of the default session, UTC when unset.
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    #[serde(default = "default_worker_keep_alive_secs")]
    pub worker_keep_alive_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_catalog() -> String {
    "hive".to_owned()
}

fn default_user() -> String {
    "presto-exec".to_owned()
}

fn default_max_concurrent_queries() -> usize {
    1000
}

fn default_worker_keep_alive_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            catalog: default_catalog(),
            cold_storage_connector: default_catalog(),
            user: default_user(),
            source: default_user(),
            time_zone: None,
            max_concurrent_queries: default_max_concurrent_queries(),
            worker_keep_alive_secs: default_worker_keep_alive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Reads a TOML file, applies environment overrides and validates.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let mut config: EngineConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup("PRESTO_ADDRESS") {
            self.address = address;
        }
        if let Some(catalog) = lookup("PRESTO_CATALOG") {
            self.catalog = catalog;
        }
        if let Some(connector) = lookup("PRESTO_COLD_STORAGE_CONNECTOR") {
            self.cold_storage_connector = connector;
        }
        if let Some(user) = lookup("PRESTO_USER") {
            self.user = user;
        }
        if let Some(time_zone) = lookup("PRESTO_TIME_ZONE") {
            self.time_zone = Some(time_zone);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_queries must be greater than 0".to_owned(),
            ));
        }
        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "address must be an http(s) URL, got '{}'",
                self.address
            )));
        }
        self.zone()?;
        Ok(())
    }

    pub fn zone(&self) -> Result<Tz, ConfigError> {
        match &self.time_zone {
            None => Ok(Tz::UTC),
            Some(zone) => zone
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("Unknown time zone '{zone}'"))),
        }
    }

    pub fn worker_keep_alive(&self) -> Duration {
        Duration::from_secs(self.worker_keep_alive_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
