//! Configuration management for the Cloudsave server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::providers::DEFAULT_MAX_SAVES;
use crate::sync::{ConflictStrategy, DEFAULT_MONITORED_FIELDS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub providers: ProvidersConfig,
    pub storage: Option<StorageConfig>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Sync manager settings
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub enabled: bool,
    pub conflict_resolution: ConflictStrategy,
    pub monitored_fields: Vec<String>,
}

/// Settings shared by the built-in providers
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub local_dir: PathBuf,
    pub max_saves: usize,
    /// Provider to activate at startup instead of the first registered one
    pub default_provider: Option<String>,
}

/// S3-compatible object store for the `s3` provider
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            enabled: true,
            conflict_resolution: ConflictStrategy::default(),
            monitored_fields: DEFAULT_MONITORED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            sync: SyncConfig::default(),
            providers: ProvidersConfig {
                local_dir: PathBuf::from("./saves"),
                max_saves: DEFAULT_MAX_SAVES,
                default_provider: None,
            },
            storage: None,
            database: DatabaseConfig {
                url: "sqlite:./cloudsave.db".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from any variable source; unset variables take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let conflict_resolution = match var("SYNC_CONFLICT_RESOLUTION") {
            Some(value) => ConflictStrategy::parse(&value).ok_or(ConfigError::InvalidValue {
                var: "SYNC_CONFLICT_RESOLUTION",
                value,
            })?,
            None => defaults.sync.conflict_resolution,
        };

        let monitored_fields = match var("SYNC_MONITORED_FIELDS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect(),
            None => defaults.sync.monitored_fields,
        };

        let max_saves = match var("SYNC_MAX_SAVES") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "SYNC_MAX_SAVES",
                        value,
                    })
                }
            },
            None => defaults.providers.max_saves,
        };

        let port = match var("SERVER_PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                var: "SERVER_PORT",
                value: value.clone(),
            })?,
            None => defaults.server.port,
        };

        // The s3 provider is only configured when its connection details are all present
        let storage = match (
            var("S3_ENDPOINT"),
            var("S3_BUCKET"),
            var("S3_ACCESS_KEY"),
            var("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                Some(StorageConfig {
                    endpoint,
                    bucket,
                    access_key,
                    secret_key,
                    region: var("S3_REGION"),
                    prefix: var("S3_PREFIX").unwrap_or_else(|| "saves".to_string()),
                })
            }
            _ => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            sync: SyncConfig {
                enabled: var("SYNC_ENABLED")
                    .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off"))
                    .unwrap_or(defaults.sync.enabled),
                conflict_resolution,
                monitored_fields,
            },
            providers: ProvidersConfig {
                local_dir: var("SYNC_LOCAL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.providers.local_dir),
                max_saves,
                default_provider: var("SYNC_DEFAULT_PROVIDER"),
            },
            storage,
            database: DatabaseConfig {
                url: var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
        })
    }
}
