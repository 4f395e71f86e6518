//! Configuration system for verso.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ErrorCode, VersoError, VersoResult};

/// Version store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process storage, lost on exit.
    Memory,
    /// SQLite database file.
    #[default]
    Sqlite,
}

/// How owner identities are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    #[default]
    V4,
    V7,
}

/// Version store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type.
    pub backend: StoreBackend,
    /// Path to the SQLite database (ignored by the memory backend).
    pub path: PathBuf,
    /// Prefix for per-field version tables.
    pub table_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let verso_dir = dirs::home_dir()
            .map(|h| h.join(".verso"))
            .unwrap_or_else(|| PathBuf::from(".verso"));

        Self {
            backend: StoreBackend::Sqlite,
            path: verso_dir.join("versions.db"),
            table_prefix: "versions".to_string(),
        }
    }
}

/// Identity configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Generator used when a value first changes.
    pub strategy: IdStrategy,
}

/// Main verso configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Version store configuration.
    pub store: StoreConfig,
    /// Identity configuration.
    pub identity: IdentityConfig,
}

fn invalid_file(message: impl Into<String>) -> VersoError {
    VersoError::Configuration {
        message: message.into(),
        code: ErrorCode::CfgInvalidFile,
        capability: None,
    }
}

impl VersioningConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> VersoResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| invalid_file(e.to_string())),
            Some("json") => serde_json::from_str(&content).map_err(|e| invalid_file(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| invalid_file(e.to_string()))
            }
            _ => Err(invalid_file(
                "Unsupported config file format. Use .toml, .json, or .yaml",
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> VersoResult<Self> {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("VERSO_STORE_BACKEND") {
            config.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sqlite" => StoreBackend::Sqlite,
                other => {
                    return Err(VersoError::configuration(format!(
                        "Unknown store backend '{}'",
                        other
                    )))
                }
            };
        }

        if let Ok(path) = std::env::var("VERSO_DB_PATH") {
            config.store.path = PathBuf::from(path);
        }

        if let Ok(strategy) = std::env::var("VERSO_ID_STRATEGY") {
            config.identity.strategy = match strategy.to_lowercase().as_str() {
                "v4" => IdStrategy::V4,
                "v7" => IdStrategy::V7,
                other => {
                    return Err(VersoError::configuration(format!(
                        "Unknown id strategy '{}'",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> VersioningConfigBuilder {
        VersioningConfigBuilder::default()
    }
}

/// Builder for VersioningConfig.
#[derive(Default)]
pub struct VersioningConfigBuilder {
    config: VersioningConfig,
}

impl VersioningConfigBuilder {
    /// Use an in-memory store.
    pub fn in_memory(mut self) -> Self {
        self.config.store.backend = StoreBackend::Memory;
        self
    }

    /// Use a SQLite store at the given path.
    pub fn sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.store.backend = StoreBackend::Sqlite;
        self.config.store.path = path.into();
        self
    }

    /// Set the version table prefix.
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.store.table_prefix = prefix.into();
        self
    }

    /// Set the identity strategy.
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.config.identity.strategy = strategy;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> VersioningConfig {
        self.config
    }
}
