//! Configuration types

use crate::{ConfigError, LocdocError, LocdocResult, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default capacity of the broadcast channels backing change streams.
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Longest accepted database or collection name.
pub const MAX_NAME_LEN: usize = 128;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_$-]*$").expect("Invalid name regex"));

/// Validate a database or collection name.
///
/// Names start with a lowercase letter and continue with lowercase letters,
/// digits, `_`, `$` or `-`.
pub fn validate_name(kind: &str, name: &str) -> LocdocResult<()> {
    let invalid = |reason: &str| -> LocdocError {
        ValidationError::InvalidName {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is too long"));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(invalid("name must match ^[a-z][a-z0-9_$-]*$"));
    }
    Ok(())
}

/// Durable storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local storage, lost when the backend is dropped.
    #[default]
    Memory,
    /// LMDB environment in `path`.
    Lmdb {
        path: PathBuf,
        #[serde(default = "default_lmdb_max_size_mb")]
        max_size_mb: usize,
    },
}

fn default_lmdb_max_size_mb() -> usize {
    DEFAULT_LMDB_MAX_SIZE_MB
}

fn default_change_buffer() -> usize {
    DEFAULT_CHANGE_BUFFER
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Capacity of every change stream channel opened by this database.
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
}

impl DatabaseConfig {
    /// In-memory database with default settings.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::Memory,
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }

    /// LMDB-backed database with default settings.
    pub fn lmdb(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            backend: BackendConfig::Lmdb {
                path: path.into(),
                max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            },
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }

    /// Set the change stream capacity.
    pub fn with_change_buffer(mut self, capacity: usize) -> Self {
        self.change_buffer = capacity;
        self
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(input: &str) -> LocdocResult<Self> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `LOCDOC_DB_NAME`: Database name (default: `locdoc`)
    /// - `LOCDOC_LMDB_PATH`: Selects the LMDB backend in this directory (default: in-memory)
    /// - `LOCDOC_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `LOCDOC_CHANGE_BUFFER`: Change stream capacity (default: 256)
    pub fn from_env() -> Self {
        let name = std::env::var("LOCDOC_DB_NAME").unwrap_or_else(|_| "locdoc".to_string());

        let backend = match std::env::var("LOCDOC_LMDB_PATH") {
            Ok(path) => BackendConfig::Lmdb {
                path: PathBuf::from(path),
                max_size_mb: std::env::var("LOCDOC_LMDB_MAX_SIZE_MB")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LMDB_MAX_SIZE_MB),
            },
            Err(_) => BackendConfig::Memory,
        };

        Self {
            name,
            backend,
            change_buffer: std::env::var("LOCDOC_CHANGE_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHANGE_BUFFER),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - name is a valid database name
    /// - change_buffer > 0
    /// - LMDB max_size_mb > 0 and path is not empty
    pub fn validate(&self) -> LocdocResult<()> {
        if let Err(LocdocError::Validation(ValidationError::InvalidName { reason, .. })) =
            validate_name("database", &self.name)
        {
            return Err(ConfigError::InvalidValue {
                field: "name".to_string(),
                value: self.name.clone(),
                reason,
            }
            .into());
        }

        if self.change_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "change_buffer".to_string(),
                value: self.change_buffer.to_string(),
                reason: "change_buffer must be greater than 0".to_string(),
            }
            .into());
        }

        if let BackendConfig::Lmdb { path, max_size_mb } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "backend.path".to_string(),
                }
                .into());
            }
            if *max_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "backend.max_size_mb".to_string(),
                    value: max_size_mb.to_string(),
                    reason: "max_size_mb must be greater than 0".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}
