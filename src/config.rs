//! Configuration
//!
//! Layered engine configuration: merge-policy defaults, the global user file,
//! workspace files, then `QENGINE__SECTION__KEY` environment overrides.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Dialect names the engine knows how to build.
pub const KNOWN_DIALECTS: &[&str] = &["calculation", "native"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Score store location. No path means an in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Upper bound for one module call in milliseconds. `0` (or no value at
    /// all when built by hand) means unbounded.
    #[serde(default = "default_phase_timeout_ms")]
    pub phase_timeout_ms: Option<u64>,
}

fn default_phase_timeout_ms() -> Option<u64> {
    Some(10_000)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            phase_timeout_ms: default_phase_timeout_ms(),
        }
    }
}

impl ExecutorConfig {
    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Enabled dialects, in lookup order
    #[serde(default = "default_dialects")]
    pub dialects: Vec<String>,
}

fn default_dialects() -> Vec<String> {
    KNOWN_DIALECTS.iter().map(|d| d.to_string()).collect()
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dialects: default_dialects(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Storage(String),
    Loader(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Loader(msg) => write!(f, "Loader: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(path) = &self.storage.store_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Storage(
                    "store_path cannot be empty".to_string(),
                ));
            }
        }

        if self.loader.dialects.is_empty() {
            errors.push(ValidationError::Loader(
                "at least one dialect must be enabled".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for dialect in &self.loader.dialects {
            if !KNOWN_DIALECTS.contains(&dialect.as_str()) {
                errors.push(ValidationError::Loader(format!("unknown dialect '{}'", dialect)));
            }
            if !seen.insert(dialect) {
                errors.push(ValidationError::Loader(format!(
                    "dialect '{}' listed twice",
                    dialect
                )));
            }
        }

        if !["json", "text"].contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "invalid format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
