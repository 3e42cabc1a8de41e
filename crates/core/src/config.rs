//! Settings for retry budgets, transfer concurrency and the manifest name
//!
//! Settings are plain data: load once, pass by reference. A missing config
//! file yields defaults, so nothing here touches the filesystem unless the
//! caller asks for it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "OBSTOR_CONFIG";

/// Retry configuration shared by the retry primitive and the condition gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts (1 = no retries)
    pub max_attempts: u32,
    /// Sleep before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Cap applied to the evolving sleep interval
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

/// Transfer engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bound on concurrent single-object transfers within one bulk operation
    pub object_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            object_concurrency: 10,
        }
    }
}

/// Manifest protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Relative object name of the manifest within the transferred namespace
    pub file_name: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            file_name: crate::manifest::MANIFEST_NAME.to_string(),
        }
    }
}

/// Process settings, usually loaded from `~/.config/obstor/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retry: RetryConfig,
    pub transfer: TransferConfig,
    pub manifest: ManifestConfig,
}

impl Settings {
    /// Load settings from `$OBSTOR_CONFIG`, falling back to the per-user
    /// config directory. A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse settings from a specific TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// The config file location honored by `load`
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join("obstor").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.transfer.object_concurrency, 10);
        assert_eq!(settings.manifest.file_name, ".data_manifest.csv");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[retry]\nmax_attempts = 7").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.retry.max_attempts, 7);
        assert_eq!(settings.retry.initial_backoff_ms, 100);
        assert_eq!(settings.transfer.object_concurrency, 10);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "retry = not-a-table").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_roundtrip() {
        let settings = Settings {
            retry: RetryConfig {
                max_attempts: 5,
                initial_backoff_ms: 50,
                max_backoff_ms: 2_000,
            },
            ..Settings::default()
        };
        let raw = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, settings);
    }
}
