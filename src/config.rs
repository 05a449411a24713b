//! Sync Configuration
//!
//! JSON settings file. Every field has a default so a partial file (or none
//! at all) is valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Table whose changes this client follows
    pub table: String,
    /// Change-feed channel name
    pub channel: String,
    /// Stamped as owner on every new task
    pub owner_id: Option<String>,
    /// Rolling log directory; logging stays off when unset
    pub log_dir: Option<PathBuf>,
    pub app_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table: "tasks".to_string(),
            channel: "tasks_change".to_string(),
            owner_id: None,
            log_dir: None,
            app_name: "TaskSync".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, r#"{ "owner_id": "user-1" }"#).unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.owner_id.as_deref(), Some("user-1"));
        assert_eq!(config.table, "tasks");
        assert_eq!(config.channel, "tasks_change");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        let config = SyncConfig {
            table: "todos".to_string(),
            log_dir: Some(dir.path().join("logs")),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SyncConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(SyncConfig::load(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ table: ").unwrap();
        assert!(matches!(SyncConfig::load(&broken), Err(ConfigError::Parse { .. })));
    }
}
