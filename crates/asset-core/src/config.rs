//! Process configuration, loaded from an optional YAML file.
//!
//! A nested struct tree with `#[serde(default)]` on every field so a
//! partial (or absent) config file still produces sane values via
//! [`Config::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads the scheduler spins up. Zero means "pick
    /// a value from the available parallelism at construction time".
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { worker_threads: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemConfig {
    /// Whether `FileSystem::default_scan_flags` includes
    /// `RECURSE_DIRECTORIES`, i.e. whether library scans recurse into
    /// subdirectories by default when the caller has no explicit
    /// preference of its own.
    pub watch_recursive_by_default: bool,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            watch_recursive_by_default: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub filesystem: FileSystemConfig,
}

impl Config {
    /// Loads and parses a config file. Fails if the file exists but
    /// cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads `path` if present, otherwise falls back to
    /// [`Config::default`]. Parse errors in a file that *does* exist are
    /// still propagated: a malformed config should never silently
    /// degrade to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.scheduler.worker_threads, 0);
        assert!(config.filesystem.watch_recursive_by_default);
    }

    #[test]
    fn load_or_default_falls_back_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.scheduler.worker_threads, 0);
    }

    #[test]
    fn load_parses_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "scheduler:\n  worker_threads: 8\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.scheduler.worker_threads, 8);
        assert!(config.filesystem.watch_recursive_by_default);
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "scheduler: [this, is, not, a, map]\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
