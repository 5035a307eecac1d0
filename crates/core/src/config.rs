//! bisync configuration file parsing (bisync.toml)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Config file name
pub const CONFIG_FILE: &str = "bisync.toml";

/// Sync daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Local tree
    pub local_root: PathBuf,
    /// Directory standing in for the remote store
    pub remote_root: PathBuf,
    /// Snapshot document location
    pub snapshot: PathBuf,
    /// How long a self-inflicted write is ignored when the watcher reports it
    pub suppress_window_ms: u64,
    /// How often the idle worker checks for shutdown
    pub poll_interval_ms: u64,
    /// Watcher debounce timeout
    pub debounce_ms: u64,
    /// Gitignore-style patterns excluded from sync
    pub ignore: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("local_root"),
            remote_root: PathBuf::from("uploads"),
            snapshot: PathBuf::from(".sync_snapshot.json"),
            suppress_window_ms: 1500,
            poll_interval_ms: 1000,
            debounce_ms: 100,
            ignore: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Load config from `path`.
    ///
    /// Returns the default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Parse TOML content; `origin` only labels errors
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] on invalid TOML, unknown keys or bad values.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SyncError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Check values that deserialize fine but cannot work together
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] naming the offending setting.
    pub fn validate(&self, origin: &Path) -> Result<()> {
        let invalid = |message: &str| SyncError::Config {
            path: origin.to_path_buf(),
            message: message.to_string(),
        };
        if self.local_root == self.remote_root {
            return Err(invalid("local_root and remote_root must differ"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be positive"));
        }
        if self.suppress_window_ms <= self.debounce_ms {
            return Err(invalid("suppress_window_ms must exceed debounce_ms"));
        }
        Ok(())
    }

    #[must_use]
    pub fn suppress_window(&self) -> Duration {
        Duration::from_millis(self.suppress_window_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
local_root = "work"
remote_root = "/srv/mirror"
snapshot = "state/snapshot.json"
suppress_window_ms = 2000
poll_interval_ms = 250
debounce_ms = 50
ignore = ["*.swp", "target/"]
"#;

        let config = SyncConfig::parse(toml, Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config.local_root, PathBuf::from("work"));
        assert_eq!(config.remote_root, PathBuf::from("/srv/mirror"));
        assert_eq!(config.snapshot, PathBuf::from("state/snapshot.json"));
        assert_eq!(config.suppress_window(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.ignore, vec!["*.swp", "target/"]);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = SyncConfig::parse("", Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.suppress_window(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_partial_config() {
        let config = SyncConfig::parse("ignore = [\".git/\"]\n", Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(config.ignore.len(), 1);
        assert_eq!(config.local_root, PathBuf::from("local_root"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SyncConfig::parse("lcoal_root = \"x\"\n", Path::new(CONFIG_FILE)).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn test_same_roots_rejected() {
        let toml = "local_root = \"a\"\nremote_root = \"a\"\n";
        let err = SyncConfig::parse(toml, Path::new(CONFIG_FILE)).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_window_must_exceed_debounce() {
        let toml = "suppress_window_ms = 100\ndebounce_ms = 100\n";
        assert!(SyncConfig::parse(toml, Path::new(CONFIG_FILE)).is_err());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SyncConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "remote_root = \"mirror\"\n").unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.remote_root, PathBuf::from("mirror"));
    }
}
