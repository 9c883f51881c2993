//! Configuration file support for modelkit.
//!
//! User-wide settings live in `<home>/config.toml`:
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/modelkit"
//!
//! [net]
//! retries = 3
//! initial_backoff_ms = 200
//! max_backoff_ms = 5000
//!
//! [resolve]
//! cycle_policy = "warn"
//! ```
//!
//! Every key is optional; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::util::fs;

/// modelkit configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Package cache settings
    pub cache: CacheConfig,

    /// Network settings
    pub net: NetConfig,

    /// Resolution settings
    pub resolve: ResolveConfig,
}

/// Package cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Override the cache root
    pub dir: Option<PathBuf>,
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Retries after a transient failure
    pub retries: u32,

    /// First backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

/// What to do when the package graph has a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Fail the install with a cycle error
    #[default]
    Error,
    /// Report the cycle and continue
    Warn,
}

/// Resolution configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub cycle_policy: CyclePolicy,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::parse(path.display().to_string(), e.to_string()))
    }

    /// Load configuration, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?;
        fs::write_atomic(path, contents.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.net.retries, 3);
        assert_eq!(config.resolve.cycle_policy, CyclePolicy::Error);
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
[net]
retries = 5

[resolve]
cycle_policy = "warn"
"#,
        )
        .unwrap();

        assert_eq!(config.net.retries, 5);
        assert_eq!(config.net.max_backoff_ms, 5_000);
        assert_eq!(config.resolve.cycle_policy, CyclePolicy::Warn);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/tmp/modelkit-cache"));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_default(&tmp.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_cycle_policy_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[resolve]\ncycle_policy = \"ignore\"\n");
        assert!(result.is_err());
    }
}
