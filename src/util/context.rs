//! Global context for modelkit operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use directories::{BaseDirs, ProjectDirs};

use crate::core::error::{Error, Result};
use crate::core::manifest::find_manifest;
use crate::sources::cache::FsStore;
use crate::sources::git::{GitFetcher, RetryPolicy};
use crate::sources::remote::Git2Remote;
use crate::util::config::Config;

/// Environment variable overriding the package cache root.
pub const CACHE_DIR_ENV: &str = "MODELKIT_CACHE_DIR";

/// Project directories for modelkit
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("dev", "modelkit", "modelkit"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global modelkit data
    home: PathBuf,

    /// Loaded configuration
    config: Config,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults, reading `<home>/config.toml`.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;

        let home = if let Some(dirs) = PROJECT_DIRS.as_ref() {
            dirs.cache_dir().to_path_buf()
        } else {
            BaseDirs::new()
                .map(|b| b.home_dir().join(".modelkit"))
                .unwrap_or_else(|| PathBuf::from(".modelkit"))
        };

        let config = Config::load_or_default(&home.join("config.toml"))?;

        Ok(GlobalContext {
            cwd,
            home,
            config,
            verbose: false,
            color: true,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Replace the loaded configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the modelkit home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the package cache root.
    ///
    /// `MODELKIT_CACHE_DIR` wins over `[cache] dir`, which wins over the default.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        self.config
            .cache
            .dir
            .clone()
            .unwrap_or_else(|| self.home.join("packages"))
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// The on-disk package store.
    pub fn store(&self) -> FsStore {
        FsStore::new(self.cache_dir())
    }

    /// A fetcher backed by libgit2 and the on-disk store.
    pub fn fetcher(&self) -> GitFetcher {
        GitFetcher::new(Arc::new(Git2Remote::new()), Arc::new(self.store()))
            .with_retry(RetryPolicy::from(&self.config.net))
    }

    /// Find model.yaml starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Option<PathBuf> {
        find_manifest(&self.cwd)
    }
}
