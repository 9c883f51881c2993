//! Workspace - the project rooted at a model.yaml.
//!
//! A Workspace pairs the root manifest with the paths derived from it
//! (lock file, entry file) and is the unit the ops layer works on.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::error::{Error, Result};
use crate::core::manifest::{ManifestCache, ProjectManifest};
use crate::resolver::encode::{LockFile, LOCKFILE_NAME};
use crate::util::diagnostic::suggestions;

/// A workspace containing the root manifest.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// The root manifest
    manifest: Arc<ProjectManifest>,

    /// Directory containing model.yaml
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace from a manifest path.
    pub fn new(manifest_path: &Path) -> Result<Self> {
        let manifest = ProjectManifest::load(manifest_path)?;
        Ok(Self::from_manifest(Arc::new(manifest)))
    }

    /// Wrap an already-parsed manifest.
    pub fn from_manifest(manifest: Arc<ProjectManifest>) -> Self {
        let root = manifest.root().to_path_buf();
        Workspace { manifest, root }
    }

    /// Find the workspace for `start_dir`, using the process manifest cache.
    pub fn discover(start_dir: &Path) -> Result<Option<Self>> {
        Ok(ManifestCache::global()
            .load(start_dir)?
            .map(Self::from_manifest))
    }

    /// Like [`Workspace::discover`], but a missing manifest is an error.
    pub fn require(start_dir: &Path) -> Result<Self> {
        Self::discover(start_dir)?.ok_or_else(|| {
            Error::not_found_with_help(
                "manifest",
                format!("model.yaml in {} or any parent directory", start_dir.display()),
                suggestions::NO_MANIFEST,
            )
        })
    }

    /// Re-read model.yaml from disk, bypassing the cache.
    pub fn reload(&self) -> Result<Self> {
        let path = self.manifest.manifest_path().to_path_buf();
        ManifestCache::global().invalidate(&path);
        Self::new(&path)
    }

    /// Get the root manifest.
    pub fn manifest(&self) -> &ProjectManifest {
        &self.manifest
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the manifest path.
    pub fn manifest_path(&self) -> &Path {
        self.manifest.manifest_path()
    }

    /// Get the lock file path.
    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCKFILE_NAME)
    }

    /// Load model.lock, or an empty lock if none exists yet.
    pub fn load_lock(&self) -> Result<LockFile> {
        Ok(LockFile::load(&self.lockfile_path())?.unwrap_or_default())
    }

    /// Whether model.lock exists.
    pub fn has_lock(&self) -> bool {
        self.lockfile_path().is_file()
    }

    /// Absolute path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        self.manifest.entry_path()
    }
}
