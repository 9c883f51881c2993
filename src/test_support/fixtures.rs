//! Test fixtures for common test scenarios.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::manifest::MANIFEST_NAME;
use crate::core::workspace::Workspace;
use crate::sources::cache::PackageTree;

/// A workspace written to a temporary directory.
pub struct WorkspaceFixture {
    dir: TempDir,
}

impl WorkspaceFixture {
    /// Create a workspace with the given model.yaml content.
    pub fn new(manifest: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MANIFEST_NAME), manifest).unwrap();
        WorkspaceFixture { dir }
    }

    /// Workspace with only a name and no dependencies.
    pub fn minimal(name: &str) -> Self {
        Self::new(&format!("model:\n  name: {}\n", name))
    }

    /// Add a file relative to the workspace root.
    pub fn file(self, relative: &str, contents: &str) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    /// Overwrite model.yaml.
    pub fn set_manifest(&self, manifest: &str) {
        std::fs::write(self.dir.path().join(MANIFEST_NAME), manifest).unwrap();
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Load the workspace, bypassing the process manifest cache.
    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.dir.path().join(MANIFEST_NAME)).unwrap()
    }
}

/// A package tree holding a manifest and model files.
pub fn package_tree(manifest: &str, files: &[(&str, &str)]) -> PackageTree {
    let mut tree = PackageTree::new().with_file(MANIFEST_NAME, manifest).unwrap();
    for (path, contents) in files {
        tree.insert(*path, contents.as_bytes().to_vec()).unwrap();
    }
    tree
}

/// model.yaml for a package with the given git dependencies (`key: ref`).
pub fn package_manifest(name: &str, deps: &[(&str, &str)]) -> String {
    let mut out = format!("model:\n  name: {}\n", name);
    if !deps.is_empty() {
        out.push_str("dependencies:\n");
        for (key, git_ref) in deps {
            out.push_str(&format!("  {}: {}\n", key, git_ref));
        }
    }
    out
}
