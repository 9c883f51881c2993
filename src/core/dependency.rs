//! Dependency specification.
//!
//! Dependencies appear in `model.yaml` in one of two shapes:
//!
//! ```yaml
//! dependencies:
//!   acme/core: v1.0.0              # short form: key is the source, value the ref
//!   shared:                        # extended form
//!     source: acme/shared
//!     ref: stable
//!     description: Shared vocabulary
//!   local:
//!     path: ./packages/local
//! ```
//!
//! Both shapes are normalized into a single [`Dependency`] right after decoding.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::package_key::PackageKey;
use crate::util::fs::join_within;

/// Ref used when a git dependency does not name one.
pub const DEFAULT_REF: &str = "main";

/// Dependency specification as it appears in model.yaml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Bare ref string: `acme/core: v1.0.0`
    Short(String),

    /// Extended specification
    Extended(ExtendedDependencySpec),
}

/// Extended dependency specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendedDependencySpec {
    /// Git package key (`owner/repo`, `host/owner/repo` or URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Local package directory, relative to the workspace root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Tag, branch, commit, or policy (`latest`, `stable`)
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where a dependency comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// A git-hosted package.
    Git(PackageKey),
    /// A local directory inside the workspace (normalized, absolute).
    Path(PathBuf),
}

/// A normalized dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Key under `dependencies:` in the manifest
    name: String,

    /// Where to find the package
    source: DependencySource,

    /// Declared ref (git dependencies only)
    git_ref: Option<String>,

    /// Optional description
    description: Option<String>,
}

impl Dependency {
    /// Create a git dependency.
    pub fn git(name: impl Into<String>, key: PackageKey, git_ref: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            source: DependencySource::Git(key),
            git_ref: Some(git_ref.into()),
            description: None,
        }
    }

    /// Create a path dependency.
    pub fn path(name: impl Into<String>, path: PathBuf) -> Self {
        Dependency {
            name: name.into(),
            source: DependencySource::Path(path),
            git_ref: None,
            description: None,
        }
    }

    /// Get the manifest key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the dependency source.
    pub fn source(&self) -> &DependencySource {
        &self.source
    }

    /// Get the package key of a git dependency.
    pub fn package_key(&self) -> Option<&PackageKey> {
        match &self.source {
            DependencySource::Git(key) => Some(key),
            DependencySource::Path(_) => None,
        }
    }

    /// Get the local directory of a path dependency.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            DependencySource::Path(path) => Some(path),
            DependencySource::Git(_) => None,
        }
    }

    /// The declared ref, or [`DEFAULT_REF`] for git dependencies without one.
    pub fn git_ref(&self) -> &str {
        self.git_ref.as_deref().unwrap_or(DEFAULT_REF)
    }

    /// Get the description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Check if this is a git dependency.
    pub fn is_git(&self) -> bool {
        matches!(self.source, DependencySource::Git(_))
    }

    /// Whether this dependency refers to the given package, by source or by name.
    pub fn refers_to(&self, key: &PackageKey) -> bool {
        match &self.source {
            DependencySource::Git(source) => source == key,
            DependencySource::Path(_) => self.name.parse::<PackageKey>().ok().as_ref() == Some(key),
        }
    }
}

impl DependencySpec {
    /// Normalize into a [`Dependency`], enforcing the workspace sandbox.
    pub fn to_dependency(&self, name: &str, workspace_root: &Path) -> Result<Dependency> {
        match self {
            DependencySpec::Short(git_ref) => {
                let key: PackageKey = name.parse().map_err(|_| {
                    Error::config(format!(
                        "dependency `{}` uses the short form, so its key must be a package source like `owner/repo`",
                        name
                    ))
                })?;
                Ok(Dependency::git(name, key, git_ref.clone()))
            }
            DependencySpec::Extended(spec) => spec.to_dependency(name, workspace_root),
        }
    }
}

impl ExtendedDependencySpec {
    /// Normalize into a [`Dependency`].
    pub fn to_dependency(&self, name: &str, workspace_root: &Path) -> Result<Dependency> {
        let source = match (&self.source, &self.path) {
            (Some(_), Some(_)) => {
                return Err(Error::config(format!(
                    "dependency `{}` cannot specify both `source` and `path`",
                    name
                )));
            }
            (None, None) => {
                return Err(Error::config(format!(
                    "dependency `{}` must specify either `source` or `path`",
                    name
                )));
            }
            (Some(source), None) => DependencySource::Git(
                source
                    .parse::<PackageKey>()
                    .map_err(|e| Error::config(format!("dependency `{}`: {}", name, e)))?,
            ),
            (None, Some(path)) => {
                let resolved = join_within(workspace_root, workspace_root, Path::new(path))
                    .ok_or_else(|| {
                        Error::config(format!(
                            "dependency `{}` path `{}` resolves outside workspace boundary",
                            name, path
                        ))
                    })?;
                DependencySource::Path(resolved)
            }
        };

        Ok(Dependency {
            name: name.to_string(),
            source,
            git_ref: self.git_ref.clone(),
            description: self.description.clone(),
        })
    }
}
