//! Lock file encoding and decoding.
//!
//! model.lock pins every package in the transitive graph to a commit:
//!
//! ```json
//! {
//!   "version": "1",
//!   "dependencies": {
//!     "acme/core": {
//!       "ref": "stable",
//!       "resolvedRef": "v1.0.0",
//!       "refType": "tag",
//!       "resolved": "https://github.com/acme/core.git",
//!       "commit": "abc123..."
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::package_key::PackageKey;
use crate::util::fs;

/// Lock file name.
pub const LOCKFILE_NAME: &str = "model.lock";

/// Current lock file format version.
pub const LOCK_VERSION: &str = "1";

/// What kind of ref a lock entry was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Tag,
    Branch,
    Commit,
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefType::Tag => write!(f, "tag"),
            RefType::Branch => write!(f, "branch"),
            RefType::Commit => write!(f, "commit"),
        }
    }
}

/// A locked package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    /// The ref as declared (after overrides), e.g. `v1.0.0` or `stable`
    #[serde(rename = "ref")]
    pub git_ref: String,

    /// Concrete tag or branch the declaration resolved to, when it differs
    /// from `ref` (`stable` -> `v1.2.0`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ref: Option<String>,

    /// Kind of the concrete ref the declaration resolved to
    pub ref_type: RefType,

    /// Clone URL
    pub resolved: String,

    /// Full commit SHA
    pub commit: String,
}

impl LockEntry {
    /// Abbreviated commit for display.
    pub fn short_commit(&self) -> &str {
        short_commit(&self.commit)
    }

    /// The concrete ref the commit was taken from.
    pub fn concrete_ref(&self) -> &str {
        self.resolved_ref.as_deref().unwrap_or(&self.git_ref)
    }
}

/// Abbreviate a commit SHA to seven characters.
pub fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

/// Lock file representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    /// Lock file format version
    pub version: String,

    /// Locked packages, sorted by key
    #[serde(default)]
    pub dependencies: BTreeMap<PackageKey, LockEntry>,
}

impl Default for LockFile {
    fn default() -> Self {
        LockFile {
            version: LOCK_VERSION.to_string(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// Create an empty lock file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a lock file. Returns `Ok(None)` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string()).map(Some)
    }

    /// Parse lock file content.
    pub fn parse(content: &str, location: &str) -> Result<Self> {
        let lock: LockFile =
            serde_json::from_str(content).map_err(|e| Error::parse(location, e.to_string()))?;
        if lock.version != LOCK_VERSION {
            return Err(Error::parse(
                location,
                format!(
                    "unsupported lock file version `{}` (expected `{}`)",
                    lock.version, LOCK_VERSION
                ),
            ));
        }
        Ok(lock)
    }

    /// Serialize deterministically: sorted keys, two-space indent, trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::parse(LOCKFILE_NAME, e.to_string()))?;
        json.push('\n');
        Ok(json)
    }

    /// Save atomically. Returns `false` when the file already held identical
    /// content and was left untouched.
    pub fn save(&self, path: &Path) -> Result<bool> {
        let json = self.to_json()?;
        if path.exists() && fs::read_to_string(path)? == json {
            tracing::debug!("{} is up to date", path.display());
            return Ok(false);
        }
        fs::write_atomic(path, json.as_bytes())?;
        tracing::info!("wrote {}", path.display());
        Ok(true)
    }

    /// Look up a locked package.
    pub fn get(&self, key: &PackageKey) -> Option<&LockEntry> {
        self.dependencies.get(key)
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: PackageKey, entry: LockEntry) {
        self.dependencies.insert(key, entry);
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &PackageKey) -> Option<LockEntry> {
        self.dependencies.remove(key)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageKey, &LockEntry)> {
        self.dependencies.iter()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
