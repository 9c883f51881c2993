//! Content-addressed package cache.
//!
//! Entries are keyed by (host, owner, repo, commit). Commits are immutable, so
//! an entry is written once and never modified afterwards; the on-disk store
//! can be shared by every project on the machine.
//!
//! Layout of [`FsStore`]:
//!
//! ```text
//! <root>/<host>/<owner>/<repo>/<commit>/
//!     model.yaml
//!     ...
//!     .modelkit-complete      # sha256 of the tree, written last
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::core::error::{Error, Result};
use crate::core::package_key::PackageKey;
use crate::util::fs;
use crate::util::hash::Fingerprint;

/// Marker file written into a cache entry once it is complete.
pub const COMPLETE_MARKER: &str = ".modelkit-complete";

/// Whether a string is a full 40-character hex commit SHA.
pub fn is_commit_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    package: PackageKey,
    commit: String,
}

impl CacheKey {
    /// Create a key. The commit must be a full hex SHA.
    pub fn new(package: PackageKey, commit: &str) -> Result<Self> {
        if !is_commit_sha(commit) {
            return Err(Error::config(format!(
                "`{}` is not a full commit SHA for `{}`",
                commit, package
            )));
        }
        Ok(CacheKey {
            package,
            commit: commit.to_ascii_lowercase(),
        })
    }

    pub fn package(&self) -> &PackageKey {
        &self.package
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Path of the entry relative to the store root.
    pub fn relative_path(&self) -> PathBuf {
        package_dir(&self.package).join(&self.commit)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package, &self.commit[..7])
    }
}

fn package_dir(package: &PackageKey) -> PathBuf {
    Path::new(package.host())
        .join(package.owner())
        .join(package.repo())
}

/// A package's file tree at one commit, keyed by `/`-separated relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageTree {
    files: BTreeMap<String, Vec<u8>>,
}

impl PackageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file. Paths that are absolute or climb out of the tree are rejected.
    pub fn insert(&mut self, path: impl Into<String>, contents: Vec<u8>) -> Result<()> {
        let path = path.into();
        if !is_safe_relative(Path::new(&path)) {
            return Err(Error::config(format!(
                "package file `{}` escapes the package root",
                path
            )));
        }
        self.files.insert(path, contents);
        Ok(())
    }

    /// Builder-style insert for fixtures.
    pub fn with_file(mut self, path: &str, contents: impl AsRef<[u8]>) -> Result<Self> {
        self.insert(path, contents.as_ref().to_vec())?;
        Ok(self)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// SHA-256 over every (path, contents) pair in path order.
    pub fn digest(&self) -> String {
        let mut fp = Fingerprint::new();
        for (path, contents) in &self.files {
            fp.update_str(path).update_bytes(contents);
        }
        fp.finish()
    }

    /// Read a tree back from a directory, skipping the completion marker.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut tree = PackageTree::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if rel == COMPLETE_MARKER {
                continue;
            }
            let contents = std::fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            tree.files.insert(rel, contents);
        }
        Ok(tree)
    }
}

fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Result of checking an entry against its recorded digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Missing,
    Intact,
    Corrupt,
}

/// Storage for materialized packages.
///
/// Implementations must make `materialize` atomic: a reader either sees no
/// entry or a complete one.
pub trait ContentStore: Send + Sync {
    /// Whether a complete entry exists for `key`.
    fn has(&self, key: &CacheKey) -> bool;

    /// Store `tree` under `key` unless an entry already exists, returning its location.
    fn materialize(&self, key: &CacheKey, tree: &PackageTree) -> Result<PathBuf>;

    /// Location of the entry for `key` (whether or not it exists).
    fn path(&self, key: &CacheKey) -> PathBuf;

    /// Read one file of an entry. `Ok(None)` if the entry or file is absent.
    fn read_file(&self, key: &CacheKey, relative: &str) -> Result<Option<Vec<u8>>>;

    /// Check an entry against the digest recorded when it was written.
    fn verify(&self, key: &CacheKey) -> Result<Integrity>;

    /// Remove one entry.
    fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// Remove every entry of one package. Returns how many were removed.
    fn remove_package(&self, package: &PackageKey) -> Result<usize>;

    /// Remove everything.
    fn clear(&self) -> Result<usize>;

    /// All complete entries, sorted.
    fn entries(&self) -> Result<Vec<CacheKey>>;
}

/// Filesystem-backed store rooted at a user-level cache directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Total size of the store on disk.
    pub fn size(&self) -> u64 {
        fs::dir_size(&self.root)
    }

    fn write_entry(&self, key: &CacheKey, tree: &PackageTree) -> Result<PathBuf> {
        let dest = self.path(key);
        let parent = dest.parent().unwrap_or(&self.root).to_path_buf();
        fs::ensure_dir(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempdir_in(&parent)
            .map_err(|e| Error::io(&parent, e))?;

        for (rel, contents) in tree.files() {
            let target = staging.path().join(rel);
            if let Some(dir) = target.parent() {
                fs::ensure_dir(dir)?;
            }
            std::fs::write(&target, contents).map_err(|e| Error::io(&target, e))?;
        }
        let marker = staging.path().join(COMPLETE_MARKER);
        std::fs::write(&marker, tree.digest()).map_err(|e| Error::io(&marker, e))?;

        if dest.exists() {
            if self.has(key) {
                // Another writer finished first.
                return Ok(dest);
            }
            tracing::debug!("removing incomplete cache entry {}", dest.display());
            fs::remove_dir_all_if_exists(&dest)?;
        }

        match std::fs::rename(staging.path(), &dest) {
            Ok(()) => Ok(dest),
            Err(_) if self.has(key) => Ok(dest),
            Err(e) => Err(Error::io(&dest, e)),
        }
    }
}

impl ContentStore for FsStore {
    fn has(&self, key: &CacheKey) -> bool {
        self.path(key).join(COMPLETE_MARKER).is_file()
    }

    fn materialize(&self, key: &CacheKey, tree: &PackageTree) -> Result<PathBuf> {
        if self.has(key) {
            tracing::trace!("cache hit for {}", key);
            return Ok(self.path(key));
        }
        tracing::debug!("writing cache entry {} ({} files)", key, tree.len());
        self.write_entry(key, tree)
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn read_file(&self, key: &CacheKey, relative: &str) -> Result<Option<Vec<u8>>> {
        if !is_safe_relative(Path::new(relative)) || !self.has(key) {
            return Ok(None);
        }
        let path = self.path(key).join(relative);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    fn verify(&self, key: &CacheKey) -> Result<Integrity> {
        if !self.has(key) {
            return Ok(Integrity::Missing);
        }
        let dir = self.path(key);
        let recorded = fs::read_to_string(&dir.join(COMPLETE_MARKER))?;
        let actual = PackageTree::from_dir(&dir)?.digest();
        Ok(if recorded.trim() == actual {
            Integrity::Intact
        } else {
            Integrity::Corrupt
        })
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        let dir = self.path(key);
        let existed = dir.exists();
        fs::remove_dir_all_if_exists(&dir)?;
        Ok(existed)
    }

    fn remove_package(&self, package: &PackageKey) -> Result<usize> {
        let count = self
            .entries()?
            .iter()
            .filter(|k| k.package() == package)
            .count();
        fs::remove_dir_all_if_exists(&self.root.join(package_dir(package)))?;
        Ok(count)
    }

    fn clear(&self) -> Result<usize> {
        let count = self.entries()?.len();
        fs::remove_dir_all_if_exists(&self.root)?;
        Ok(count)
    }

    fn entries(&self) -> Result<Vec<CacheKey>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(4).max_depth(4) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_dir() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let [host, owner, repo, commit] = parts.as_slice() else {
                continue;
            };
            let Ok(package) = PackageKey::new(host, owner, repo) else {
                continue;
            };
            let Ok(key) = CacheKey::new(package, commit) else {
                continue;
            };
            if self.has(&key) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
}

#[derive(Debug)]
struct MemoryEntry {
    tree: PackageTree,
    /// Digest recorded when the entry was written
    digest: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overwrite an entry's tree, keeping its recorded digest.
    pub fn tamper(&self, key: &CacheKey, tree: PackageTree) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.tree = tree;
        }
    }
}

impl ContentStore for MemoryStore {
    fn has(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    fn materialize(&self, key: &CacheKey, tree: &PackageTree) -> Result<PathBuf> {
        self.lock().entry(key.clone()).or_insert_with(|| MemoryEntry {
            tree: tree.clone(),
            digest: tree.digest(),
        });
        Ok(self.path(key))
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        Path::new("memory:").join(key.relative_path())
    }

    fn read_file(&self, key: &CacheKey, relative: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .lock()
            .get(key)
            .and_then(|entry| entry.tree.get(relative).map(<[u8]>::to_vec)))
    }

    fn verify(&self, key: &CacheKey) -> Result<Integrity> {
        Ok(match self.lock().get(key) {
            None => Integrity::Missing,
            Some(entry) if entry.tree.digest() == entry.digest => Integrity::Intact,
            Some(_) => Integrity::Corrupt,
        })
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    fn remove_package(&self, package: &PackageKey) -> Result<usize> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| k.package() != package);
        Ok(before - entries.len())
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn entries(&self) -> Result<Vec<CacheKey>> {
        let mut keys: Vec<CacheKey> = self.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
