//! model.yaml manifest parsing and schema.
//!
//! The manifest is the project descriptor: identity, path aliases, dependency
//! declarations, overrides and governance policy.
//!
//! ```yaml
//! model:
//!   name: sales
//!   version: 1.0.0
//!   entry: index.model
//! paths:
//!   "@shared/": ./shared/
//! dependencies:
//!   acme/core: v1.0.0
//! overrides:
//!   acme/units: v2.1.0
//! governance:
//!   allowedSources: ["acme/*"]
//!   requireStableVersions: true
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::address::PathAliases;
use crate::core::dependency::{Dependency, DependencySpec};
use crate::core::error::{Error, Result};
use crate::core::package_key::{source_pattern, PackageKey};
use crate::util::fs;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "model.yaml";

/// Entry file used when the manifest does not declare one.
pub const DEFAULT_ENTRY: &str = "index.model";

/// Identity section (`model:`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelInfo {
    /// Model name
    pub name: String,

    /// Model version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Entry file, relative to the manifest directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
}

/// Governance policy (`governance:`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Governance {
    /// Allowed package sources (exact keys or `prefix/*` patterns); empty allows all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_sources: Vec<String>,

    /// Reject floating and pre-release refs
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_stable_versions: bool,
}

impl Governance {
    /// Whether the governance section carries no policy.
    pub fn is_empty(&self) -> bool {
        self.allowed_sources.is_empty() && !self.require_stable_versions
    }

    /// Whether a package is allowed by `allowedSources`.
    pub fn allows(&self, key: &PackageKey) -> bool {
        self.allowed_sources.is_empty()
            || self.allowed_sources.iter().any(|p| key.matches_pattern(p))
    }
}

/// Raw manifest as deserialized from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawManifest {
    pub model: ModelInfo,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, DependencySpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Governance::is_empty")]
    pub governance: Governance,
}

/// The parsed and validated model.yaml manifest.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    /// The manifest as written
    raw: RawManifest,

    /// Normalized dependencies, in key order
    dependencies: Vec<Dependency>,

    /// Path aliases with workspace-resolved targets
    aliases: PathAliases,

    /// Ref overrides by package key
    overrides: BTreeMap<PackageKey, String>,

    /// Path of the manifest file
    manifest_path: PathBuf,

    /// The directory containing this manifest (the workspace boundary)
    root: PathBuf,
}

impl ProjectManifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse and validate manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest = serde_yaml::from_str(content)
            .map_err(|e| Error::parse(path.display().to_string(), e.to_string()))?;
        let root = fs::normalize_path(path.parent().unwrap_or(Path::new(".")));
        Self::from_raw(raw, path, root)
    }

    /// Validate a raw manifest rooted at `root`.
    pub fn from_raw(raw: RawManifest, path: &Path, root: PathBuf) -> Result<Self> {
        if raw.model.name.trim().is_empty() {
            return Err(Error::config(format!(
                "manifest {} must declare a non-empty `model.name`",
                path.display()
            )));
        }

        let aliases = PathAliases::from_manifest(&raw.paths, &root)?;

        let dependencies = raw
            .dependencies
            .iter()
            .map(|(name, spec)| spec.to_dependency(name, &root))
            .collect::<Result<Vec<_>>>()?;

        let mut overrides = BTreeMap::new();
        for (key, git_ref) in &raw.overrides {
            let package: PackageKey = key.parse().map_err(|e: Error| {
                Error::config(format!("override `{}`: {}", key, e))
            })?;
            if git_ref.trim().is_empty() {
                return Err(Error::config(format!("override `{}` must name a ref", key)));
            }
            overrides.insert(package, git_ref.clone());
        }

        for pattern in &raw.governance.allowed_sources {
            source_pattern(pattern)?;
        }

        Ok(ProjectManifest {
            raw,
            dependencies,
            aliases,
            overrides,
            manifest_path: path.to_path_buf(),
            root,
        })
    }

    /// Serialize the manifest back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.raw)
            .map_err(|e| Error::parse(self.manifest_path.display().to_string(), e.to_string()))
    }

    /// Write the manifest back to its file.
    pub fn save(&self) -> Result<()> {
        fs::write_atomic(&self.manifest_path, self.to_yaml()?.as_bytes())
    }

    /// The manifest as written.
    pub fn raw(&self) -> &RawManifest {
        &self.raw
    }

    /// Get the model name.
    pub fn name(&self) -> &str {
        &self.raw.model.name
    }

    /// Get the model version, if declared.
    pub fn version(&self) -> Option<&str> {
        self.raw.model.version.as_deref()
    }

    /// Entry file path, relative to the manifest directory.
    pub fn entry(&self) -> &str {
        self.raw.model.entry.as_deref().unwrap_or(DEFAULT_ENTRY)
    }

    /// Absolute entry file path.
    pub fn entry_path(&self) -> PathBuf {
        fs::normalize_path(&self.root.join(self.entry()))
    }

    /// Normalized dependencies.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Find a dependency by manifest key.
    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name() == name)
    }

    /// Find the dependency that refers to a package, by key or source.
    pub fn dependency_for(&self, key: &PackageKey) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.refers_to(key))
    }

    /// Git dependencies only.
    pub fn git_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.is_git())
    }

    /// Path aliases.
    pub fn aliases(&self) -> &PathAliases {
        &self.aliases
    }

    /// Ref overrides.
    pub fn overrides(&self) -> &BTreeMap<PackageKey, String> {
        &self.overrides
    }

    /// The ref to use for `key`: this manifest's override if any, else `declared`.
    pub fn effective_ref(&self, key: &PackageKey, declared: &str) -> String {
        self.overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| declared.to_string())
    }

    /// Governance policy.
    pub fn governance(&self) -> &Governance {
        &self.raw.governance
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Directory containing the manifest.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Find the nearest manifest, searching `start_dir` and then its ancestors.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    let start = fs::canonical_path(start_dir);
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
}

/// Load the nearest manifest. Closest wins; ancestors are never merged.
///
/// Returns `Ok(None)` when no manifest exists anywhere up the tree.
pub fn load_manifest(start_dir: &Path) -> Result<Option<ProjectManifest>> {
    match find_manifest(start_dir) {
        Some(path) => {
            tracing::debug!("found manifest at {}", path.display());
            ProjectManifest::load(&path).map(Some)
        }
        None => Ok(None),
    }
}

static GLOBAL_MANIFESTS: LazyLock<ManifestCache> = LazyLock::new(ManifestCache::new);

/// Per-process cache of manifests, keyed by manifest path.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: Mutex<HashMap<PathBuf, Arc<ProjectManifest>>>,
}

impl ManifestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static ManifestCache {
        &GLOBAL_MANIFESTS
    }

    /// Load the nearest manifest for `start_dir`, reusing a cached parse.
    pub fn load(&self, start_dir: &Path) -> Result<Option<Arc<ProjectManifest>>> {
        let Some(path) = find_manifest(start_dir) else {
            return Ok(None);
        };

        if let Some(cached) = self.lock().get(&path) {
            tracing::trace!("manifest cache hit for {}", path.display());
            return Ok(Some(Arc::clone(cached)));
        }

        let manifest = Arc::new(ProjectManifest::load(&path)?);
        self.lock().insert(path, Arc::clone(&manifest));
        Ok(Some(manifest))
    }

    /// Drop a cached manifest so the next load re-reads it.
    pub fn invalidate(&self, manifest_path: &Path) {
        self.lock().remove(manifest_path);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<ProjectManifest>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Generate a default model.yaml for a new workspace.
pub fn generate_default_manifest(name: &str) -> String {
    format!(
        r#"model:
  name: {name}
  version: 0.1.0
  entry: {DEFAULT_ENTRY}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Result<ProjectManifest> {
        ProjectManifest::parse(content, Path::new("/ws/model.yaml"))
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse(
            r#"
model:
  name: sales
  version: 1.0.0
  entry: main.model
paths:
  "@shared/": ./shared/
dependencies:
  acme/core: v1.0.0
  units:
    source: acme/units
    ref: stable
    description: Units of measure
  local:
    path: ./vendor/local
overrides:
  acme/units: v2.1.0
governance:
  allowedSources: ["acme/*"]
  requireStableVersions: true
"#,
        )
        .unwrap();

        assert_eq!(manifest.name(), "sales");
        assert_eq!(manifest.version(), Some("1.0.0"));
        assert_eq!(manifest.entry_path(), PathBuf::from("/ws/main.model"));
        assert_eq!(manifest.dependencies().len(), 3);
        assert_eq!(manifest.git_dependencies().count(), 2);
        assert_eq!(manifest.dependency("units").unwrap().git_ref(), "stable");
        let units: PackageKey = "acme/units".parse().unwrap();
        assert_eq!(manifest.overrides().get(&units).map(String::as_str), Some("v2.1.0"));
        assert!(manifest.governance().require_stable_versions);
        assert!(manifest.governance().allows(&units));
    }

    #[test]
    fn test_default_entry() {
        let manifest = parse("model:\n  name: m\n").unwrap();
        assert_eq!(manifest.entry(), DEFAULT_ENTRY);
    }

    #[test]
    fn test_alias_without_at_prefix_rejected() {
        let err = parse("model:\n  name: m\npaths:\n  shared/: ./shared/\n").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("must start with `@`"));
    }

    #[test]
    fn test_alias_escaping_workspace_rejected() {
        let err = parse("model:\n  name: m\npaths:\n  \"@up\": ../outside\n").unwrap_err();
        assert!(err.to_string().contains("outside workspace boundary"));
    }

    #[test]
    fn test_path_dependency_outside_workspace_rejected() {
        let err = parse(
            "model:\n  name: m\ndependencies:\n  secrets:\n    path: ../../secrets\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("outside workspace boundary"));
    }

    #[test]
    fn test_source_and_path_rejected() {
        let err = parse(
            "model:\n  name: m\ndependencies:\n  x:\n    source: acme/x\n    path: ./x\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("both `source` and `path`"));
    }

    #[test]
    fn test_invalid_allowed_source_rejected() {
        let err = parse("model:\n  name: app\ngovernance:\n  allowedSources: [\"acme/[core\"]\n")
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("invalid source pattern"));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = parse("model: [unclosed").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_save_load_idempotent() {
        let manifest = parse(
            "model:\n  name: m\n  version: 2.0.0\npaths:\n  \"@lib\": ./lib\ndependencies:\n  acme/core: v1.0.0\n  b:\n    source: acme/b\n    ref: latest\ngovernance:\n  requireStableVersions: true\n",
        )
        .unwrap();

        let first = manifest.to_yaml().unwrap();
        let reparsed = parse(&first).unwrap();
        let second = reparsed.to_yaml().unwrap();

        assert_eq!(first, second);
        assert_eq!(manifest.raw(), reparsed.raw());
    }

    #[test]
    fn test_nearest_manifest_wins() {
        let tmp = TempDir::new().unwrap();
        let outer = tmp.path();
        let inner = outer.join("nested");
        let deep = inner.join("src").join("deep");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(outer.join(MANIFEST_NAME), "model:\n  name: outer\n").unwrap();
        std::fs::write(inner.join(MANIFEST_NAME), "model:\n  name: inner\n").unwrap();

        let manifest = load_manifest(&deep).unwrap().unwrap();
        assert_eq!(manifest.name(), "inner");
        assert!(manifest.dependencies().is_empty());
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("b");
        std::fs::create_dir_all(&dir).unwrap();
        // A manifest in some ancestor of the temp dir would be found; none is expected there.
        if find_manifest(tmp.path()).is_none() {
            assert!(load_manifest(&dir).unwrap().is_none());
        }
    }

    #[test]
    fn test_manifest_cache_reuses_parse() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "model:\n  name: cached\n").unwrap();

        let cache = ManifestCache::new();
        let first = cache.load(tmp.path()).unwrap().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "model:\n  name: changed\n").unwrap();
        let second = cache.load(tmp.path()).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate(first.manifest_path());
        let third = cache.load(tmp.path()).unwrap().unwrap();
        assert_eq!(third.name(), "changed");
    }

    #[test]
    fn test_generate_default_manifest_parses() {
        let text = generate_default_manifest("demo");
        let manifest = parse(&text).unwrap();
        assert_eq!(manifest.name(), "demo");
        assert_eq!(manifest.entry(), DEFAULT_ENTRY);
    }
}
