//! Implementation of `modelkit add` and `modelkit remove`.
//!
//! Both edit model.yaml as a YAML value tree, validate the result as a
//! manifest, and only then write it back. The lock file is left alone; the
//! next install picks the change up.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::core::dependency::DEFAULT_REF;
use crate::core::error::{Error, Result};
use crate::core::manifest::{ManifestCache, ProjectManifest, MANIFEST_NAME};
use crate::core::package_key::PackageKey;
use crate::util::diagnostic::suggestions;
use crate::util::fs;

/// Options for adding a dependency.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Package key (`owner/repo`), or the dependency name for a path dependency
    pub name: String,

    /// Git ref, tag or policy
    pub git_ref: Option<String>,

    /// Local path dependency
    pub path: Option<String>,

    /// Free-form description
    pub description: Option<String>,
}

/// Result of adding a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddResult {
    pub name: String,
    /// Whether an existing declaration was replaced
    pub replaced: bool,
}

/// Result of removing a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveResult {
    pub name: String,
    /// Whether an override for the package was dropped too
    pub removed_override: bool,
}

/// Add (or replace) a dependency in model.yaml.
pub fn add_dependency(manifest_path: &Path, opts: &AddOptions) -> Result<AddResult> {
    let mut doc = read_document(manifest_path)?;

    let (name, value) = match &opts.path {
        Some(path) => {
            if opts.git_ref.is_some() {
                return Err(Error::config(format!(
                    "path dependency `{}` cannot specify a ref",
                    opts.name
                )));
            }
            let mut table = Mapping::new();
            table.insert("path".into(), path.as_str().into());
            if let Some(description) = &opts.description {
                table.insert("description".into(), description.as_str().into());
            }
            (opts.name.clone(), Value::Mapping(table))
        }
        None => {
            let key: PackageKey = opts.name.parse()?;
            let git_ref = opts.git_ref.as_deref().unwrap_or(DEFAULT_REF);
            let value = match &opts.description {
                Some(description) => {
                    let mut table = Mapping::new();
                    table.insert("source".into(), key.to_string().into());
                    table.insert("ref".into(), git_ref.into());
                    table.insert("description".into(), description.as_str().into());
                    Value::Mapping(table)
                }
                None => Value::String(git_ref.to_string()),
            };
            (key.to_string(), value)
        }
    };

    let deps = section_mut(&mut doc, "dependencies", manifest_path)?;
    let replaced = deps.insert(name.as_str().into(), value).is_some();

    write_document(manifest_path, &doc)?;
    tracing::info!("{} `{}` in {}", if replaced { "updated" } else { "added" }, name, MANIFEST_NAME);
    Ok(AddResult { name, replaced })
}

/// Remove a dependency (and any override for it) from model.yaml.
pub fn remove_dependency(manifest_path: &Path, name: &str) -> Result<RemoveResult> {
    let mut doc = read_document(manifest_path)?;
    let key = name.parse::<PackageKey>().ok();

    let deps = section_mut(&mut doc, "dependencies", manifest_path)?;
    let existing = deps
        .keys()
        .filter_map(Value::as_str)
        .find(|k| *k == name || matches_key(k, key.as_ref()))
        .map(str::to_string);
    let Some(existing) = existing else {
        return Err(Error::not_found_with_help(
            "dependency",
            format!("`{}` in {}", name, MANIFEST_NAME),
            suggestions::PACKAGE_NOT_FOUND,
        ));
    };
    deps.remove(existing.as_str());
    if deps.is_empty() {
        remove_section(&mut doc, "dependencies");
    }

    let mut removed_override = false;
    if let Some(overrides) = doc.get_mut("overrides").and_then(Value::as_mapping_mut) {
        let dropped: Vec<Value> = overrides
            .keys()
            .filter(|k| k.as_str().is_some_and(|s| s == existing || matches_key(s, key.as_ref())))
            .cloned()
            .collect();
        for k in &dropped {
            overrides.remove(k);
        }
        removed_override = !dropped.is_empty();
        if overrides.is_empty() {
            remove_section(&mut doc, "overrides");
        }
    }

    write_document(manifest_path, &doc)?;
    tracing::info!("removed `{}` from {}", existing, MANIFEST_NAME);
    Ok(RemoveResult {
        name: existing,
        removed_override,
    })
}

fn matches_key(candidate: &str, key: Option<&PackageKey>) -> bool {
    key.is_some_and(|key| candidate.parse::<PackageKey>().ok().as_ref() == Some(key))
}

fn read_document(manifest_path: &Path) -> Result<Value> {
    let content = fs::read_to_string(manifest_path)?;
    let doc: Value = serde_yaml::from_str(&content)
        .map_err(|e| Error::parse(manifest_path.display().to_string(), e.to_string()))?;
    if !doc.is_mapping() {
        return Err(Error::parse(
            manifest_path.display().to_string(),
            "expected a mapping at the top level",
        ));
    }
    Ok(doc)
}

fn section_mut<'a>(doc: &'a mut Value, name: &str, manifest_path: &Path) -> Result<&'a mut Mapping> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| Error::parse(manifest_path.display().to_string(), "expected a mapping"))?;
    let section = root
        .entry(name.into())
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if section.is_null() {
        *section = Value::Mapping(Mapping::new());
    }
    section.as_mapping_mut().ok_or_else(|| {
        Error::config(format!("`{}` in {} must be a mapping", name, manifest_path.display()))
    })
}

fn remove_section(doc: &mut Value, name: &str) {
    if let Some(root) = doc.as_mapping_mut() {
        root.remove(name);
    }
}

/// Validate the edited document as a manifest, then write it atomically.
fn write_document(manifest_path: &Path, doc: &Value) -> Result<()> {
    let content = serde_yaml::to_string(doc)
        .map_err(|e| Error::parse(manifest_path.display().to_string(), e.to_string()))?;
    ProjectManifest::parse(&content, manifest_path)?;
    fs::write_atomic(manifest_path, content.as_bytes())?;
    ManifestCache::global().invalidate(manifest_path);
    Ok(())
}
