//! Import address classification.
//!
//! An import address is one of three things:
//!
//! - `./x` or `../x`: a file relative to the importing document
//! - `@alias/x`: a file under a path alias declared in the manifest
//! - `owner/repo[@ref]` or `host/owner/repo[@ref]`: an external git package
//!
//! Classification is purely syntactic. Whether an external-shaped address
//! actually names a local file is decided by the loader, which can look.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::error::{Error, Result};
use crate::core::package_key::PackageKey;
use crate::util::fs::join_within;

/// A classified import address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportAddress {
    /// Path relative to the importing document.
    Relative(PathBuf),

    /// Path under a declared alias.
    Alias { alias: String, subpath: PathBuf },

    /// An external package, optionally pinned and aliased.
    External {
        key: PackageKey,
        git_ref: Option<String>,
        alias: Option<String>,
    },
}

impl fmt::Display for ImportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportAddress::Relative(path) => write!(f, "{}", path.display()),
            ImportAddress::Alias { alias, subpath } => {
                write!(f, "{}/{}", alias, subpath.display())
            }
            ImportAddress::External { key, git_ref, .. } => match git_ref {
                Some(r) => write!(f, "{}@{}", key, r),
                None => write!(f, "{}", key),
            },
        }
    }
}

/// Path aliases declared under `paths:` in the manifest.
///
/// Keys are stored without a trailing `/`, sorted longest first so the first
/// match is the longest prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathAliases {
    entries: Vec<(String, PathBuf)>,
}

impl PathAliases {
    /// Build aliases from the manifest `paths:` table, sandboxed to `root`.
    pub fn from_manifest(paths: &BTreeMap<String, String>, root: &Path) -> Result<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for (alias, target) in paths {
            if !alias.starts_with('@') {
                return Err(Error::config(format!(
                    "path alias `{}` must start with `@`",
                    alias
                )));
            }
            let name = alias.trim_end_matches('/');
            if name.len() < 2 {
                return Err(Error::config(format!("path alias `{}` is empty", alias)));
            }
            let resolved = join_within(root, root, Path::new(target)).ok_or_else(|| {
                Error::config(format!(
                    "path alias `{}` target `{}` resolves outside workspace boundary",
                    alias, target
                ))
            })?;
            entries.push((name.to_string(), resolved));
        }
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(PathAliases { entries })
    }

    /// Find the longest alias that prefixes `address`, returning it and the
    /// remaining subpath.
    pub fn match_prefix<'a>(&self, address: &'a str) -> Option<(&str, &'a str)> {
        self.entries.iter().find_map(|(alias, _)| {
            let rest = address.strip_prefix(alias.as_str())?;
            if rest.is_empty() {
                Some((alias.as_str(), rest))
            } else {
                rest.strip_prefix('/').map(|sub| (alias.as_str(), sub))
            }
        })
    }

    /// Resolved target directory for an alias.
    pub fn target(&self, alias: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, target)| target.as_path())
    }

    /// Iterate over `(alias, target)` pairs, longest alias first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(a, t)| (a.as_str(), t.as_path()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify an import address.
///
/// `alias` is the optional binding from `import "..." as Name`; it is only
/// meaningful for external packages and is carried through unchanged.
pub fn classify(address: &str, alias: Option<&str>, aliases: &PathAliases) -> Result<ImportAddress> {
    let address = address.trim();

    if address.starts_with("./") || address.starts_with("../") {
        return Ok(ImportAddress::Relative(PathBuf::from(address)));
    }

    if address.starts_with('@') {
        return match aliases.match_prefix(address) {
            Some((name, subpath)) => Ok(ImportAddress::Alias {
                alias: name.to_string(),
                subpath: PathBuf::from(subpath),
            }),
            None => Err(Error::config_with_help(
                format!("unresolved import `{}`: no matching path alias", address),
                "Declare the alias under `paths:` in model.yaml",
            )),
        };
    }

    let (source, git_ref) = match address.rsplit_once('@') {
        Some((source, r)) if !r.is_empty() && !r.contains('/') => (source, Some(r.to_string())),
        Some(_) => {
            return Err(Error::config(format!(
                "unresolved import `{}`: empty or malformed ref",
                address
            )))
        }
        None => (address, None),
    };

    match source.parse::<PackageKey>() {
        Ok(key) => Ok(ImportAddress::External {
            key,
            git_ref,
            alias: alias.map(str::to_string),
        }),
        Err(_) => Err(Error::config(format!(
            "unresolved import `{}`: expected `./path`, `@alias/path` or `owner/repo[@ref]`",
            address
        ))),
    }
}
