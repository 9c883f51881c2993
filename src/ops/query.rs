//! Read-only workspace queries: `list`, `status`, `tree` and `why`.

use std::fmt;
use std::path::PathBuf;

use crate::core::dependency::DependencySource;
use crate::core::error::Result;
use crate::core::package_key::PackageKey;
use crate::core::workspace::Workspace;
use crate::resolver::encode::{short_commit, LockEntry};
use crate::resolver::graph::{
    build_tree, find_reverse_dependencies, DependencyTreeNode, PackageGraph, ReverseDependency,
};
use crate::sources::cache::{CacheKey, ContentStore};
use crate::sources::git::GitFetcher;

/// Locked packages, sorted by key.
pub fn list(ws: &Workspace) -> Result<Vec<(PackageKey, LockEntry)>> {
    let lock = ws.load_lock()?;
    Ok(lock.iter().map(|(k, e)| (k.clone(), e.clone())).collect())
}

/// State of one direct dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    /// Locked at the declared ref and present in the cache
    Locked { commit: String },
    /// model.yaml asks for a different ref than model.lock holds
    RefChanged { locked: String, declared: String },
    /// Declared but not in model.lock
    NotLocked,
    /// Locked, but the cache entry is missing
    NotCached { commit: String },
    /// A local path dependency
    Path { path: PathBuf, exists: bool },
}

impl DependencyState {
    /// Whether install would have nothing to do for this dependency.
    pub fn is_current(&self) -> bool {
        match self {
            DependencyState::Locked { .. } => true,
            DependencyState::Path { exists, .. } => *exists,
            _ => false,
        }
    }
}

impl fmt::Display for DependencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyState::Locked { commit } => write!(f, "locked at {}", short_commit(commit)),
            DependencyState::RefChanged { locked, declared } => {
                write!(f, "ref changed: locked `{}`, declared `{}`", locked, declared)
            }
            DependencyState::NotLocked => write!(f, "not locked"),
            DependencyState::NotCached { commit } => {
                write!(f, "locked at {}, not cached", short_commit(commit))
            }
            DependencyState::Path { path, exists: true } => write!(f, "path {}", path.display()),
            DependencyState::Path { path, exists: false } => {
                write!(f, "path {} (missing)", path.display())
            }
        }
    }
}

/// Status of one direct dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyStatus {
    pub name: String,
    pub declared_ref: Option<String>,
    pub state: DependencyState,
}

/// Compare model.yaml, model.lock and the cache for each direct dependency.
pub fn status(ws: &Workspace, store: &dyn ContentStore) -> Result<Vec<DependencyStatus>> {
    let manifest = ws.manifest();
    let lock = ws.load_lock()?;

    let mut out = Vec::new();
    for dep in manifest.dependencies() {
        let status = match dep.source() {
            DependencySource::Path(path) => DependencyStatus {
                name: dep.name().to_string(),
                declared_ref: None,
                state: DependencyState::Path {
                    path: path.clone(),
                    exists: path.is_dir(),
                },
            },
            DependencySource::Git(key) => {
                let declared = manifest.effective_ref(key, dep.git_ref());
                let state = match lock.get(key) {
                    None => DependencyState::NotLocked,
                    Some(entry) if entry.git_ref != declared => DependencyState::RefChanged {
                        locked: entry.git_ref.clone(),
                        declared: declared.clone(),
                    },
                    Some(entry) => {
                        let cached = CacheKey::new(key.clone(), &entry.commit)
                            .map(|k| store.has(&k))
                            .unwrap_or(false);
                        if cached {
                            DependencyState::Locked {
                                commit: entry.commit.clone(),
                            }
                        } else {
                            DependencyState::NotCached {
                                commit: entry.commit.clone(),
                            }
                        }
                    }
                };
                DependencyStatus {
                    name: dep.name().to_string(),
                    declared_ref: Some(declared),
                    state,
                }
            }
        };
        out.push(status);
    }
    Ok(out)
}

/// The workspace's dependency tree, built from model.lock.
pub async fn tree(ws: &Workspace, fetcher: &GitFetcher) -> Result<Vec<DependencyTreeNode>> {
    let lock = ws.load_lock()?;
    let graph = PackageGraph::from_lock(ws, &lock, fetcher).await?;
    Ok(build_tree(&graph, &lock))
}

/// Render tree nodes with box-drawing guides.
///
/// ```text
/// acme/core@v1.0.0 (abc1234)
/// ├── acme/units@v2 (def5678)
/// └── acme/money@main (0123abc)
/// ```
pub fn render_tree(nodes: &[DependencyTreeNode], max_depth: Option<usize>) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(node, "", None, max_depth, &mut out);
    }
    out
}

fn render_node(
    node: &DependencyTreeNode,
    prefix: &str,
    last: Option<bool>,
    max_depth: Option<usize>,
    out: &mut String,
) {
    let connector = match last {
        None => "",
        Some(true) => "└── ",
        Some(false) => "├── ",
    };
    let commit = node
        .commit
        .as_deref()
        .map(|c| format!(" ({})", short_commit(c)))
        .unwrap_or_else(|| " (not locked)".to_string());
    let repeated = if node.repeated { " (*)" } else { "" };
    let resolved = node
        .resolved_ref
        .as_deref()
        .map(|r| format!(" -> {}", r))
        .unwrap_or_default();
    out.push_str(&format!(
        "{}{}{}@{}{}{}{}\n",
        prefix, connector, node.key, node.git_ref, resolved, commit, repeated
    ));

    if max_depth.is_some_and(|max| node.depth >= max) {
        return;
    }

    let child_prefix = match last {
        None => prefix.to_string(),
        Some(true) => format!("{}    ", prefix),
        Some(false) => format!("{}│   ", prefix),
    };
    for (i, child) in node.children.iter().enumerate() {
        let is_last = i + 1 == node.children.len();
        render_node(child, &child_prefix, Some(is_last), max_depth, out);
    }
}

/// Who depends on `target`.
pub async fn why(
    ws: &Workspace,
    fetcher: &GitFetcher,
    target: &PackageKey,
) -> Result<Vec<ReverseDependency>> {
    let lock = ws.load_lock()?;
    let graph = PackageGraph::from_lock(ws, &lock, fetcher).await?;
    find_reverse_dependencies(target, ws.manifest(), &graph)
}
