//! Implementation of `modelkit install` and `modelkit update`.
//!
//! Install walks the package graph breadth-first from the workspace's git
//! dependencies. A package whose lock entry still carries the declared ref
//! keeps its locked commit and needs no network access; anything else is
//! resolved against the remote. The lock is then rewritten to hold exactly
//! the reachable packages, and left untouched when nothing changed.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};

use crate::core::error::{format_cycle, Error, Result};
use crate::core::manifest::ProjectManifest;
use crate::core::package_key::PackageKey;
use crate::core::workspace::Workspace;
use crate::resolver::encode::{LockEntry, LockFile};
use crate::resolver::graph::{path_dependency_manifests, PackageGraph};
use crate::sources::git::GitFetcher;
use crate::util::config::CyclePolicy;
use crate::util::diagnostic::suggestions;

/// Which packages to re-resolve even when their lock entry is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UpdateSelection {
    /// Reuse every current lock entry
    #[default]
    None,
    /// Re-resolve everything
    All,
    /// Re-resolve only these packages
    Packages(Vec<PackageKey>),
}

impl UpdateSelection {
    fn includes(&self, key: &PackageKey) -> bool {
        match self {
            UpdateSelection::None => false,
            UpdateSelection::All => true,
            UpdateSelection::Packages(keys) => keys.contains(key),
        }
    }
}

/// Options for install.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub update: UpdateSelection,
    pub cycle_policy: CyclePolicy,
}

/// What install did with a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    /// Locked commit reused without network access
    Reused,
    /// Not locked before
    Added,
    /// Locked before, resolved again
    Updated,
}

/// One package in the installed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub key: PackageKey,
    pub entry: LockEntry,
    pub action: EntryAction,
    /// Commit previously locked, when it changed
    pub previous_commit: Option<String>,
}

/// Two declarations of one package with different refs.
///
/// The first declaration reached breadth-first wins, so the workspace's own
/// declarations always beat transitive ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefConflict {
    pub key: PackageKey,
    pub kept: String,
    pub ignored: String,
    /// Package whose declaration was ignored
    pub declared_by: PackageKey,
}

/// Outcome of an install.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// Installed packages, sorted by key
    pub packages: Vec<InstalledPackage>,
    pub conflicts: Vec<RefConflict>,
    /// Cycles found, only non-empty under [`CyclePolicy::Warn`]
    pub cycles: Vec<Vec<PackageKey>>,
    /// Lock entries dropped because nothing reaches them any more
    pub pruned: Vec<PackageKey>,
    /// Whether model.lock was written
    pub lock_written: bool,
}

impl InstallReport {
    pub fn count(&self, action: EntryAction) -> usize {
        self.packages.iter().filter(|p| p.action == action).count()
    }
}

static WORKSPACE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The async mutex serializing lock-file mutations in one workspace.
fn workspace_lock(ws: &Workspace) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = WORKSPACE_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(locks.entry(ws.lockfile_path()).or_default())
}

/// Resolve, fetch and lock the workspace's dependency graph.
pub async fn install(
    ws: &Workspace,
    fetcher: &GitFetcher,
    opts: &InstallOptions,
) -> Result<InstallReport> {
    let lock_mutex = workspace_lock(ws);
    let _guard = lock_mutex.lock().await;

    let manifest = ws.manifest();
    let locals = path_dependency_manifests(manifest)?;
    check_allowed_sources(manifest, &locals)?;

    let previous = ws.load_lock()?;
    let mut lock = LockFile::new();
    let mut graph = PackageGraph::new();
    let mut report = InstallReport::default();

    let mut chosen: HashMap<PackageKey, String> = HashMap::new();
    let mut queue: VecDeque<(PackageKey, String, Option<PackageKey>)> = VecDeque::new();

    let declared_roots = manifest
        .git_dependencies()
        .chain(locals.iter().flat_map(|(_, m)| m.git_dependencies()));
    for dep in declared_roots {
        if let Some(key) = dep.package_key() {
            let git_ref = manifest.effective_ref(key, dep.git_ref());
            graph.add_root(key, &git_ref);
            queue.push_back((key.clone(), git_ref, None));
        }
    }

    while let Some((key, git_ref, declared_by)) = queue.pop_front() {
        if let Some(kept) = chosen.get(&key) {
            if kept != &git_ref {
                tracing::debug!("{}: keeping `{}`, ignoring `{}`", key, kept, git_ref);
                report.conflicts.push(RefConflict {
                    key: key.clone(),
                    kept: kept.clone(),
                    ignored: git_ref,
                    declared_by: declared_by.unwrap_or_else(|| key.clone()),
                });
            }
            continue;
        }
        chosen.insert(key.clone(), git_ref.clone());

        if !manifest.governance().allows(&key) {
            return Err(disallowed(&key, declared_by.as_ref()));
        }

        let locked = previous.get(&key);
        let (entry, action) = match locked {
            Some(entry) if entry.git_ref == git_ref && !opts.update.includes(&key) => {
                tracing::trace!("{}@{} locked at {}", key, git_ref, entry.short_commit());
                (entry.clone(), EntryAction::Reused)
            }
            _ => {
                let resolved = fetcher.resolve_commit(&key, &git_ref).await?;
                let entry = LockEntry {
                    resolved_ref: Some(resolved.git_ref).filter(|r| *r != git_ref),
                    git_ref: git_ref.clone(),
                    ref_type: resolved.ref_type,
                    resolved: resolved.resolved_url,
                    commit: resolved.commit,
                };
                let action = if locked.is_some() {
                    EntryAction::Updated
                } else {
                    EntryAction::Added
                };
                tracing::info!("resolved {}@{} to {}", key, git_ref, entry.short_commit());
                (entry, action)
            }
        };

        let package_manifest = fetcher.package_manifest(&key, &entry.commit).await?;
        graph.add_package(&key);
        if let Some(package_manifest) = package_manifest {
            for dep in package_manifest.git_dependencies() {
                if let Some(dep_key) = dep.package_key() {
                    let dep_ref = manifest.effective_ref(dep_key, dep.git_ref());
                    graph.add_edge(&key, dep_key, &dep_ref);
                    queue.push_back((dep_key.clone(), dep_ref, Some(key.clone())));
                }
            }
        }

        let previous_commit = locked
            .filter(|old| old.commit != entry.commit)
            .map(|old| old.commit.clone());
        lock.insert(key.clone(), entry.clone());
        report.packages.push(InstalledPackage {
            key,
            entry,
            action,
            previous_commit,
        });
    }

    let cycles = graph.detect_cycles();
    if !cycles.is_empty() {
        match opts.cycle_policy {
            CyclePolicy::Error => return Err(Error::Cycle { cycles }),
            CyclePolicy::Warn => {
                for cycle in &cycles {
                    tracing::warn!("circular package dependency: {}", format_cycle(cycle));
                }
                report.cycles = cycles;
            }
        }
    }

    report.pruned = previous
        .iter()
        .map(|(key, _)| key)
        .filter(|key| lock.get(key).is_none())
        .cloned()
        .collect();
    for key in &report.pruned {
        tracing::info!("pruned {} from {}", key, crate::resolver::LOCKFILE_NAME);
    }

    report.lock_written = lock.save(&ws.lockfile_path())?;

    report.packages.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(report)
}

/// Re-resolve every package, or just the named ones.
pub async fn update(
    ws: &Workspace,
    fetcher: &GitFetcher,
    packages: &[PackageKey],
    cycle_policy: CyclePolicy,
) -> Result<InstallReport> {
    let update = if packages.is_empty() {
        UpdateSelection::All
    } else {
        let lock = ws.load_lock()?;
        for key in packages {
            if lock.get(key).is_none() && ws.manifest().dependency_for(key).is_none() {
                return Err(Error::not_found_with_help(
                    "package",
                    key.to_string(),
                    suggestions::PACKAGE_NOT_FOUND,
                ));
            }
        }
        UpdateSelection::Packages(packages.to_vec())
    };

    install(
        ws,
        fetcher,
        &InstallOptions {
            update,
            cycle_policy,
        },
    )
    .await
}

/// Reject disallowed direct dependencies before any network access.
fn check_allowed_sources(
    manifest: &ProjectManifest,
    locals: &[(String, ProjectManifest)],
) -> Result<()> {
    let governance = manifest.governance();
    let declared = manifest
        .git_dependencies()
        .chain(locals.iter().flat_map(|(_, m)| m.git_dependencies()));
    for dep in declared {
        if let Some(key) = dep.package_key() {
            if !governance.allows(key) {
                return Err(disallowed(key, None));
            }
        }
    }
    Ok(())
}

fn disallowed(key: &PackageKey, declared_by: Option<&PackageKey>) -> Error {
    let via = declared_by
        .map(|parent| format!(" (required by {})", parent))
        .unwrap_or_default();
    Error::config_with_help(
        format!("package `{}`{} is not in governance.allowedSources", key, via),
        "Add a matching pattern to `governance.allowedSources` in model.yaml",
    )
}
