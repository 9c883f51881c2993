//! `modelkit audit` and `modelkit compliance`.
//!
//! Audit inspects the lock file and the cache for things worth a second look.
//! Compliance checks the workspace against its own governance policy and
//! always treats package cycles as violations, whatever the install policy.

use std::fmt;

use crate::core::error::{format_cycle, Result};
use crate::core::package_key::PackageKey;
use crate::core::workspace::Workspace;
use crate::resolver::encode::RefType;
use crate::resolver::graph::PackageGraph;
use crate::resolver::policy::{is_prerelease, parse_version, Policy};
use crate::sources::cache::{is_commit_sha, CacheKey, ContentStore, Integrity};
use crate::sources::git::GitFetcher;
use crate::util::diagnostic::Severity;

/// Something audit found about a locked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingKind {
    /// Locked from a branch, which moves
    FloatingBranch { branch: String },
    /// Locked to a pre-release tag
    Prerelease { tag: String },
    /// Not in the cache
    NotCached,
    /// Cache entry no longer matches its recorded digest
    Corrupted,
}

impl FindingKind {
    pub fn severity(&self) -> Severity {
        match self {
            FindingKind::Corrupted => Severity::Error,
            FindingKind::FloatingBranch { .. } | FindingKind::Prerelease { .. } => {
                Severity::Warning
            }
            FindingKind::NotCached => Severity::Note,
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingKind::FloatingBranch { branch } => {
                write!(f, "tracks branch `{}`; `modelkit update` may move it", branch)
            }
            FindingKind::Prerelease { tag } => write!(f, "pinned to pre-release `{}`", tag),
            FindingKind::NotCached => write!(f, "not in the package cache"),
            FindingKind::Corrupted => write!(f, "cache entry is corrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFinding {
    pub key: PackageKey,
    pub kind: FindingKind,
}

#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub packages: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn has_errors(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.kind.severity() == Severity::Error)
    }
}

/// Audit every locked package against the cache.
pub fn audit(ws: &Workspace, store: &dyn ContentStore) -> Result<AuditReport> {
    let lock = ws.load_lock()?;
    let mut report = AuditReport {
        packages: lock.len(),
        findings: Vec::new(),
    };

    for (key, entry) in lock.iter() {
        let mut found = |kind| {
            report.findings.push(AuditFinding {
                key: key.clone(),
                kind,
            })
        };

        let concrete = entry.concrete_ref();
        match entry.ref_type {
            RefType::Branch => found(FindingKind::FloatingBranch {
                branch: concrete.to_string(),
            }),
            RefType::Tag if is_prerelease(concrete) => found(FindingKind::Prerelease {
                tag: concrete.to_string(),
            }),
            _ => {}
        }

        match store.verify(&CacheKey::new(key.clone(), &entry.commit)?)? {
            Integrity::Intact => {}
            Integrity::Missing => found(FindingKind::NotCached),
            Integrity::Corrupt => found(FindingKind::Corrupted),
        }
    }

    Ok(report)
}

/// A governance violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Package not matched by `allowedSources`
    DisallowedSource { key: PackageKey },
    /// Floating, branch, commit or pre-release ref under `requireStableVersions`
    UnstableVersion { key: PackageKey, git_ref: String },
    /// Package-level cycle
    Cycle { cycle: Vec<PackageKey> },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DisallowedSource { key } => {
                write!(f, "{} is not in governance.allowedSources", key)
            }
            Violation::UnstableVersion { key, git_ref } => {
                write!(f, "{}@{} is not a stable release", key, git_ref)
            }
            Violation::Cycle { cycle } => {
                write!(f, "circular package dependency: {}", format_cycle(cycle))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
    pub violations: Vec<Violation>,
}

impl ComplianceReport {
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Whether a declared ref names a stable release.
///
/// `stable` qualifies since it never resolves to a pre-release; `latest`,
/// branches and raw commits do not.
fn is_stable_ref(git_ref: &str, ref_type: Option<RefType>) -> bool {
    match Policy::of(git_ref) {
        Policy::Stable => true,
        Policy::Latest => false,
        Policy::Pinned => {
            !matches!(ref_type, Some(RefType::Branch | RefType::Commit))
                && !is_commit_sha(git_ref)
                && parse_version(git_ref).is_some()
                && !is_prerelease(git_ref)
        }
    }
}

/// Check the workspace against its governance policy.
pub async fn check_compliance(ws: &Workspace, fetcher: &GitFetcher) -> Result<ComplianceReport> {
    let manifest = ws.manifest();
    let governance = manifest.governance();
    let lock = ws.load_lock()?;
    let mut report = ComplianceReport::default();

    let mut keys: Vec<&PackageKey> = lock.iter().map(|(k, _)| k).collect();
    for dep in manifest.git_dependencies() {
        if let Some(key) = dep.package_key() {
            if lock.get(key).is_none() {
                keys.push(key);
            }
        }
    }

    for key in &keys {
        if !governance.allows(key) {
            report
                .violations
                .push(Violation::DisallowedSource { key: (*key).clone() });
        }
    }

    if governance.require_stable_versions {
        for (key, entry) in lock.iter() {
            if !is_stable_ref(&entry.git_ref, Some(entry.ref_type)) {
                report.violations.push(Violation::UnstableVersion {
                    key: key.clone(),
                    git_ref: entry.git_ref.clone(),
                });
            }
        }
        for dep in manifest.git_dependencies() {
            if let Some(key) = dep.package_key().filter(|k| lock.get(k).is_none()) {
                if !is_stable_ref(dep.git_ref(), None) {
                    report.violations.push(Violation::UnstableVersion {
                        key: key.clone(),
                        git_ref: dep.git_ref().to_string(),
                    });
                }
            }
        }
    }

    let graph = PackageGraph::from_lock(ws, &lock, fetcher).await?;
    for cycle in graph.detect_cycles() {
        report.violations.push(Violation::Cycle { cycle });
    }

    Ok(report)
}
