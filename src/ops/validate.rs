//! Workspace health checks for `modelkit validate`.
//!
//! Checks run in order and later checks are skipped when an earlier one makes
//! them meaningless: the import graph is only loaded once the lock file is
//! known to be current.

use std::sync::Arc;

use crate::core::error::Result;
use crate::core::workspace::Workspace;
use crate::loader::{ImportLoader, ImportScanner};
use crate::resolver::graph::path_dependency_manifests;
use crate::sources::git::GitFetcher;
use crate::util::diagnostic::Diagnostic;

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Details for a failed check
    pub diagnostic: Option<Diagnostic>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            diagnostic: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, diagnostic: Diagnostic) -> Self {
        CheckResult {
            name: name.into(),
            passed: false,
            message: diagnostic.message.clone(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// Summary of all checks.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    /// Documents loaded, when the import graph was checked
    pub documents: Option<usize>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Validate the workspace: manifest, entry file, lock freshness, imports.
///
/// Reaching this point means model.yaml parsed, so the manifest check always
/// passes; problems are reported as failed checks rather than errors.
pub async fn validate(ws: &Workspace, fetcher: Arc<GitFetcher>) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    let manifest = ws.manifest();

    report.checks.push(CheckResult::pass(
        "manifest",
        format!("{} is valid", manifest.manifest_path().display()),
    ));

    let entry = ws.entry_path();
    let entry_ok = entry.is_file();
    if entry_ok {
        report
            .checks
            .push(CheckResult::pass("entry", format!("{} exists", manifest.entry())));
    } else {
        report.checks.push(CheckResult::fail(
            "entry",
            Diagnostic::error(format!("entry file `{}` does not exist", manifest.entry()))
                .with_location(entry.clone())
                .with_suggestion("Create the file or set `model.entry` in model.yaml"),
        ));
    }

    let lock_check = check_lock(ws)?;
    let lock_ok = lock_check.passed;
    report.checks.push(lock_check);

    if entry_ok && lock_ok {
        let loader = ImportLoader::for_workspace(ws, ImportScanner, fetcher)?;
        match loader.load(&entry).await {
            Ok(result) => {
                report.documents = Some(result.len());
                report.checks.push(CheckResult::pass(
                    "imports",
                    format!("{} documents loaded", result.len()),
                ));
            }
            Err(e) => report.checks.push(CheckResult::fail("imports", e.to_diagnostic())),
        }
    }

    Ok(report)
}

/// Every declared git dependency must be locked at its declared ref.
fn check_lock(ws: &Workspace) -> Result<CheckResult> {
    let manifest = ws.manifest();
    let lock = ws.load_lock()?;
    let locals = path_dependency_manifests(manifest)?;

    let mut stale = Vec::new();
    let declared = manifest
        .git_dependencies()
        .chain(locals.iter().flat_map(|(_, m)| m.git_dependencies()));
    for dep in declared {
        let Some(key) = dep.package_key() else {
            continue;
        };
        let wanted = manifest.effective_ref(key, dep.git_ref());
        match lock.get(key) {
            None => stale.push(format!("{} is not locked", key)),
            Some(entry) if entry.git_ref != wanted => stale.push(format!(
                "{} is locked at `{}` but model.yaml declares `{}`",
                key, entry.git_ref, wanted
            )),
            Some(_) => {}
        }
    }

    if stale.is_empty() {
        return Ok(CheckResult::pass("lock", format!("{} packages locked", lock.len())));
    }
    let mut diag = Diagnostic::error("model.lock is out of date");
    for line in stale {
        diag = diag.with_context(line);
    }
    Ok(CheckResult::fail(
        "lock",
        diag.with_suggestion(crate::util::diagnostic::suggestions::STALE_LOCK),
    ))
}
