//! Command implementations

pub mod add;
pub mod audit;
pub mod cache;
pub mod compliance;
pub mod init;
pub mod install;
pub mod list;
pub mod remove;
pub mod status;
pub mod tree;
pub mod update;
pub mod validate;
pub mod why;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use crate::cli::CycleArg;
use modelkit::ops::InstallReport;
use modelkit::util::CyclePolicy;
use modelkit::{GlobalContext, PackageKey, Workspace};

/// Runtime for the async library calls of one command.
pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

/// The workspace containing the current directory.
pub fn workspace(ctx: &GlobalContext) -> Result<Workspace> {
    Ok(Workspace::require(ctx.cwd())?)
}

pub fn parse_key(s: &str) -> Result<PackageKey> {
    Ok(s.parse::<PackageKey>()?)
}

/// The cycle policy from the command line, else from config.toml.
pub fn cycle_policy(ctx: &GlobalContext, arg: Option<CycleArg>) -> CyclePolicy {
    match arg {
        Some(CycleArg::Error) => CyclePolicy::Error,
        Some(CycleArg::Warn) => CyclePolicy::Warn,
        None => ctx.config().resolve.cycle_policy,
    }
}

/// Print a right-aligned status line to stderr.
pub fn status(verb: &str, message: impl std::fmt::Display) {
    eprintln!("{:>12} {}", verb, message);
}

/// Print what an install or update did.
pub fn print_install_report(ctx: &GlobalContext, report: &InstallReport) {
    use modelkit::ops::EntryAction;

    for package in &report.packages {
        match (package.action, &package.previous_commit) {
            (EntryAction::Reused, _) if ctx.is_verbose() => status(
                "Fresh",
                format!("{}@{} ({})", package.key, package.entry.git_ref, package.entry.short_commit()),
            ),
            (EntryAction::Reused, _) => {}
            (EntryAction::Added, _) => status(
                "Locking",
                format!("{}@{} ({})", package.key, package.entry.git_ref, package.entry.short_commit()),
            ),
            (EntryAction::Updated, Some(old)) => status(
                "Updating",
                format!(
                    "{}@{} {} -> {}",
                    package.key,
                    package.entry.git_ref,
                    modelkit::resolver::encode::short_commit(old),
                    package.entry.short_commit()
                ),
            ),
            (EntryAction::Updated, None) => status(
                "Unchanged",
                format!("{}@{} ({})", package.key, package.entry.git_ref, package.entry.short_commit()),
            ),
        }
    }
    for conflict in &report.conflicts {
        status(
            "Conflict",
            format!(
                "{} wants {}@{}, keeping `{}`",
                conflict.declared_by, conflict.key, conflict.ignored, conflict.kept
            ),
        );
    }
    for key in &report.pruned {
        status("Removing", key);
    }

    let summary = format!(
        "{} packages ({} reused)",
        report.packages.len(),
        report.count(EntryAction::Reused)
    );
    if report.lock_written {
        status("Locked", summary);
    } else {
        status("Finished", format!("{}, model.lock unchanged", summary));
    }
}
