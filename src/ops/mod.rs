//! High-level operations.
//!
//! This module contains the implementation of modelkit commands. Each
//! operation takes a [`Workspace`](crate::Workspace) and, where it needs
//! packages, a [`GitFetcher`](crate::GitFetcher) or a content store.

pub mod add;
pub mod audit;
pub mod cache;
pub mod init;
pub mod install;
pub mod query;
pub mod validate;

pub use add::{add_dependency, remove_dependency, AddOptions, AddResult, RemoveResult};
pub use audit::{
    audit, check_compliance, AuditFinding, AuditReport, ComplianceReport, FindingKind, Violation,
};
pub use cache::{cached_entries, clear_cache};
pub use init::init_project;
pub use install::{
    install, update, EntryAction, InstallOptions, InstallReport, InstalledPackage, RefConflict,
    UpdateSelection,
};
pub use query::{list, render_tree, status, tree, why, DependencyState, DependencyStatus};
pub use validate::{validate, CheckResult, ValidationReport};
