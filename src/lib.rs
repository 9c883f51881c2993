//! modelkit - module resolution and package management for domain models
//!
//! This crate provides the core library functionality for modelkit:
//! classifying import addresses, resolving git-hosted model packages to
//! commits, caching them by content, writing the lock file, and loading a
//! workspace's document graph.

pub mod core;
pub mod loader;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities and mocks for modelkit unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides a scripted git remote and workspace fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{
    error::{Error, Result},
    manifest::ProjectManifest,
    package_key::PackageKey,
    workspace::Workspace,
};

pub use loader::ImportLoader;
pub use resolver::{LockFile, PackageGraph};
pub use sources::GitFetcher;
pub use util::context::GlobalContext;
