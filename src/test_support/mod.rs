//! Test utilities and mocks for modelkit unit tests.
//!
//! [`MockRemote`] stands in for a git host: packages are registered with
//! their refs and trees, and every call is counted so tests can assert how
//! much network traffic an operation caused.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelkit::test_support::{commit_id, MockRemote};
//!
//! let remote = Arc::new(MockRemote::new());
//! remote.add_package(&key, &[RemoteRef::tag("v1.0.0", commit_id(1))], "model:\n  name: core\n");
//! ```

pub mod fixtures;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::package_key::PackageKey;
use crate::sources::cache::PackageTree;
use crate::sources::remote::{GitRemote, RemoteRef};

pub use fixtures::*;

/// A deterministic 40-hex commit id for fixture number `n`.
pub fn commit_id(n: u32) -> String {
    format!("{:040x}", n)
}

#[derive(Debug, Default)]
struct MockPackage {
    refs: Vec<RemoteRef>,
    trees: HashMap<String, PackageTree>,
}

/// Scripted git remote.
#[derive(Debug, Default)]
pub struct MockRemote {
    packages: Mutex<HashMap<String, MockPackage>>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    failures: AtomicUsize,
    denials: AtomicUsize,
    fetch_delay: Mutex<Duration>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package whose every ref points at a tree holding `manifest`.
    pub fn add_package(&self, key: &PackageKey, refs: &[RemoteRef], manifest: &str) {
        let mut packages = self.packages.lock().unwrap();
        let package = packages.entry(key.url()).or_default();
        for r in refs {
            let tree = PackageTree::new()
                .with_file("model.yaml", manifest)
                .unwrap();
            package.trees.entry(r.commit.clone()).or_insert(tree);
        }
        package.refs.extend(refs.iter().cloned());
    }

    /// Register (or replace) the tree at one commit.
    pub fn add_tree(&self, key: &PackageKey, commit: &str, tree: PackageTree) {
        let mut packages = self.packages.lock().unwrap();
        packages
            .entry(key.url())
            .or_default()
            .trees
            .insert(commit.to_string(), tree);
    }

    /// Make the next `n` calls fail with a transient network error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls fail as if credentials were rejected.
    pub fn deny_next(&self, n: usize) {
        self.denials.store(n, Ordering::SeqCst);
    }

    /// Delay every `fetch_tree` call.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Total remote round trips.
    pub fn network_calls(&self) -> usize {
        self.list_calls() + self.fetch_calls()
    }

    fn injected_failure(&self, url: &str) -> Result<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::network(url, "connection reset"));
        }
        let denied = self
            .denials
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if denied {
            return Err(Error::network_permanent(url, "authentication required"));
        }
        Ok(())
    }
}

#[async_trait]
impl GitRemote for MockRemote {
    async fn list_refs(&self, url: &str) -> Result<Vec<RemoteRef>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure(url)?;
        let packages = self.packages.lock().unwrap();
        packages
            .get(url)
            .map(|p| p.refs.clone())
            .ok_or_else(|| Error::network_permanent(url, "repository not found"))
    }

    async fn fetch_tree(&self, url: &str, commit: &str) -> Result<PackageTree> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.injected_failure(url)?;
        let packages = self.packages.lock().unwrap();
        let package = packages
            .get(url)
            .ok_or_else(|| Error::network_permanent(url, "repository not found"))?;
        package
            .trees
            .get(commit)
            .cloned()
            .ok_or_else(|| Error::config(format!("commit `{}` not found in {}", commit, url)))
    }
}
