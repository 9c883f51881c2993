//! Git package fetcher.
//!
//! Resolves declared refs to commits and materializes package trees into the
//! content store. Ref lists are fetched at most once per package per process,
//! and concurrent materializations of the same (package, commit) share one
//! fetch.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::OnceCell;

use crate::core::error::{Error, Result};
use crate::core::manifest::{ProjectManifest, MANIFEST_NAME};
use crate::core::package_key::PackageKey;
use crate::resolver::encode::RefType;
use crate::resolver::policy::{resolve_policy, Policy};
use crate::sources::cache::{is_commit_sha, CacheKey, ContentStore};
use crate::sources::remote::{GitRemote, RemoteRef};
use crate::util::config::NetConfig;

/// A declared ref pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Concrete ref the declaration resolved to (`stable` -> `v1.2.0`)
    pub git_ref: String,
    pub ref_type: RefType,
    pub commit: String,
    pub resolved_url: String,
}

/// Retry policy for transient network failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&NetConfig::default())
    }
}

impl From<&NetConfig> for RetryPolicy {
    fn from(net: &NetConfig) -> Self {
        RetryPolicy {
            retries: net.retries,
            initial_backoff: Duration::from_millis(net.initial_backoff_ms),
            max_backoff: Duration::from_millis(net.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// No retries; used by tests that script failures.
    pub fn none() -> Self {
        RetryPolicy {
            retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            current_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

type RefList = Arc<Vec<RemoteRef>>;

/// Fetches packages from git remotes into a content store.
pub struct GitFetcher {
    remote: Arc<dyn GitRemote>,
    store: Arc<dyn ContentStore>,
    retry: RetryPolicy,
    ref_lists: Mutex<HashMap<PackageKey, Arc<OnceCell<RefList>>>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitFetcher {
    pub fn new(remote: Arc<dyn GitRemote>, store: Arc<dyn ContentStore>) -> Self {
        GitFetcher {
            remote,
            store,
            retry: RetryPolicy::default(),
            ref_lists: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Resolve a declared ref (tag, branch, commit, `latest`, `stable`) to a commit.
    pub async fn resolve_commit(&self, key: &PackageKey, declared: &str) -> Result<ResolvedRef> {
        let resolved_url = key.url();

        if is_commit_sha(declared) {
            tracing::debug!("{}@{} is a commit, no lookup needed", key, declared);
            return Ok(ResolvedRef {
                git_ref: declared.to_string(),
                ref_type: RefType::Commit,
                commit: declared.to_ascii_lowercase(),
                resolved_url,
            });
        }

        let refs = self.list_refs(key).await?;
        let concrete = if Policy::of(declared).is_floating() {
            resolve_policy(declared, &tag_names(&refs)).git_ref
        } else {
            declared.to_string()
        };

        let found = refs
            .iter()
            .find(|r| r.kind == RefType::Tag && r.name == concrete)
            .or_else(|| refs.iter().find(|r| r.name == concrete));

        match found {
            Some(r) => {
                tracing::debug!("{}@{} -> {} ({})", key, declared, r.commit, r.kind);
                Ok(ResolvedRef {
                    git_ref: r.name.clone(),
                    ref_type: r.kind,
                    commit: r.commit.clone(),
                    resolved_url,
                })
            }
            None => {
                let mut available = tag_names(&refs);
                available.truncate(10);
                Err(Error::config_with_help(
                    format!("ref `{}` not found in `{}`", concrete, key),
                    if available.is_empty() {
                        "The remote advertises no tags".to_string()
                    } else {
                        format!("Available tags: {}", available.join(", "))
                    },
                ))
            }
        }
    }

    /// Tags advertised by a package, newest semantic version first.
    pub async fn available_refs(&self, key: &PackageKey) -> Result<Vec<String>> {
        let refs = self.list_refs(key).await?;
        Ok(resolve_policy("latest", &tag_names(&refs)).available_refs)
    }

    async fn list_refs(&self, key: &PackageKey) -> Result<RefList> {
        let cell = {
            let mut lists = self.ref_lists.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(lists.entry(key.clone()).or_default())
        };
        let refs = cell
            .get_or_try_init(|| async {
                let url = key.url();
                let refs = self
                    .retrying(key, || self.remote.list_refs(&url))
                    .await
                    .map_err(|e| relabel(e, key))?;
                Ok::<_, Error>(Arc::new(refs))
            })
            .await?;
        Ok(Arc::clone(refs))
    }

    /// Materialize a package at a commit, returning its store location.
    ///
    /// An existing entry is reused without network access.
    pub async fn materialize(&self, key: &PackageKey, commit: &str) -> Result<PathBuf> {
        let cache_key = CacheKey::new(key.clone(), commit)?;
        if self.store.has(&cache_key) {
            tracing::trace!("cache hit for {}", cache_key);
            return Ok(self.store.path(&cache_key));
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(in_flight.entry(cache_key.clone()).or_default())
        };

        let result = {
            let _guard = gate.lock().await;
            self.materialize_locked(&cache_key).await
        };

        // Only drop the gate this call waited on; a newer one may have replaced it.
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if in_flight
            .get(&cache_key)
            .is_some_and(|current| Arc::ptr_eq(current, &gate))
        {
            in_flight.remove(&cache_key);
        }
        drop(in_flight);

        result
    }

    async fn materialize_locked(&self, cache_key: &CacheKey) -> Result<PathBuf> {
        // A previous holder of the gate may have finished the job.
        if self.store.has(cache_key) {
            return Ok(self.store.path(cache_key));
        }

        let key = cache_key.package();
        let url = key.url();
        let tree = self
            .retrying(key, || self.remote.fetch_tree(&url, cache_key.commit()))
            .await
            .map_err(|e| relabel(e, key))?;

        if tree.get(MANIFEST_NAME).is_none() {
            tracing::debug!("{} has no {}", cache_key, MANIFEST_NAME);
        }

        let store = Arc::clone(&self.store);
        let owned_key = cache_key.clone();
        tokio::task::spawn_blocking(move || store.materialize(&owned_key, &tree))
            .await
            .map_err(|e| Error::network_permanent(key, e.to_string()))?
    }

    /// Read a materialized package's manifest, if it has one.
    pub fn read_manifest(&self, key: &PackageKey, commit: &str) -> Result<Option<ProjectManifest>> {
        let cache_key = CacheKey::new(key.clone(), commit)?;
        let Some(bytes) = self.store.read_file(&cache_key, MANIFEST_NAME)? else {
            return Ok(None);
        };
        let root = self.store.path(&cache_key);
        let text = String::from_utf8(bytes).map_err(|e| {
            Error::parse(format!("{} in {}", MANIFEST_NAME, cache_key), e.to_string())
        })?;
        ProjectManifest::parse(&text, &root.join(MANIFEST_NAME)).map(Some)
    }

    /// Materialize and then read a package's manifest.
    pub async fn package_manifest(
        &self,
        key: &PackageKey,
        commit: &str,
    ) -> Result<Option<ProjectManifest>> {
        self.materialize(key, commit).await?;
        self.read_manifest(key, commit)
    }

    async fn retrying<T, F, Fut>(&self, key: &PackageKey, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.retry.backoff();
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.retry.max_backoff);
                    tracing::debug!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        key,
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn tag_names(refs: &[RemoteRef]) -> Vec<String> {
    refs.iter()
        .filter(|r| r.kind == RefType::Tag)
        .map(|r| r.name.clone())
        .collect()
}

/// Report network failures against the package rather than its URL.
fn relabel(err: Error, key: &PackageKey) -> Error {
    match err {
        Error::Network {
            message, transient, ..
        } => Error::Network {
            package: key.to_string(),
            message,
            transient,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::cache::MemoryStore;
    use crate::test_support::{commit_id, MockRemote};

    fn fetcher(remote: &Arc<MockRemote>) -> GitFetcher {
        GitFetcher::new(remote.clone(), Arc::new(MemoryStore::new())).with_retry(RetryPolicy::none())
    }

    fn core() -> PackageKey {
        "acme/core".parse().unwrap()
    }

    fn remote_with_tags() -> Arc<MockRemote> {
        let remote = Arc::new(MockRemote::new());
        remote.add_package(
            &core(),
            &[
                RemoteRef::tag("v1.0.0", commit_id(1)),
                RemoteRef::tag("v1.1.0", commit_id(2)),
                RemoteRef::tag("v2.0.0-beta", commit_id(3)),
                RemoteRef::branch("main", commit_id(4)),
            ],
            "model:\n  name: core\n",
        );
        remote
    }

    #[tokio::test]
    async fn test_resolve_tag_branch_and_policies() {
        let remote = remote_with_tags();
        let fetcher = fetcher(&remote);

        let tag = fetcher.resolve_commit(&core(), "v1.0.0").await.unwrap();
        assert_eq!(tag.ref_type, RefType::Tag);
        assert_eq!(tag.commit, commit_id(1));
        assert_eq!(tag.resolved_url, "https://github.com/acme/core.git");

        let branch = fetcher.resolve_commit(&core(), "main").await.unwrap();
        assert_eq!(branch.ref_type, RefType::Branch);

        let stable = fetcher.resolve_commit(&core(), "stable").await.unwrap();
        assert_eq!(stable.git_ref, "v1.1.0");

        let latest = fetcher.resolve_commit(&core(), "latest").await.unwrap();
        assert_eq!(latest.git_ref, "v2.0.0-beta");

        // All of the above shared one ref listing.
        assert_eq!(remote.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_commit_sha_needs_no_lookup() {
        let remote = remote_with_tags();
        let fetcher = fetcher(&remote);
        let resolved = fetcher.resolve_commit(&core(), &commit_id(9)).await.unwrap();
        assert_eq!(resolved.ref_type, RefType::Commit);
        assert_eq!(remote.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_ref_is_config_error() {
        let remote = remote_with_tags();
        let err = fetcher(&remote)
            .resolve_commit(&core(), "v9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_network_error() {
        let remote = Arc::new(MockRemote::new());
        let err = fetcher(&remote)
            .resolve_commit(&core(), "v1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.to_string().contains("acme/core"));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let remote = remote_with_tags();
        remote.fail_next(2);
        let fetcher = GitFetcher::new(remote.clone(), Arc::new(MemoryStore::new())).with_retry(
            RetryPolicy {
                retries: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        );
        fetcher.resolve_commit(&core(), "v1.0.0").await.unwrap();
        assert_eq!(remote.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_not_retried() {
        let remote = remote_with_tags();
        remote.deny_next(1);
        let fetcher = GitFetcher::new(remote.clone(), Arc::new(MemoryStore::new())).with_retry(
            RetryPolicy {
                retries: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        );
        let err = fetcher.resolve_commit(&core(), "v1.0.0").await.unwrap_err();
        assert!(matches!(err, Error::Network { transient: false, .. }));
        assert!(err.to_string().contains("acme/core"));
        assert_eq!(remote.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_materialize_twice_fetches_once() {
        let remote = remote_with_tags();
        let fetcher = fetcher(&remote);
        let first = fetcher.materialize(&core(), &commit_id(1)).await.unwrap();
        let second = fetcher.materialize(&core(), &commit_id(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(remote.fetch_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_materialize_single_flight() {
        let remote = remote_with_tags();
        remote.set_fetch_delay(Duration::from_millis(20));
        let fetcher = Arc::new(fetcher(&remote));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let fetcher = Arc::clone(&fetcher);
            tasks.push(tokio::spawn(async move {
                fetcher.materialize(&core(), &commit_id(1)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(remote.fetch_calls(), 1);

        fetcher.materialize(&core(), &commit_id(2)).await.unwrap();
        assert_eq!(remote.fetch_calls(), 2);
        assert!(fetcher.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_finished_materialize_keeps_newer_gate() {
        let remote = remote_with_tags();
        remote.set_fetch_delay(Duration::from_millis(40));
        let fetcher = Arc::new(fetcher(&remote));
        let cache_key = CacheKey::new(core(), &commit_id(1)).unwrap();

        let task = {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.materialize(&core(), &commit_id(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let newer = Arc::new(tokio::sync::Mutex::new(()));
        fetcher
            .in_flight
            .lock()
            .unwrap()
            .insert(cache_key.clone(), Arc::clone(&newer));

        task.await.unwrap().unwrap();
        let in_flight = fetcher.in_flight.lock().unwrap();
        assert!(in_flight
            .get(&cache_key)
            .is_some_and(|gate| Arc::ptr_eq(gate, &newer)));
    }

    #[tokio::test]
    async fn test_failed_materialize_can_retry() {
        let remote = remote_with_tags();
        let fetcher = fetcher(&remote);
        remote.fail_next(1);
        assert!(fetcher.materialize(&core(), &commit_id(1)).await.is_err());
        fetcher.materialize(&core(), &commit_id(1)).await.unwrap();
        assert_eq!(remote.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_package_manifest() {
        let remote = remote_with_tags();
        let fetcher = fetcher(&remote);
        let manifest = fetcher
            .package_manifest(&core(), &commit_id(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.name(), "core");
    }

    #[tokio::test]
    async fn test_available_refs_sorted() {
        let remote = remote_with_tags();
        let refs = fetcher(&remote).available_refs(&core()).await.unwrap();
        assert_eq!(refs, vec!["v2.0.0-beta", "v1.1.0", "v1.0.0"]);
    }
}
