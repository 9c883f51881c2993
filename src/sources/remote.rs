//! Access to remote git repositories.
//!
//! Only two questions are ever asked of a remote: which refs does it
//! advertise, and what is the file tree at a given commit.

use std::collections::BTreeMap;

use async_trait::async_trait;
use git2::{Direction, ErrorClass, ErrorCode, ObjectType, Oid, Remote, Repository, TreeWalkMode, TreeWalkResult};
use url::Url;

use crate::core::error::{Error, Result};
use crate::resolver::encode::RefType;
use crate::sources::cache::PackageTree;

/// A ref advertised by a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    /// Short name (`v1.0.0`, `main`)
    pub name: String,

    /// Tag or branch
    pub kind: RefType,

    /// Commit the ref points at (annotated tags are peeled)
    pub commit: String,
}

impl RemoteRef {
    pub fn tag(name: impl Into<String>, commit: impl Into<String>) -> Self {
        RemoteRef {
            name: name.into(),
            kind: RefType::Tag,
            commit: commit.into(),
        }
    }

    pub fn branch(name: impl Into<String>, commit: impl Into<String>) -> Self {
        RemoteRef {
            name: name.into(),
            kind: RefType::Branch,
            commit: commit.into(),
        }
    }
}

/// The git capability the fetcher needs.
#[async_trait]
pub trait GitRemote: Send + Sync {
    /// List the tags and branches a remote advertises.
    async fn list_refs(&self, url: &str) -> Result<Vec<RemoteRef>>;

    /// Fetch the complete file tree at `commit`.
    async fn fetch_tree(&self, url: &str, commit: &str) -> Result<PackageTree>;
}

/// [`GitRemote`] backed by libgit2. Calls run on tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Git2Remote;

impl Git2Remote {
    pub fn new() -> Self {
        Git2Remote
    }
}

#[async_trait]
impl GitRemote for Git2Remote {
    async fn list_refs(&self, url: &str) -> Result<Vec<RemoteRef>> {
        let url = checked_url(url)?;
        let label = url.to_string();
        tokio::task::spawn_blocking(move || list_refs_blocking(&url))
            .await
            .map_err(|e| Error::network_permanent(label, e.to_string()))?
    }

    async fn fetch_tree(&self, url: &str, commit: &str) -> Result<PackageTree> {
        let url = checked_url(url)?;
        let label = url.to_string();
        let commit = commit.to_string();
        tokio::task::spawn_blocking(move || fetch_tree_blocking(&url, &commit))
            .await
            .map_err(|e| Error::network_permanent(label, e.to_string()))?
    }
}

fn checked_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid remote URL `{}`: {}", url, e)))?;
    match parsed.scheme() {
        "https" | "http" | "ssh" | "git" | "file" => Ok(parsed.to_string()),
        other => Err(Error::config(format!(
            "unsupported remote scheme `{}` in `{}`",
            other, url
        ))),
    }
}

/// Map a libgit2 failure.
///
/// Connection faults are transient. Rejected credentials, bad certificates
/// and missing repositories are reported as permanent network errors.
fn git_error(url: &str, err: git2::Error) -> Error {
    match (err.class(), err.code()) {
        (_, ErrorCode::Auth | ErrorCode::Certificate | ErrorCode::NotFound) => {
            Error::network_permanent(url, err.message())
        }
        (ErrorClass::Http, _) if is_http_rejection(err.message()) => {
            Error::network_permanent(url, err.message())
        }
        (ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl | ErrorClass::Os, _) => {
            Error::network(url, err.message())
        }
        _ => Error::network_permanent(url, format!("git error: {}", err.message())),
    }
}

/// Status lines libgit2 reports for a refused or unknown repository.
fn is_http_rejection(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["401", "403", "404", "authentication", "not found"]
        .iter()
        .any(|m| message.contains(m))
}

fn list_refs_blocking(url: &str) -> Result<Vec<RemoteRef>> {
    tracing::debug!("listing refs of {}", url);
    let mut remote = Remote::create_detached(url).map_err(|e| git_error(url, e))?;
    remote
        .connect(Direction::Fetch)
        .map_err(|e| git_error(url, e))?;

    let mut refs: BTreeMap<(u8, String), RemoteRef> = BTreeMap::new();
    for head in remote.list().map_err(|e| git_error(url, e))? {
        let name = head.name();
        let commit = head.oid().to_string();
        if let Some(tag) = name.strip_prefix("refs/tags/") {
            // `v1^{}` carries the commit an annotated tag points at.
            let (tag, peeled) = match tag.strip_suffix("^{}") {
                Some(t) => (t, true),
                None => (tag, false),
            };
            let entry = refs
                .entry((0, tag.to_string()))
                .or_insert_with(|| RemoteRef::tag(tag, commit.clone()));
            if peeled {
                entry.commit = commit;
            }
        } else if let Some(branch) = name.strip_prefix("refs/heads/") {
            refs.insert((1, branch.to_string()), RemoteRef::branch(branch, commit));
        }
    }
    let _ = remote.disconnect();

    Ok(refs.into_values().collect())
}

fn fetch_tree_blocking(url: &str, commit: &str) -> Result<PackageTree> {
    tracing::info!("fetching {} at {}", url, &commit[..commit.len().min(7)]);

    let scratch = tempfile::tempdir().map_err(|e| Error::io(std::env::temp_dir(), e))?;
    let repo = Repository::init_bare(scratch.path()).map_err(|e| git_error(url, e))?;
    let oid = Oid::from_str(commit)
        .map_err(|_| Error::config(format!("`{}` is not a valid commit id", commit)))?;

    {
        let mut remote = repo.remote_anonymous(url).map_err(|e| git_error(url, e))?;
        let refspecs = [
            "+refs/heads/*:refs/remotes/origin/*",
            "+refs/tags/*:refs/tags/*",
        ];
        remote
            .fetch(&refspecs, None, None)
            .map_err(|e| git_error(url, e))?;

        if repo.find_commit(oid).is_err() {
            // Not reachable from any advertised ref; ask for the object directly.
            remote
                .fetch(&[commit], None, None)
                .map_err(|_| Error::config(format!("commit `{}` not found in {}", commit, url)))?;
        }
    }

    let commit_obj = repo
        .find_commit(oid)
        .map_err(|_| Error::config(format!("commit `{}` not found in {}", commit, url)))?;
    let tree = commit_obj.tree().map_err(|e| git_error(url, e))?;

    let mut blobs = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                blobs.push((format!("{}{}", dir, name), entry.id()));
            }
        }
        TreeWalkResult::Ok
    })
    .map_err(|e| git_error(url, e))?;

    let mut files = PackageTree::new();
    for (path, id) in blobs {
        let blob = repo.find_blob(id).map_err(|e| git_error(url, e))?;
        files.insert(path, blob.content().to_vec())?;
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_url() {
        assert!(checked_url("https://github.com/acme/core.git").is_ok());
        assert!(checked_url("file:///tmp/repo").is_ok());
        assert!(checked_url("ftp://example.com/repo").is_err());
        assert!(checked_url("not a url").is_err());
    }

    #[test]
    fn test_git_errors_are_network_errors() {
        let url = "https://example.invalid/x.git";
        let err = git_error(
            url,
            git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "could not resolve host"),
        );
        assert!(matches!(err, Error::Network { .. }));
        assert!(err.is_transient());

        let timeout = git_error(
            url,
            git2::Error::new(ErrorCode::GenericError, ErrorClass::Http, "operation timed out"),
        );
        assert!(timeout.is_transient());
    }

    #[test]
    fn test_auth_and_missing_repository_are_permanent() {
        let url = "https://github.com/acme/private.git";
        let auth = git_error(
            url,
            git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "authentication required"),
        );
        assert!(matches!(auth, Error::Network { .. }));
        assert!(!auth.is_transient());

        let missing = git_error(
            url,
            git2::Error::new(ErrorCode::GenericError, ErrorClass::Http, "unexpected http status code: 404"),
        );
        assert!(!missing.is_transient());

        let not_found = git_error(
            url,
            git2::Error::new(ErrorCode::NotFound, ErrorClass::Repository, "repository not found"),
        );
        assert!(!not_found.is_transient());
    }

    #[tokio::test]
    async fn test_list_refs_of_local_repository() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("model.yaml"), "model:\n  name: local\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("model.yaml")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let commit = repo
            .commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
        repo.tag_lightweight("v1.0.0", &repo.find_object(commit, None).unwrap(), false)
            .unwrap();

        let url = Url::from_file_path(tmp.path()).unwrap().to_string();
        let remote = Git2Remote::new();
        let refs = remote.list_refs(&url).await.unwrap();
        assert!(refs.contains(&RemoteRef::tag("v1.0.0", commit.to_string())));
        assert!(refs.iter().any(|r| r.kind == RefType::Branch && r.commit == commit.to_string()));

        let files = remote.fetch_tree(&url, &commit.to_string()).await.unwrap();
        assert_eq!(files.get("model.yaml"), Some(&b"model:\n  name: local\n"[..]));
    }
}
