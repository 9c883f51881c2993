//! Workspace import loader.
//!
//! Starting from an entry file, parses every document reachable through
//! imports: relative paths, path aliases and external packages. Each physical
//! document is parsed exactly once however many routes lead to it, and
//! file-level import cycles simply stop at documents already seen.
//!
//! Documents load concurrently. The visited set is owned by the driver loop,
//! so check-and-insert never races; concurrent materializations of the same
//! package are collapsed by the fetcher.

pub mod parser;

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::core::address::{classify, ImportAddress, PathAliases};
use crate::core::error::{Error, Result};
use crate::core::manifest::{ProjectManifest, DEFAULT_ENTRY};
use crate::core::package_key::PackageKey;
use crate::core::workspace::Workspace;
use crate::resolver::encode::LockFile;
use crate::sources::cache::CacheKey;
use crate::sources::git::GitFetcher;
use crate::util::diagnostic::suggestions;
use crate::util::fs;

pub use parser::{DocumentParser, ImportScanner, ImportStatement, ParsedDocument};

/// Extension tried when an import names a file without one.
pub const MODEL_EXTENSION: &str = "model";

/// Identity of a loaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentUri {
    /// A canonical path on disk
    File(PathBuf),

    /// A file inside a cached package, by `/`-separated relative path
    Package { key: CacheKey, path: String },
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentUri::File(path) => write!(f, "{}", path.display()),
            DocumentUri::Package { key, path } => write!(f, "{}/{}", key, path),
        }
    }
}

/// An import together with the document it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    pub statement: ImportStatement,
    pub target: DocumentUri,
}

/// One parsed document.
#[derive(Debug, Clone)]
pub struct LoadedDocument<R> {
    pub uri: DocumentUri,
    pub root: R,
    pub imports: Vec<ResolvedImport>,
}

/// Everything reachable from an entry file.
#[derive(Debug, Clone)]
pub struct LoadResult<R> {
    /// Loaded documents, sorted by URI
    pub documents: Vec<LoadedDocument<R>>,
    entry: usize,
}

impl<R> LoadResult<R> {
    /// The entry document's parsed root, for downstream linking.
    pub fn model(&self) -> &R {
        &self.documents[self.entry].root
    }

    pub fn entry(&self) -> &LoadedDocument<R> {
        &self.documents[self.entry]
    }

    pub fn get(&self, uri: &DocumentUri) -> Option<&LoadedDocument<R>> {
        self.documents.iter().find(|d| &d.uri == uri)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Where a document lives, which bounds what its relative imports may reach.
#[derive(Debug)]
enum ScopeBase {
    Workspace { root: PathBuf },
    Package { key: CacheKey, root: PathBuf },
}

/// Resolution context shared by every document of a workspace or package.
#[derive(Debug)]
struct Scope {
    base: ScopeBase,
    aliases: PathAliases,
    manifest: Option<Arc<ProjectManifest>>,
}

impl Scope {
    fn root(&self) -> &Path {
        match &self.base {
            ScopeBase::Workspace { root } | ScopeBase::Package { root, .. } => root,
        }
    }

    /// Directory a document's relative imports are resolved against.
    fn dir_of(&self, uri: &DocumentUri) -> PathBuf {
        let path = match uri {
            DocumentUri::File(path) => path.clone(),
            DocumentUri::Package { path, .. } => self.root().join(path),
        };
        path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root().to_path_buf())
    }

    /// Resolve `rel` against `dir`, sandboxed to the scope root.
    fn locate(&self, fetcher: &GitFetcher, dir: &Path, rel: &Path) -> Result<DocumentUri> {
        let joined = fs::join_within(self.root(), dir, rel).ok_or_else(|| {
            Error::config(format!(
                "import `{}` resolves outside workspace boundary",
                rel.display()
            ))
        })?;
        self.find_existing(fetcher, &joined)?
            .ok_or_else(|| Error::not_found("file", joined.display().to_string()))
    }

    /// Like [`Scope::locate`], but a miss (or an escape) is `None`.
    fn lookup(&self, fetcher: &GitFetcher, dir: &Path, rel: &Path) -> Result<Option<DocumentUri>> {
        match fs::join_within(self.root(), dir, rel) {
            Some(joined) => self.find_existing(fetcher, &joined),
            None => Ok(None),
        }
    }

    fn find_existing(&self, fetcher: &GitFetcher, joined: &Path) -> Result<Option<DocumentUri>> {
        for candidate in candidates(joined) {
            if let Some(uri) = self.existing(fetcher, &candidate)? {
                return Ok(Some(uri));
            }
        }
        Ok(None)
    }

    fn existing(&self, fetcher: &GitFetcher, candidate: &Path) -> Result<Option<DocumentUri>> {
        match &self.base {
            ScopeBase::Workspace { root } => {
                if !candidate.is_file() {
                    return Ok(None);
                }
                let canonical = fs::canonical_path(candidate);
                if !fs::is_within(&canonical, root) {
                    return Err(Error::config(format!(
                        "`{}` resolves outside workspace boundary",
                        candidate.display()
                    )));
                }
                Ok(Some(DocumentUri::File(canonical)))
            }
            ScopeBase::Package { key, root } => {
                let Ok(rel) = candidate.strip_prefix(root) else {
                    return Ok(None);
                };
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if fetcher.store().read_file(key, &rel)?.is_some() {
                    Ok(Some(DocumentUri::Package {
                        key: key.clone(),
                        path: rel,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// The path itself, then the path with the model extension appended.
fn candidates(path: &Path) -> Vec<PathBuf> {
    if path.extension().is_some_and(|ext| ext == MODEL_EXTENSION) {
        return vec![path.to_path_buf()];
    }
    let mut with_ext = OsString::from(path.as_os_str());
    with_ext.push(".");
    with_ext.push(MODEL_EXTENSION);
    vec![path.to_path_buf(), PathBuf::from(with_ext)]
}

struct Shared<P> {
    parser: P,
    fetcher: Arc<GitFetcher>,
    lock: LockFile,
    /// The workspace manifest, whose overrides apply to every package
    workspace: Option<Arc<ProjectManifest>>,
}

struct Loaded<R> {
    document: LoadedDocument<R>,
    pending: Vec<(DocumentUri, Arc<Scope>)>,
}

/// Loads a document graph.
pub struct ImportLoader<P: DocumentParser> {
    shared: Arc<Shared<P>>,
    root: Option<PathBuf>,
}

impl<P: DocumentParser> ImportLoader<P> {
    /// A loader with no workspace: relative imports only, sandboxed to the
    /// entry file's directory. External imports fail.
    pub fn standalone(parser: P, fetcher: Arc<GitFetcher>) -> Self {
        ImportLoader {
            shared: Arc::new(Shared {
                parser,
                fetcher,
                lock: LockFile::new(),
                workspace: None,
            }),
            root: None,
        }
    }

    /// A loader for a workspace, reading its lock file.
    pub fn for_workspace(ws: &Workspace, parser: P, fetcher: Arc<GitFetcher>) -> Result<Self> {
        let lock = ws.load_lock()?;
        Ok(Self::with_lock(ws, lock, parser, fetcher))
    }

    /// A loader for a workspace with an explicit lock.
    ///
    /// Dependencies the lock does not pin at their declared ref are resolved
    /// against their remote on first import.
    pub fn with_lock(ws: &Workspace, lock: LockFile, parser: P, fetcher: Arc<GitFetcher>) -> Self {
        ImportLoader {
            shared: Arc::new(Shared {
                parser,
                fetcher,
                lock,
                workspace: Some(Arc::new(ws.manifest().clone())),
            }),
            root: Some(fs::canonical_path(ws.root())),
        }
    }

    /// Load `entry` and everything it imports.
    pub async fn load(&self, entry: &Path) -> Result<LoadResult<P::Root>> {
        if !entry.is_file() {
            return Err(Error::not_found("file", entry.display().to_string()));
        }
        let entry = fs::canonical_path(entry);
        let root = match &self.root {
            Some(root) => root.clone(),
            None => entry.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        if !fs::is_within(&entry, &root) {
            return Err(Error::config(format!(
                "entry `{}` is outside workspace boundary",
                entry.display()
            )));
        }

        let manifest = self.shared.workspace.clone();
        let scope = Arc::new(Scope {
            aliases: manifest
                .as_ref()
                .map(|m| m.aliases().clone())
                .unwrap_or_default(),
            manifest,
            base: ScopeBase::Workspace { root },
        });

        let entry_uri = DocumentUri::File(entry);
        let mut visited = HashSet::new();
        visited.insert(entry_uri.clone());

        let mut tasks = JoinSet::new();
        tasks.spawn(load_document(Arc::clone(&self.shared), entry_uri.clone(), scope));

        let mut documents = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let loaded = match joined {
                Ok(result) => result?,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => return Err(Error::config(format!("document load cancelled: {}", e))),
            };
            for (uri, scope) in loaded.pending {
                if visited.insert(uri.clone()) {
                    tracing::trace!("queueing {}", uri);
                    tasks.spawn(load_document(Arc::clone(&self.shared), uri, scope));
                }
            }
            documents.push(loaded.document);
        }

        documents.sort_by(|a, b| a.uri.cmp(&b.uri));
        let entry = documents
            .iter()
            .position(|d| d.uri == entry_uri)
            .unwrap_or_default();
        tracing::debug!("loaded {} documents", documents.len());
        Ok(LoadResult { documents, entry })
    }
}

async fn load_document<P: DocumentParser>(
    shared: Arc<Shared<P>>,
    uri: DocumentUri,
    scope: Arc<Scope>,
) -> Result<Loaded<P::Root>> {
    let text = read_document(&shared.fetcher, &uri).await?;
    let parsed = shared.parser.parse(&uri, &text)?;

    let mut imports = Vec::with_capacity(parsed.imports.len());
    let mut pending = Vec::with_capacity(parsed.imports.len());
    for statement in parsed.imports {
        let (target, target_scope) = resolve_import(&shared, &scope, &uri, &statement)
            .await
            .map_err(|e| in_document(&uri, e))?;
        pending.push((target.clone(), target_scope));
        imports.push(ResolvedImport { statement, target });
    }

    Ok(Loaded {
        document: LoadedDocument {
            uri,
            root: parsed.root,
            imports,
        },
        pending,
    })
}

async fn read_document(fetcher: &GitFetcher, uri: &DocumentUri) -> Result<String> {
    match uri {
        DocumentUri::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e)),
        DocumentUri::Package { key, path } => {
            let bytes = fetcher
                .store()
                .read_file(key, path)?
                .ok_or_else(|| Error::not_found("file", uri.to_string()))?;
            String::from_utf8(bytes).map_err(|e| Error::parse(uri.to_string(), e.to_string()))
        }
    }
}

async fn resolve_import<P: DocumentParser>(
    shared: &Shared<P>,
    scope: &Arc<Scope>,
    from: &DocumentUri,
    statement: &ImportStatement,
) -> Result<(DocumentUri, Arc<Scope>)> {
    let fetcher = &shared.fetcher;
    let dir = scope.dir_of(from);

    match classify(&statement.address, statement.alias.as_deref(), &scope.aliases)? {
        ImportAddress::Relative(rel) => Ok((scope.locate(fetcher, &dir, &rel)?, Arc::clone(scope))),
        ImportAddress::Alias { alias, subpath } => {
            let base = scope
                .aliases
                .target(&alias)
                .ok_or_else(|| Error::config(format!("unknown path alias `{}`", alias)))?;
            let base = fs::canonical_path(base);
            Ok((scope.locate(fetcher, &base, &subpath)?, Arc::clone(scope)))
        }
        ImportAddress::External { key, git_ref, .. } => {
            // `owner/repo` may just as well be a file next to the importer.
            if let Some(local) = scope.lookup(fetcher, &dir, Path::new(&statement.address))? {
                tracing::trace!("`{}` names a local file", statement.address);
                return Ok((local, Arc::clone(scope)));
            }
            resolve_external(shared, scope, &key, git_ref.as_deref()).await
        }
    }
}

async fn resolve_external<P: DocumentParser>(
    shared: &Shared<P>,
    scope: &Scope,
    key: &PackageKey,
    git_ref: Option<&str>,
) -> Result<(DocumentUri, Arc<Scope>)> {
    let Some(manifest) = &scope.manifest else {
        return Err(Error::config_with_help(
            format!("external import `{}` requires a model.yaml manifest", key),
            suggestions::NO_MANIFEST,
        ));
    };
    let Some(dep) = manifest.dependency_for(key) else {
        return Err(Error::config_with_help(
            format!(
                "external import `{}` is not declared in {}",
                key,
                manifest.manifest_path().display()
            ),
            format!(
                "{}; add `{}` under `dependencies:` with `modelkit add {}`",
                suggestions::NO_MANIFEST,
                key,
                key
            ),
        ));
    };

    let declared = match &shared.workspace {
        Some(ws) => ws.effective_ref(key, dep.git_ref()),
        None => dep.git_ref().to_string(),
    };
    let locked = shared.lock.get(key).filter(|e| e.git_ref == declared);
    if let Some(wanted) = git_ref {
        let pinned = wanted == declared
            || locked.is_some_and(|e| e.concrete_ref() == wanted || e.commit.starts_with(wanted));
        if !pinned {
            return Err(Error::config_with_help(
                format!(
                    "import pins `{}@{}` but the manifest declares `{}`",
                    key, wanted, declared
                ),
                format!(
                    "Change the import to `{}` or set `ref: {}` for it in model.yaml",
                    key, wanted
                ),
            ));
        }
    }

    let fetcher = &shared.fetcher;
    let commit = match locked {
        Some(entry) => entry.commit.clone(),
        None => {
            tracing::debug!("{}@{} is not locked, resolving", key, declared);
            fetcher.resolve_commit(key, &declared).await?.commit
        }
    };
    fetcher.materialize(key, &commit).await?;
    let cache_key = CacheKey::new(key.clone(), &commit)?;
    let root = fs::canonical_path(&fetcher.store().path(&cache_key));

    let (entry_file, aliases, manifest) = match fetcher.read_manifest(key, &commit)? {
        Some(m) => (
            m.entry().to_string(),
            PathAliases::from_manifest(&m.raw().paths, &root)?,
            Some(Arc::new(m)),
        ),
        None => (DEFAULT_ENTRY.to_string(), PathAliases::default(), None),
    };

    let scope = Arc::new(Scope {
        base: ScopeBase::Package {
            key: cache_key,
            root: root.clone(),
        },
        aliases,
        manifest,
    });
    let target = scope.locate(fetcher, &root, Path::new(&entry_file))?;
    Ok((target, scope))
}

/// Prefix configuration errors with the importing document.
fn in_document(uri: &DocumentUri, err: Error) -> Error {
    match err {
        Error::Config { message, help } => Error::Config {
            message: format!("{}: {}", uri, message),
            help,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::encode::{LockEntry, RefType};
    use crate::sources::cache::MemoryStore;
    use crate::sources::git::RetryPolicy;
    use crate::sources::remote::RemoteRef;
    use crate::test_support::{commit_id, package_tree, MockRemote, WorkspaceFixture};

    fn fetcher(remote: &Arc<MockRemote>) -> Arc<GitFetcher> {
        Arc::new(
            GitFetcher::new(remote.clone(), Arc::new(MemoryStore::new()))
                .with_retry(RetryPolicy::none()),
        )
    }

    fn lock_entry(key: &PackageKey, git_ref: &str, commit: &str) -> LockEntry {
        LockEntry {
            git_ref: git_ref.to_string(),
            resolved_ref: None,
            ref_type: RefType::Tag,
            resolved: key.url(),
            commit: commit.to_string(),
        }
    }

    #[tokio::test]
    async fn test_file_cycle_loads_each_once() {
        let fixture = WorkspaceFixture::minimal("app")
            .file("index.model", "import \"./a\"\n")
            .file("a.model", "import \"./b\"\n")
            .file("b.model", "import \"./a\"\n");
        let ws = fixture.workspace();
        let remote = Arc::new(MockRemote::new());
        let loader = ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&remote)).unwrap();

        let result = loader.load(&fixture.path("a.model")).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.model(), "import \"./b\"\n");
    }

    #[tokio::test]
    async fn test_local_diamond() {
        let fixture = WorkspaceFixture::minimal("app")
            .file("index.model", "import \"./b\"\nimport \"./c\"\n")
            .file("b.model", "import \"./shared/d\"\n")
            .file("c.model", "import \"./shared/d.model\"\n")
            .file("shared/d.model", "entity D {}\n");
        let ws = fixture.workspace();
        let loader =
            ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&Arc::new(MockRemote::new())))
                .unwrap();

        let result = loader.load(&ws.entry_path()).await.unwrap();
        assert_eq!(result.len(), 4);
        let d_count = result
            .documents
            .iter()
            .filter(|d| matches!(&d.uri, DocumentUri::File(p) if p.ends_with("shared/d.model")))
            .count();
        assert_eq!(d_count, 1);
    }

    #[tokio::test]
    async fn test_alias_import() {
        let fixture = WorkspaceFixture::new(
            "model:\n  name: app\npaths:\n  \"@shared/\": ./lib/shared/\n",
        )
        .file("index.model", "import \"@shared/money\"\n")
        .file("lib/shared/money.model", "entity Money {}\n");
        let ws = fixture.workspace();
        let loader =
            ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&Arc::new(MockRemote::new())))
                .unwrap();
        let result = loader.load(&ws.entry_path()).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_relative_escape_rejected() {
        let fixture = WorkspaceFixture::minimal("app").file("index.model", "import \"../../etc/passwd\"\n");
        let ws = fixture.workspace();
        let loader =
            ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&Arc::new(MockRemote::new())))
                .unwrap();
        let err = loader.load(&ws.entry_path()).await.unwrap_err();
        assert!(err.to_string().contains("outside workspace boundary"));
    }

    #[tokio::test]
    async fn test_external_without_manifest_suggests_creating_one() {
        let tmp = tempfile::TempDir::new().unwrap();
        let entry = tmp.path().join("index.model");
        std::fs::write(&entry, "import \"acme/core\"\n").unwrap();

        let loader = ImportLoader::standalone(ImportScanner, fetcher(&Arc::new(MockRemote::new())));
        let err = loader.load(&entry).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        let rendered = err.to_diagnostic().format(false);
        assert!(rendered.contains("Create a model.yaml"));
    }

    #[tokio::test]
    async fn test_undeclared_external_is_config_error() {
        let fixture = WorkspaceFixture::new("model:\n  name: app\ndependencies: {}\n")
            .file("index.model", "import \"acme/core\"\n");
        let ws = fixture.workspace();
        let remote = Arc::new(MockRemote::new());
        let loader = ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&remote)).unwrap();
        let err = loader.load(&ws.entry_path()).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        let rendered = err.to_diagnostic().format(false);
        assert!(rendered.contains("Create a model.yaml"));
        assert!(rendered.contains("modelkit add acme/core"));
        assert_eq!(remote.network_calls(), 0);
    }

    #[tokio::test]
    async fn test_external_file_shaped_address_prefers_local_file() {
        let fixture = WorkspaceFixture::minimal("app")
            .file("index.model", "import \"types/base\"\n")
            .file("types/base.model", "entity Base {}\n");
        let ws = fixture.workspace();
        let loader =
            ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&Arc::new(MockRemote::new())))
                .unwrap();
        let result = loader.load(&ws.entry_path()).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_external_diamond_fetches_once() {
        let a: PackageKey = "acme/b".parse().unwrap();
        let c: PackageKey = "acme/c".parse().unwrap();
        let d: PackageKey = "acme/d".parse().unwrap();

        let remote = Arc::new(MockRemote::new());
        remote.add_package(&a, &[RemoteRef::tag("v1", commit_id(1))], "");
        remote.add_tree(
            &a,
            &commit_id(1),
            package_tree(
                "model:\n  name: b\ndependencies:\n  acme/d: v1\n",
                &[("index.model", "import \"acme/d\"\n")],
            ),
        );
        remote.add_tree(
            &c,
            &commit_id(2),
            package_tree(
                "model:\n  name: c\ndependencies:\n  acme/d: v1\n",
                &[("index.model", "import \"acme/d\"\n")],
            ),
        );
        remote.add_tree(
            &d,
            &commit_id(3),
            package_tree(
                "model:\n  name: d\n  entry: src/main.model\n",
                &[("src/main.model", "import \"./units\"\n"), ("src/units.model", "")],
            ),
        );

        let fixture = WorkspaceFixture::new(
            "model:\n  name: app\ndependencies:\n  acme/b: v1\n  acme/c: v1\n  acme/d: v1\n",
        )
        .file("index.model", "import \"acme/b\"\nimport \"acme/c\" as C\n");
        let ws = fixture.workspace();

        let mut lock = LockFile::new();
        lock.insert(a.clone(), lock_entry(&a, "v1", &commit_id(1)));
        lock.insert(c.clone(), lock_entry(&c, "v1", &commit_id(2)));
        lock.insert(d.clone(), lock_entry(&d, "v1", &commit_id(3)));

        let loader = ImportLoader::with_lock(&ws, lock, ImportScanner, fetcher(&remote));
        let result = loader.load(&ws.entry_path()).await.unwrap();

        // index, b/index, c/index, d/src/main, d/src/units
        assert_eq!(result.len(), 5);
        let d_docs = result
            .documents
            .iter()
            .filter(|doc| matches!(&doc.uri, DocumentUri::Package { key, .. } if key.package() == &d))
            .count();
        assert_eq!(d_docs, 2);
        assert_eq!(remote.fetch_calls(), 3);
        assert_eq!(remote.list_calls(), 0);
    }

    fn core_remote(key: &PackageKey) -> Arc<MockRemote> {
        let remote = Arc::new(MockRemote::new());
        remote.add_package(
            key,
            &[
                RemoteRef::tag("v1.0.0", commit_id(1)),
                RemoteRef::tag("v1.1.0", commit_id(2)),
            ],
            "",
        );
        for n in [1, 2] {
            remote.add_tree(
                key,
                &commit_id(n),
                package_tree("model:\n  name: core\n", &[("index.model", "entity Core {}\n")]),
            );
        }
        remote
    }

    #[tokio::test]
    async fn test_unlocked_external_resolves_declared_ref() {
        let key: PackageKey = "acme/core".parse().unwrap();
        let remote = core_remote(&key);
        let fixture = WorkspaceFixture::new("model:\n  name: app\ndependencies:\n  acme/core: v1.0.0\n")
            .file("index.model", "import \"acme/core\"\n");
        let ws = fixture.workspace();

        let loader = ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&remote)).unwrap();
        let result = loader.load(&ws.entry_path()).await.unwrap();

        assert_eq!(result.len(), 2);
        let core = result.entry().imports[0].target.clone();
        assert!(matches!(&core, DocumentUri::Package { key, .. } if key.commit() == commit_id(1)));
        assert_eq!(remote.list_calls(), 1);
        assert_eq!(remote.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_lock_entry_for_other_ref_is_ignored() {
        let key: PackageKey = "acme/core".parse().unwrap();
        let remote = core_remote(&key);
        let fixture = WorkspaceFixture::new("model:\n  name: app\ndependencies:\n  acme/core: latest\n")
            .file("index.model", "import \"acme/core\"\n");
        let ws = fixture.workspace();

        let mut lock = LockFile::new();
        lock.insert(key.clone(), lock_entry(&key, "v1.0.0", &commit_id(1)));
        let loader = ImportLoader::with_lock(&ws, lock, ImportScanner, fetcher(&remote));
        let result = loader.load(&ws.entry_path()).await.unwrap();

        let core = result.entry().imports[0].target.clone();
        assert!(matches!(&core, DocumentUri::Package { key, .. } if key.commit() == commit_id(2)));
        assert_eq!(remote.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_import_ref_must_match_declared() {
        let key: PackageKey = "acme/core".parse().unwrap();
        let remote = core_remote(&key);
        let fixture = WorkspaceFixture::new("model:\n  name: app\ndependencies:\n  acme/core: v1.0.0\n")
            .file("index.model", "import \"acme/core@v1.1.0\"\n");
        let ws = fixture.workspace();

        let loader = ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&remote)).unwrap();
        let err = loader.load(&ws.entry_path()).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("acme/core@v1.1.0"));
        assert_eq!(remote.network_calls(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_package_alias_through_symlinked_cache() {
        use crate::sources::cache::FsStore;

        let key: PackageKey = "acme/core".parse().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.add_tree(
            &key,
            &commit_id(1),
            package_tree(
                "model:\n  name: core\npaths:\n  \"@lib/\": ./lib/\n",
                &[
                    ("index.model", "import \"@lib/units\"\n"),
                    ("lib/units.model", "entity Unit {}\n"),
                ],
            ),
        );

        let cache = tempfile::TempDir::new().unwrap();
        let real = cache.path().join("real");
        std::fs::create_dir_all(&real).unwrap();
        let link = cache.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let fetcher = Arc::new(
            GitFetcher::new(remote.clone(), Arc::new(FsStore::new(link.clone())))
                .with_retry(RetryPolicy::none()),
        );

        let fixture = WorkspaceFixture::new("model:\n  name: app\ndependencies:\n  acme/core: v1.0.0\n")
            .file("index.model", "import \"acme/core\"\n");
        let ws = fixture.workspace();
        let mut lock = LockFile::new();
        lock.insert(key.clone(), lock_entry(&key, "v1.0.0", &commit_id(1)));

        let loader = ImportLoader::with_lock(&ws, lock, ImportScanner, fetcher);
        let result = loader.load(&ws.entry_path()).await.unwrap();

        assert_eq!(result.len(), 3);
        assert!(result
            .documents
            .iter()
            .any(|d| matches!(&d.uri, DocumentUri::Package { path, .. } if path == "lib/units.model")));
    }

    #[tokio::test]
    async fn test_missing_relative_file() {
        let fixture = WorkspaceFixture::minimal("app").file("index.model", "import \"./nope\"\n");
        let ws = fixture.workspace();
        let loader =
            ImportLoader::for_workspace(&ws, ImportScanner, fetcher(&Arc::new(MockRemote::new())))
                .unwrap();
        let err = loader.load(&ws.entry_path()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
