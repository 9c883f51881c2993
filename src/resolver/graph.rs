//! The package dependency graph.
//!
//! Packages live in an arena (a petgraph `DiGraph` plus a key index); an edge
//! `a -> b` carries the ref `a`'s manifest declares for `b`. The graph is
//! rebuilt on demand from the lock file and the cached package manifests and
//! never persisted.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::core::dependency::DependencySource;
use crate::core::error::Result;
use crate::core::manifest::{ProjectManifest, MANIFEST_NAME};
use crate::core::package_key::PackageKey;
use crate::core::workspace::Workspace;
use crate::resolver::encode::LockFile;
use crate::sources::git::GitFetcher;

/// A package dependency graph.
#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    /// Packages, edges weighted by the declared ref
    graph: DiGraph<PackageKey, String>,

    /// Map from key to node index
    index: HashMap<PackageKey, NodeIndex>,

    /// Git dependencies declared by the workspace itself, with their refs
    roots: Vec<(PackageKey, String)>,
}

impl PackageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package node if it is not present yet.
    pub fn add_package(&mut self, key: &PackageKey) -> NodeIndex {
        if let Some(&node) = self.index.get(key) {
            return node;
        }
        let node = self.graph.add_node(key.clone());
        self.index.insert(key.clone(), node);
        node
    }

    /// Record that `from` declares `to` at `git_ref`.
    pub fn add_edge(&mut self, from: &PackageKey, to: &PackageKey, git_ref: &str) {
        let a = self.add_package(from);
        let b = self.add_package(to);
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, git_ref.to_string());
        }
    }

    /// Record a dependency declared by the workspace.
    pub fn add_root(&mut self, key: &PackageKey, git_ref: &str) {
        self.add_package(key);
        if !self.roots.iter().any(|(k, _)| k == key) {
            self.roots.push((key.clone(), git_ref.to_string()));
        }
    }

    pub fn roots(&self) -> &[(PackageKey, String)] {
        &self.roots
    }

    pub fn contains(&self, key: &PackageKey) -> bool {
        self.index.contains_key(key)
    }

    /// All packages, sorted.
    pub fn packages(&self) -> Vec<&PackageKey> {
        let mut keys: Vec<_> = self.graph.node_weights().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of a package with their declared refs, sorted.
    pub fn deps(&self, key: &PackageKey) -> Vec<(&PackageKey, &str)> {
        let Some(&node) = self.index.get(key) else {
            return Vec::new();
        };
        let mut deps: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|e| (&self.graph[e.target()], e.weight().as_str()))
            .collect();
        deps.sort();
        deps
    }

    /// Packages that declare `key`, with the ref they declare, sorted.
    pub fn dependents(&self, key: &PackageKey) -> Vec<(&PackageKey, &str)> {
        let Some(&node) = self.index.get(key) else {
            return Vec::new();
        };
        let mut dependents: Vec<_> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| (&self.graph[e.source()], e.weight().as_str()))
            .collect();
        dependents.sort();
        dependents
    }

    /// Every package reachable from the workspace's declared dependencies.
    pub fn reachable(&self) -> BTreeSet<PackageKey> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&PackageKey> = self.roots.iter().map(|(k, _)| k).collect();
        while let Some(key) = stack.pop() {
            if seen.insert(key.clone()) {
                stack.extend(self.deps(key).into_iter().map(|(k, _)| k));
            }
        }
        seen
    }

    /// Find every package-level cycle.
    ///
    /// Three-color depth-first search in key order. Reaching a gray node emits
    /// the stack from that node's first occurrence to the current node, so a
    /// cycle `a -> b -> c -> a` is reported as `[a, b, c]`.
    pub fn detect_cycles(&self) -> Vec<Vec<PackageKey>> {
        let mut color: HashMap<NodeIndex, Color> = HashMap::new();
        let mut stack: Vec<NodeIndex> = Vec::new();
        let mut cycles = Vec::new();

        let mut starts: Vec<NodeIndex> = self.graph.node_indices().collect();
        starts.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for start in starts {
            if color.get(&start).copied().unwrap_or(Color::White) == Color::White {
                self.visit(start, &mut color, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn visit(
        &self,
        node: NodeIndex,
        color: &mut HashMap<NodeIndex, Color>,
        stack: &mut Vec<NodeIndex>,
        cycles: &mut Vec<Vec<PackageKey>>,
    ) {
        color.insert(node, Color::Gray);
        stack.push(node);

        let mut next: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        next.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));

        for child in next {
            match color.get(&child).copied().unwrap_or(Color::White) {
                Color::White => self.visit(child, color, stack, cycles),
                Color::Gray => {
                    if let Some(pos) = stack.iter().position(|n| *n == child) {
                        cycles.push(stack[pos..].iter().map(|n| self.graph[*n].clone()).collect());
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color.insert(node, Color::Black);
    }

    /// Build the graph for a workspace from its lock file.
    ///
    /// Every locked package is materialized (a no-op when cached) and its
    /// manifest read to discover edges. Git dependencies of local path
    /// dependencies count as workspace roots.
    pub async fn from_lock(ws: &Workspace, lock: &LockFile, fetcher: &GitFetcher) -> Result<Self> {
        let mut graph = PackageGraph::new();

        for dep in ws.manifest().git_dependencies() {
            if let Some(key) = dep.package_key() {
                graph.add_root(key, dep.git_ref());
            }
        }
        for (_, manifest) in path_dependency_manifests(ws.manifest())? {
            for dep in manifest.git_dependencies() {
                if let Some(key) = dep.package_key() {
                    graph.add_root(key, dep.git_ref());
                }
            }
        }

        for (key, entry) in lock.iter() {
            graph.add_package(key);
            let Some(manifest) = fetcher.package_manifest(key, &entry.commit).await? else {
                continue;
            };
            for dep in manifest.git_dependencies() {
                if let Some(dep_key) = dep.package_key() {
                    graph.add_edge(key, dep_key, dep.git_ref());
                }
            }
        }

        tracing::debug!("package graph: {} packages", graph.len());
        Ok(graph)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Manifests of the workspace's local path dependencies that have one.
pub fn path_dependency_manifests(manifest: &ProjectManifest) -> Result<Vec<(String, ProjectManifest)>> {
    let mut out = Vec::new();
    for dep in manifest.dependencies() {
        let DependencySource::Path(dir) = dep.source() else {
            continue;
        };
        let path = dir.join(MANIFEST_NAME);
        if !path.is_file() {
            tracing::debug!("path dependency `{}` has no {}", dep.name(), MANIFEST_NAME);
            continue;
        }
        out.push((dep.name().to_string(), ProjectManifest::load(&path)?));
    }
    Ok(out)
}

/// One node of a rendered dependency tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTreeNode {
    pub key: PackageKey,
    /// Ref declared by the parent
    pub git_ref: String,
    /// Concrete ref the lock resolved it to, when different
    pub resolved_ref: Option<String>,
    /// Locked commit, if the package is locked
    pub commit: Option<String>,
    pub children: Vec<DependencyTreeNode>,
    pub depth: usize,
    /// Already expanded higher up on this branch
    pub repeated: bool,
}

/// Build the dependency tree of a workspace.
///
/// Each branch carries its own visited set, so a package seen again on its
/// own path is recorded with no children instead of recursing forever.
/// Diamonds are expanded once per branch.
pub fn build_tree(graph: &PackageGraph, lock: &LockFile) -> Vec<DependencyTreeNode> {
    let mut roots: Vec<&(PackageKey, String)> = graph.roots().iter().collect();
    roots.sort();
    roots
        .into_iter()
        .map(|(key, git_ref)| tree_node(graph, lock, key, git_ref, 0, &HashSet::new()))
        .collect()
}

fn tree_node(
    graph: &PackageGraph,
    lock: &LockFile,
    key: &PackageKey,
    git_ref: &str,
    depth: usize,
    visited: &HashSet<PackageKey>,
) -> DependencyTreeNode {
    let locked = lock.get(key);
    let commit = locked.map(|e| e.commit.clone());
    let resolved_ref = locked
        .map(|e| e.concrete_ref())
        .filter(|r| *r != git_ref)
        .map(str::to_string);
    let repeated = visited.contains(key);

    let children = if repeated {
        Vec::new()
    } else {
        let mut branch = visited.clone();
        branch.insert(key.clone());
        graph
            .deps(key)
            .into_iter()
            .map(|(child, r)| tree_node(graph, lock, child, r, depth + 1, &branch))
            .collect()
    };

    DependencyTreeNode {
        key: key.clone(),
        git_ref: git_ref.to_string(),
        resolved_ref,
        commit,
        children,
        depth,
        repeated,
    }
}

/// How a dependent reaches the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Declared by the workspace manifest
    Direct,
    /// Declared by another package's manifest
    Transitive,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Direct => write!(f, "direct"),
            Relation::Transitive => write!(f, "transitive"),
        }
    }
}

/// Who declares a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependent {
    /// The workspace (by model name)
    Workspace(String),
    /// A local path dependency (by manifest key)
    Local(String),
    /// Another package
    Package(PackageKey),
}

impl fmt::Display for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependent::Workspace(name) => write!(f, "{} (workspace)", name),
            Dependent::Local(name) => write!(f, "{} (path)", name),
            Dependent::Package(key) => write!(f, "{}", key),
        }
    }
}

/// One reverse-dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseDependency {
    pub dependent: Dependent,
    pub git_ref: String,
    pub relation: Relation,
}

/// Who depends on `target`, one hop only.
///
/// The workspace manifest is checked first, then the manifests of its local
/// path dependencies, then every package in the graph.
pub fn find_reverse_dependencies(
    target: &PackageKey,
    manifest: &ProjectManifest,
    graph: &PackageGraph,
) -> Result<Vec<ReverseDependency>> {
    let mut out = Vec::new();

    if let Some(dep) = manifest.dependency_for(target).filter(|d| d.is_git()) {
        out.push(ReverseDependency {
            dependent: Dependent::Workspace(manifest.name().to_string()),
            git_ref: dep.git_ref().to_string(),
            relation: Relation::Direct,
        });
    }

    for (name, local) in path_dependency_manifests(manifest)? {
        if let Some(dep) = local.dependency_for(target).filter(|d| d.is_git()) {
            out.push(ReverseDependency {
                dependent: Dependent::Local(name),
                git_ref: dep.git_ref().to_string(),
                relation: Relation::Direct,
            });
        }
    }

    for (dependent, git_ref) in graph.dependents(target) {
        out.push(ReverseDependency {
            dependent: Dependent::Package(dependent.clone()),
            git_ref: git_ref.to_string(),
            relation: Relation::Transitive,
        });
    }

    Ok(out)
}
