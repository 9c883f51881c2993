//! Dependency resolution.
//!
//! Ref policies, the lock file format, and the package graph. Everything
//! here except [`PackageGraph::from_lock`] is pure.

pub mod encode;
pub mod graph;
pub mod policy;

pub use encode::{LockEntry, LockFile, RefType, LOCKFILE_NAME};
pub use graph::{
    build_tree, find_reverse_dependencies, DependencyTreeNode, Dependent, PackageGraph, Relation,
    ReverseDependency,
};
pub use policy::{resolve_policy, Policy, PolicyResolution};
