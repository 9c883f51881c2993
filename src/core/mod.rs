//! Core data structures for modelkit.
//!
//! This module contains the foundational types used throughout modelkit:
//! - Package keys and dependency declarations
//! - The model.yaml manifest
//! - Import address classification
//! - Workspace management and the error taxonomy

pub mod address;
pub mod dependency;
pub mod error;
pub mod manifest;
pub mod package_key;
pub mod workspace;

pub use address::{classify, ImportAddress, PathAliases};
pub use dependency::{Dependency, DependencySource, DependencySpec};
pub use error::{Error, Result};
pub use manifest::{find_manifest, load_manifest, ProjectManifest, MANIFEST_NAME};
pub use package_key::PackageKey;
pub use workspace::Workspace;
