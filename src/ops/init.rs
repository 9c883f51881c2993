//! Implementation of `modelkit init`.

use std::path::Path;

use crate::core::error::{Error, Result};
use crate::core::manifest::{generate_default_manifest, DEFAULT_ENTRY, MANIFEST_NAME};
use crate::util::fs;

/// Create model.yaml and an empty entry file in `path`.
///
/// An existing entry file is kept.
pub fn init_project(path: &Path, name: &str) -> Result<()> {
    let manifest_path = path.join(MANIFEST_NAME);
    if manifest_path.exists() {
        return Err(Error::config(format!(
            "`{}` already exists in `{}`",
            MANIFEST_NAME,
            path.display()
        )));
    }

    fs::ensure_dir(path)?;
    fs::write_atomic(&manifest_path, generate_default_manifest(name).as_bytes())?;

    let entry = path.join(DEFAULT_ENTRY);
    if !entry.exists() {
        fs::write_atomic(&entry, format!("// {}\n", name).as_bytes())?;
    }

    tracing::info!("created {}", manifest_path.display());
    Ok(())
}
