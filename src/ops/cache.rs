//! Package cache maintenance for `modelkit cache`.

use crate::core::error::Result;
use crate::core::package_key::PackageKey;
use crate::sources::cache::{CacheKey, ContentStore};

/// Remove every cached entry, or only one package's.
///
/// Returns the number of entries removed.
pub fn clear_cache(store: &dyn ContentStore, package: Option<&PackageKey>) -> Result<usize> {
    let removed = match package {
        Some(key) => store.remove_package(key)?,
        None => store.clear()?,
    };
    tracing::info!("removed {} cache entries", removed);
    Ok(removed)
}

/// Cached entries, sorted.
pub fn cached_entries(store: &dyn ContentStore) -> Result<Vec<CacheKey>> {
    store.entries()
}
