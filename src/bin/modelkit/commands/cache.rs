//! `modelkit cache` command
//!
//! Manage the machine-wide package cache.

use anyhow::Result;

use crate::cli::CacheClearArgs;
use crate::commands::{parse_key, status};
use modelkit::ops::{cached_entries, clear_cache};
use modelkit::util::fs::format_size;
use modelkit::GlobalContext;

/// List cached entries.
pub fn list(ctx: &GlobalContext) -> Result<()> {
    let store = ctx.store();
    let entries = cached_entries(&store)?;

    println!("Cache directory: {}", store.root().display());
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    for key in &entries {
        println!("  {}", key);
    }
    println!("{} entries, {}", entries.len(), format_size(store.size()));
    Ok(())
}

/// Remove cached entries.
pub fn clear(args: CacheClearArgs, ctx: &GlobalContext) -> Result<()> {
    let store = ctx.store();
    let package = args.package.as_deref().map(parse_key).transpose()?;

    let removed = clear_cache(&store, package.as_ref())?;
    if removed == 0 {
        status("Clean", "nothing to remove");
    } else {
        status("Removed", format!("{} cache entries", removed));
    }
    Ok(())
}

/// Show cache directory path.
pub fn path(ctx: &GlobalContext) -> Result<()> {
    println!("{}", ctx.cache_dir().display());
    Ok(())
}
