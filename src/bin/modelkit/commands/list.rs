//! `modelkit list` command

use anyhow::Result;

use crate::commands::workspace;
use modelkit::ops::list;
use modelkit::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let packages = list(&ws)?;

    if packages.is_empty() {
        if ws.has_lock() {
            println!("no packages locked");
        } else {
            println!("no model.lock; run `modelkit install`");
        }
        return Ok(());
    }

    for (key, entry) in packages {
        let resolved = entry
            .resolved_ref
            .as_deref()
            .map(|r| format!(" -> {}", r))
            .unwrap_or_default();
        println!(
            "{} {}{} ({} {})",
            key,
            entry.git_ref,
            resolved,
            entry.ref_type,
            entry.short_commit()
        );
    }
    Ok(())
}
