//! `modelkit status` command

use anyhow::Result;

use crate::commands::workspace;
use modelkit::ops::status;
use modelkit::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let store = ctx.store();
    let statuses = status(&ws, &store)?;

    if statuses.is_empty() {
        println!("no dependencies declared");
        return Ok(());
    }

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for s in &statuses {
        let marker = if s.state.is_current() { " " } else { "!" };
        println!("{} {:<width$}  {}", marker, s.name, s.state, width = width);
    }

    if statuses.iter().any(|s| !s.state.is_current()) {
        eprintln!("\nnote: run `modelkit install` to bring model.lock and the cache up to date");
    }
    Ok(())
}
