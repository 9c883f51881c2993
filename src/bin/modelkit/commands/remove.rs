//! `modelkit remove` command

use anyhow::Result;

use crate::cli::RemoveArgs;
use crate::commands::{status, workspace};
use modelkit::ops::remove_dependency;
use modelkit::GlobalContext;

pub fn execute(args: RemoveArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let result = remove_dependency(ws.manifest_path(), &args.name)?;

    status("Removed", format!("`{}` from model.yaml", result.name));
    if result.removed_override {
        status("Removed", format!("override for `{}`", result.name));
    }
    eprintln!("note: run `modelkit install` to prune model.lock");
    Ok(())
}
