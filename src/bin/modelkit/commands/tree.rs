//! `modelkit tree` command

use anyhow::Result;

use crate::cli::TreeArgs;
use crate::commands::{runtime, workspace};
use modelkit::ops::{render_tree, tree};
use modelkit::GlobalContext;

pub fn execute(args: TreeArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let fetcher = ctx.fetcher();

    let nodes = runtime()?.block_on(tree(&ws, &fetcher))?;
    println!("{}", ws.manifest().name());
    print!("{}", render_tree(&nodes, args.depth));
    Ok(())
}
