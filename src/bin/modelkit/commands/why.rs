//! `modelkit why` command

use anyhow::Result;

use crate::cli::WhyArgs;
use crate::commands::{parse_key, runtime, workspace};
use modelkit::ops::why;
use modelkit::GlobalContext;

pub fn execute(args: WhyArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let target = parse_key(&args.package)?;
    let fetcher = ctx.fetcher();

    let dependents = runtime()?.block_on(why(&ws, &fetcher, &target))?;
    if dependents.is_empty() {
        println!("nothing depends on {}", target);
        return Ok(());
    }

    println!("{} is required by:", target);
    for dep in dependents {
        println!("  {} @ {} ({})", dep.dependent, dep.git_ref, dep.relation);
    }
    Ok(())
}
