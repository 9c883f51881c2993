//! `modelkit update` command

use anyhow::Result;

use crate::cli::UpdateArgs;
use crate::commands::{cycle_policy, parse_key, print_install_report, runtime, workspace};
use modelkit::ops::update;
use modelkit::GlobalContext;

pub fn execute(args: UpdateArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let packages = args
        .packages
        .iter()
        .map(|p| parse_key(p))
        .collect::<Result<Vec<_>>>()?;
    let fetcher = ctx.fetcher();

    let report = runtime()?.block_on(update(
        &ws,
        &fetcher,
        &packages,
        cycle_policy(ctx, args.cycles),
    ))?;
    print_install_report(ctx, &report);
    Ok(())
}
