//! `modelkit install` command

use anyhow::Result;

use crate::cli::InstallArgs;
use crate::commands::{cycle_policy, print_install_report, runtime, workspace};
use modelkit::ops::{install, InstallOptions};
use modelkit::GlobalContext;

pub fn execute(args: InstallArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let fetcher = ctx.fetcher();
    let opts = InstallOptions {
        cycle_policy: cycle_policy(ctx, args.cycles),
        ..Default::default()
    };

    let report = runtime()?.block_on(install(&ws, &fetcher, &opts))?;
    print_install_report(ctx, &report);
    Ok(())
}
