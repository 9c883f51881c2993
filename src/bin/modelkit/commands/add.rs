//! `modelkit add` command

use anyhow::Result;

use crate::cli::AddArgs;
use crate::commands::{print_install_report, runtime, status, workspace};
use modelkit::ops::{add_dependency, install, AddOptions, InstallOptions};
use modelkit::GlobalContext;

pub fn execute(args: AddArgs, ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let opts = AddOptions {
        name: args.package,
        git_ref: args.git_ref,
        path: args.path,
        description: args.description,
    };

    let result = add_dependency(ws.manifest_path(), &opts)?;
    let verb = if result.replaced { "Updated" } else { "Added" };
    status(verb, format!("`{}` in model.yaml", result.name));

    if args.install {
        let ws = ws.reload()?;
        let install_opts = InstallOptions {
            cycle_policy: ctx.config().resolve.cycle_policy,
            ..Default::default()
        };
        let report = runtime()?.block_on(install(&ws, &ctx.fetcher(), &install_opts))?;
        print_install_report(ctx, &report);
    } else {
        eprintln!("note: run `modelkit install` to update model.lock");
    }
    Ok(())
}
