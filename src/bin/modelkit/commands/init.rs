//! `modelkit init` command

use anyhow::{Context, Result};

use crate::cli::InitArgs;
use crate::commands::status;
use modelkit::ops::init_project;
use modelkit::GlobalContext;

pub fn execute(args: InitArgs, ctx: &GlobalContext) -> Result<()> {
    let path = match args.path {
        Some(p) if p.is_absolute() => p,
        Some(p) => ctx.cwd().join(p),
        None => ctx.cwd().to_path_buf(),
    };

    let name = match args.name {
        Some(name) => name,
        None => path
            .canonicalize()
            .unwrap_or_else(|_| path.clone())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a model name from the directory; pass --name")?,
    };

    init_project(&path, &name)?;
    status("Created", format!("model `{}` in {}", name, path.display()));
    Ok(())
}
