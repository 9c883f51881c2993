//! `modelkit validate` command

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::commands::{runtime, workspace};
use modelkit::ops::validate;
use modelkit::util::diagnostic::emit;
use modelkit::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let fetcher = Arc::new(ctx.fetcher());

    let report = runtime()?.block_on(validate(&ws, fetcher))?;
    for check in &report.checks {
        let mark = if check.passed { "[OK]" } else { "[!!]" };
        println!("{} {}: {}", mark, check.name, check.message);
    }
    for failed in report.failures() {
        if let Some(diag) = &failed.diagnostic {
            emit(diag, ctx.color());
        }
    }

    if !report.is_ok() {
        bail!("validation failed");
    }
    Ok(())
}
