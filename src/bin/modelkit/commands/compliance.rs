//! `modelkit compliance` command

use anyhow::{bail, Result};

use crate::commands::{runtime, workspace};
use modelkit::ops::check_compliance;
use modelkit::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let fetcher = ctx.fetcher();

    let report = runtime()?.block_on(check_compliance(&ws, &fetcher))?;
    if report.is_compliant() {
        println!("compliant");
        return Ok(());
    }

    for violation in &report.violations {
        println!("violation: {}", violation);
    }
    bail!("{} compliance violations", report.violations.len());
}
