//! `modelkit audit` command

use anyhow::{bail, Result};

use crate::commands::workspace;
use modelkit::ops::audit;
use modelkit::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let ws = workspace(ctx)?;
    let store = ctx.store();
    let report = audit(&ws, &store)?;

    for finding in &report.findings {
        println!("{}: {} {}", finding.kind.severity(), finding.key, finding.kind);
    }
    println!(
        "audited {} packages, {} findings",
        report.packages,
        report.findings.len()
    );

    if report.has_errors() {
        bail!("audit found corrupted cache entries; run `modelkit cache clear` and reinstall");
    }
    Ok(())
}
