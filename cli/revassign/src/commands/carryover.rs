//! Carryover command - apply prior-cycle decisions to resubmissions.

use anyhow::Result;
use clap::Args;
use revassign_id::WorkItemId;
use serde::Serialize;

use crate::error::CliError;
use crate::output::print_summary;

use super::CommandContext;

/// Carryover command.
#[derive(Debug, Args)]
pub struct CarryoverCommand {
    /// Work items to process (default: every resubmission).
    #[arg(long = "work-item")]
    work_items: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CarryoverSummary {
    work_items: usize,
    reassigned: usize,
    retained: usize,
    compensated: usize,
    skipped: Vec<String>,
}

impl CarryoverCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let ids = self
            .work_items
            .iter()
            .map(|raw| {
                raw.parse::<WorkItemId>()
                    .map_err(|e| CliError::InvalidArgument(format!("work item {raw:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let report = ctx.engine().carryover(&ids).await?;
        let summary = CarryoverSummary {
            work_items: report.work_items,
            reassigned: report.reassigned,
            retained: report.retained,
            compensated: report.compensated,
            skipped: report.skipped,
        };
        print_summary("Carryover complete", &summary, ctx.format);
        Ok(())
    }
}
