//! Deploy command - turn labelled proposals into assignments.

use anyhow::Result;
use clap::Args;
use revassign_engine::model::Role;
use serde::Serialize;

use crate::output::{print_summary, print_warning};

use super::{CommandContext, Committee};

/// Deploy command.
#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Committee whose proposals are deployed.
    #[arg(long, value_enum)]
    committee: Committee,

    /// Label of the solver run to deploy.
    #[arg(long)]
    label: String,

    /// Replace existing assignments. Refused once reviews exist.
    #[arg(long)]
    overwrite: bool,

    /// Create the emergency group used for re-invitations.
    #[arg(long)]
    enable_reassignment: bool,
}

#[derive(Debug, Serialize)]
struct DeploySummary {
    label: String,
    committee: Option<String>,
    assignments: usize,
    work_items: usize,
    already_deployed: usize,
    removed: usize,
    missing: Vec<u32>,
    unmapped: Vec<String>,
    reassignment_seed: Option<String>,
}

impl DeployCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let role = Role::from(self.committee);
        let report = ctx
            .engine()
            .deploy(role, &self.label, self.overwrite, self.enable_reassignment)
            .await?;

        if !report.missing.is_empty() {
            print_warning(&format!(
                "{} submissions have no proposal labelled {:?}",
                report.missing.len(),
                self.label
            ));
        }
        let summary = DeploySummary {
            label: report.label,
            committee: report.committee.map(|g| g.into_inner()),
            assignments: report.assignments,
            work_items: report.work_items,
            already_deployed: report.already_deployed,
            removed: report.removed,
            missing: report.missing,
            unmapped: report.unmapped.into_iter().map(|c| c.into_inner()).collect(),
            reassignment_seed: report.reassignment_seed,
        };
        print_summary("Deployment complete", &summary, ctx.format);
        Ok(())
    }
}
