//! Setup command - prepare solver inputs for one committee.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use revassign_engine::features::ConflictPolicy;
use revassign_engine::model::Role;
use revassign_engine::{MatchingStatus, ScoreSource, SetupOptions};
use serde::Serialize;

use crate::output::{print_summary, print_warning};

use super::{CommandContext, Committee};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Conflicts {
    Default,
    Neurips,
}

impl From<Conflicts> for ConflictPolicy {
    fn from(conflicts: Conflicts) -> Self {
        match conflicts {
            Conflicts::Default => ConflictPolicy::Default,
            Conflicts::Neurips => ConflictPolicy::neurips(),
        }
    }
}

/// Setup command.
#[derive(Debug, Args)]
pub struct SetupCommand {
    /// Committee to prepare.
    #[arg(long, value_enum)]
    committee: Committee,

    /// Affinity scores as `work_item,candidate,score` lines.
    #[arg(long, conflicts_with = "compute_scores")]
    scores_file: Option<PathBuf>,

    /// Compute affinity scores with the scoring service.
    #[arg(long)]
    compute_scores: bool,

    /// Recompute conflicts with the given policy.
    #[arg(long, value_enum)]
    conflicts: Option<Conflicts>,
}

#[derive(Debug, Serialize)]
struct SetupSummary {
    committee: String,
    scores: Option<usize>,
    unresolved_score_keys: usize,
    scoring_job: Option<String>,
    conflicts: Option<usize>,
    transferred_conflicts: Option<usize>,
    capacity_overrides: usize,
    track_relations: usize,
    seniors: usize,
    no_profiles: Vec<String>,
    no_publications: Vec<String>,
}

impl SetupSummary {
    fn new(committee: String, status: &MatchingStatus) -> Self {
        Self {
            committee,
            scores: status.scores.as_ref().map(|s| s.created),
            unresolved_score_keys: status.scores.as_ref().map_or(0, |s| s.unresolved.len()),
            scoring_job: status
                .scores
                .as_ref()
                .and_then(|s| s.job.as_ref())
                .map(ToString::to_string),
            conflicts: status.conflicts.as_ref().map(|c| c.conflicts),
            transferred_conflicts: status.conflicts.as_ref().map(|c| c.transferred),
            capacity_overrides: status.capacities.overrides,
            track_relations: status.tracks.relations,
            seniors: status.seniors,
            no_profiles: status.no_profiles.clone(),
            no_publications: status.no_publications.clone(),
        }
    }
}

impl SetupCommand {
    pub async fn run(self, ctx: &CommandContext) -> Result<()> {
        let scores = match (&self.scores_file, self.compute_scores) {
            (Some(path), _) => ScoreSource::Stream(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read scores from {:?}", path))?,
            ),
            (None, true) => ScoreSource::Compute,
            (None, false) => ScoreSource::None,
        };
        let engine = if self.compute_scores {
            ctx.scoring_engine()?
        } else {
            ctx.engine()
        };

        let role = Role::from(self.committee);
        let options = SetupOptions {
            scores,
            conflicts: self.conflicts.map(ConflictPolicy::from),
        };
        let status = engine.setup(role, options).await?;

        let summary = SetupSummary::new(ctx.venue.committee_id(role).into_inner(), &status);
        if summary.unresolved_score_keys > 0 {
            print_warning(&format!(
                "{} score keys did not match any submission",
                summary.unresolved_score_keys
            ));
        }
        print_summary("Setup complete", &summary, ctx.format);
        Ok(())
    }
}
