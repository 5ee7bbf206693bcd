//! CLI commands.

mod carryover;
mod deploy;
mod relations;
mod setup;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use revassign_engine::config::{EngineConfig, VenueContext};
use revassign_engine::model::Role;
use revassign_engine::scoring::HttpScoringService;
use revassign_engine::store::Stores;
use revassign_engine::AssignmentEngine;
use revassign_id::InvocationId;
use revassign_reconcile::TokioClock;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::output::OutputFormat;
use crate::state::{load_venue, StateFile};

/// revassign - prepare, deploy and carry over reviewer assignments.
#[derive(Debug, Parser)]
#[command(name = "revassign")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// JSON state snapshot to operate on.
    #[arg(long, global = true, env = "REVASSIGN_STATE", default_value = "state.json")]
    state: PathBuf,

    /// Venue settings (TOML).
    #[arg(long, global = true, env = "REVASSIGN_VENUE", default_value = "venue.toml")]
    venue: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute scores, conflicts, capacities, tracks and seniority for a committee.
    Setup(setup::SetupCommand),

    /// Deploy the solver's proposed assignments.
    Deploy(deploy::DeployCommand),

    /// Carry prior-cycle reviewers and area chairs over to resubmissions.
    Carryover(carryover::CarryoverCommand),

    /// List active relations.
    Relations(relations::RelationsCommand),

    /// Show CLI version.
    Version,
}

/// Committee selector shared by the subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Committee {
    Reviewers,
    AreaChairs,
    SeniorAreaChairs,
    EthicsReviewers,
}

impl From<Committee> for Role {
    fn from(committee: Committee) -> Self {
        match committee {
            Committee::Reviewers => Role::Reviewer,
            Committee::AreaChairs => Role::AreaChair,
            Committee::SeniorAreaChairs => Role::SeniorAreaChair,
            Committee::EthicsReviewers => Role::EthicsReviewer,
        }
    }
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, config: EngineConfig) -> Result<()> {
        if let Commands::Version = self.command {
            println!("revassign {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let venue = load_venue(&self.venue)?;
        let state = StateFile::open(&self.state).await?;
        let ctx = CommandContext {
            venue,
            config,
            state,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Setup(cmd) => cmd.run(&ctx).await?,
            Commands::Deploy(cmd) => cmd.run(&ctx).await?,
            Commands::Carryover(cmd) => cmd.run(&ctx).await?,
            Commands::Relations(cmd) => return cmd.run(&ctx).await,
            Commands::Version => return Ok(()),
        }
        ctx.state.save().await
    }
}

/// Shared command context.
pub struct CommandContext {
    pub venue: VenueContext,
    pub config: EngineConfig,
    pub state: StateFile,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Builds an engine over the loaded state, tagging writes with a fresh
    /// invocation id.
    pub fn engine(&self) -> AssignmentEngine {
        let invocation = InvocationId::new();
        info!(invocation = %invocation, venue = %self.venue.venue_id, "starting engine");
        AssignmentEngine::new(
            self.venue.clone(),
            self.config.clone(),
            Stores::shared(self.state.store()),
            Arc::new(TokioClock),
        )
        .with_invocation(invocation)
    }

    /// An engine that can run scoring jobs; Ctrl+C cancels the wait.
    pub fn scoring_engine(&self) -> Result<AssignmentEngine> {
        let service = HttpScoringService::new(&self.config.scoring)?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling scoring wait");
                let _ = cancel_tx.send(true);
            }
        });
        Ok(self
            .engine()
            .with_scoring(Arc::new(service))
            .with_cancel(cancel_rx))
    }
}
