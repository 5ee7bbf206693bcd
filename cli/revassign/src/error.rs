//! Error handling and display for the CLI.

use std::path::PathBuf;

use colored::Colorize;
use revassign_engine::EngineError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("State file not found: {0}")]
    StateNotFound(PathBuf),

    #[error("Invalid venue file {path}: {message}")]
    InvalidVenue { path: PathBuf, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::StateNotFound(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Pass --state pointing at an exported venue snapshot.".yellow()
                );
            }
            CliError::InvalidVenue { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: The venue file needs at least `venue_id = \"...\"`.".yellow()
                );
            }
            CliError::InvalidArgument(_) => {}
        }
        return;
    }

    if let Some(engine_err) = err.downcast_ref::<EngineError>() {
        let hint = match engine_err {
            EngineError::ReviewsExist { .. } => {
                Some("Hint: Reviews were already submitted; deploy without --overwrite.")
            }
            EngineError::ScoringTimeout { .. } => {
                Some("Hint: The scoring job may still finish; rerun setup later or pass --scores-file.")
            }
            EngineError::ScoringFailed { .. } => {
                Some("Hint: Check the scoring service logs, or pass --scores-file.")
            }
            EngineError::CountMismatch { .. } => {
                Some("Hint: The store accepted fewer relations than sent; rerunning is safe.")
            }
            EngineError::EmptyCommittee(_) => {
                Some("Hint: Add committee members before running setup.")
            }
            EngineError::ObfuscatedProfile(_) => {
                Some("Hint: Conflicts need unredacted emails; run with full profile access.")
            }
            _ => None,
        };
        if let Some(hint) = hint {
            eprintln!("\n{}", hint.yellow());
        }
    }
}
