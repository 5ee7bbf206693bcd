//! Convergence helpers for long-running external operations.
//!
//! Two things in the engine wait on somebody else: the external scoring job
//! and the relation store acknowledging a soft-delete. Both are expressed as a
//! bounded [`PollPolicy`] driven by [`poll_until`] against an injected
//! [`Clock`], so tests can swap in [`InstantClock`].
//!
//! # Invariants
//!
//! - A poll never probes more than `max_attempts` times
//! - A poll never returns a value from a non-terminal probe
//! - Cancellation is observed between probes, never mid-probe

mod clock;
mod digest;
mod poll;

use std::time::Duration;

use thiserror::Error;

pub use clock::{Clock, InstantClock, TokioClock};
pub use digest::SetDigest;
pub use poll::{never_cancelled, poll_until, PollOutcome, PollPolicy};

/// Polling errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// The attempt bound was reached without a terminal state.
    #[error("{resource} did not finish after {attempts} attempts")]
    Timeout { resource: String, attempts: u32 },

    /// The remote side reported a terminal failure.
    #[error("{resource} failed: {description}")]
    Failed {
        resource: String,
        description: String,
    },

    /// The caller cancelled the wait.
    #[error("waiting for {resource} was cancelled")]
    Cancelled { resource: String },
}

impl PollError {
    /// Returns true for the attempt-bound error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Interval between scoring job status checks.
pub const SCORE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Status checks before a scoring job is abandoned (about 24h).
pub const SCORE_POLL_ATTEMPTS: u32 = 1_440;

/// Interval between soft-delete acknowledgement checks.
pub const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Acknowledgement checks before a soft-delete is considered stuck.
pub const DELETE_POLL_ATTEMPTS: u32 = 40;
