//! Engine error types.

use revassign_id::{CandidateId, GroupId};
use revassign_reconcile::PollError;
use revassign_relations::RelationError;
use thiserror::Error;

use crate::store::StoreError;

/// Fatal engine errors.
///
/// Anything listed here aborts the running operation. Recoverable problems
/// (missing profiles, unresolved score keys, work items without proposals)
/// are reported through the operation's report struct instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer relations were active after a bulk replace than were requested.
    #[error("bulk replace of {scope} left {active} active relations, expected at least {requested}")]
    CountMismatch {
        scope: String,
        requested: usize,
        active: usize,
    },

    /// A relation handed to a replace does not belong to its scope.
    #[error("relation {head} -> {tail} is outside scope {scope}")]
    OutOfScope {
        scope: String,
        head: String,
        tail: String,
    },

    /// The scoring service reported an error for the job.
    #[error("scoring job {job} for {committee} failed: {description}")]
    ScoringFailed {
        committee: GroupId,
        job: String,
        description: String,
    },

    /// The scoring job did not finish within the attempt bound.
    #[error("scoring job {job} for {committee} timed out after {attempts} status checks")]
    ScoringTimeout {
        committee: GroupId,
        job: String,
        attempts: u32,
    },

    /// The caller cancelled the scoring wait.
    #[error("scoring job {job} for {committee} was cancelled")]
    ScoringCancelled { committee: GroupId, job: String },

    /// A waited-on operation other than scoring did not converge.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// An overwrite deploy was requested after reviews were submitted.
    #[error("cannot overwrite {committee} assignments: {reviews} {stage} note(s) already submitted")]
    ReviewsExist {
        committee: GroupId,
        stage: String,
        reviews: usize,
    },

    /// The committee has no members.
    #[error("committee {0} has no members")]
    EmptyCommittee(GroupId),

    /// The venue has no active submissions.
    #[error("venue {0} has no submissions")]
    NoSubmissions(GroupId),

    /// A profile's emails are redacted, so conflicts cannot be computed.
    #[error("profile {0} has obfuscated emails; conflicts cannot be computed from redacted data")]
    ObfuscatedProfile(CandidateId),

    /// The committee is not one of the venue's roles.
    #[error("{0} is not a committee of this venue")]
    UnknownCommittee(GroupId),

    /// A relation failed validation.
    #[error("invalid relation: {0}")]
    InvalidRelation(#[from] RelationError),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Returns true if the error came from the external scoring job.
    pub fn is_scoring(&self) -> bool {
        matches!(
            self,
            Self::ScoringFailed { .. } | Self::ScoringTimeout { .. } | Self::ScoringCancelled { .. }
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
