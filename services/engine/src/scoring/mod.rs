//! External scoring service interface.
//!
//! The service computes affinity scores between a committee and the venue's
//! submissions as a long-running job:
//! - `submit_job` starts the job and returns its id
//! - `get_status` reports progress until a terminal state
//! - `get_results` returns the score triples once completed

mod http;

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use revassign_id::{GroupId, JobId};
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};

pub use http::HttpScoringService;

/// A scoring job request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    /// Human-readable job name.
    pub name: String,
    /// Committee whose members are scored.
    pub match_group: GroupId,
    /// Venue whose submissions are scored.
    pub venue_id: GroupId,
    pub model: String,
}

/// Status of a running job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl JobStatus {
    pub fn new(status: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            description: description.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.contains("Completed")
    }

    pub fn is_error(&self) -> bool {
        self.status.contains("Error")
    }
}

/// One score triple as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub submission: String,
    pub user: String,
    pub score: f64,
}

/// Members the service could not score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    #[serde(default)]
    pub no_profile: Vec<String>,
    #[serde(default)]
    pub no_publications: Vec<String>,
}

/// Results of a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResults {
    pub results: Vec<ScoreEntry>,
    #[serde(default)]
    pub metadata: ScoreMetadata,
}

/// The external scoring service.
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn submit_job(&self, request: &ScoringRequest) -> StoreResult<JobId>;

    async fn get_status(&self, job: &JobId) -> StoreResult<JobStatus>;

    async fn get_results(&self, job: &JobId) -> StoreResult<ScoreResults>;
}

/// Scripted scoring service for tests.
///
/// Status calls pop from the scripted sequence; once it runs out the last
/// status repeats.
#[derive(Debug, Default)]
pub struct MockScoringService {
    statuses: Mutex<VecDeque<JobStatus>>,
    last: Mutex<Option<JobStatus>>,
    results: ScoreResults,
    status_calls: Mutex<u32>,
    submitted: Mutex<Vec<ScoringRequest>>,
}

impl MockScoringService {
    pub fn new(statuses: Vec<JobStatus>, results: ScoreResults) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            results,
            ..Default::default()
        }
    }

    /// A job that completes on the first status check.
    pub fn completed(results: ScoreResults) -> Self {
        Self::new(vec![JobStatus::new("Completed", "")], results)
    }

    /// A job that never leaves the running state.
    pub fn stuck() -> Self {
        Self::new(vec![JobStatus::new("Running", "computing")], ScoreResults::default())
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.lock().map(|c| *c).unwrap_or(0)
    }

    pub fn submitted(&self) -> Vec<ScoringRequest> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("mock scoring service lock poisoned".to_string())
    }
}

#[async_trait]
impl ScoringService for MockScoringService {
    async fn submit_job(&self, request: &ScoringRequest) -> StoreResult<JobId> {
        let mut submitted = self.submitted.lock().map_err(|_| Self::poisoned())?;
        submitted.push(request.clone());
        JobId::parse(&format!("job-{}", submitted.len()))
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn get_status(&self, _job: &JobId) -> StoreResult<JobStatus> {
        *self.status_calls.lock().map_err(|_| Self::poisoned())? += 1;
        let next = self.statuses.lock().map_err(|_| Self::poisoned())?.pop_front();
        let mut last = self.last.lock().map_err(|_| Self::poisoned())?;
        if let Some(status) = next {
            *last = Some(status);
        }
        last.clone()
            .ok_or_else(|| StoreError::NotFound("no scripted job status".to_string()))
    }

    async fn get_results(&self, _job: &JobId) -> StoreResult<ScoreResults> {
        Ok(self.results.clone())
    }
}
