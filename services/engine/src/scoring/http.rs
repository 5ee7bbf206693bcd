//! HTTP client for the expertise scoring service.

use async_trait::async_trait;
use revassign_id::JobId;
use serde::Deserialize;
use tracing::{debug, error};

use super::{JobStatus, ScoreResults, ScoringRequest, ScoringService};
use crate::config::ScoringConfig;
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

/// Scoring service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpScoringService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScoringService {
    pub fn new(config: &ScoringConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response, what: &str) -> StoreResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Failed to {what}");
        Err(StoreError::Unavailable(format!("failed to {what}: {status} - {body}")))
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl ScoringService for HttpScoringService {
    async fn submit_job(&self, request: &ScoringRequest) -> StoreResult<JobId> {
        let url = format!("{}/expertise", self.base_url);
        debug!(url = %url, committee = %request.match_group, "Submitting scoring job");

        let response = self.client.post(&url).json(request).send().await.map_err(transport)?;
        let response = Self::check(response, "submit scoring job").await?;
        let body: SubmitResponse = response.json().await.map_err(transport)?;

        JobId::parse(&body.job_id).map_err(|e| StoreError::Corrupt(format!("job id: {e}")))
    }

    async fn get_status(&self, job: &JobId) -> StoreResult<JobStatus> {
        let url = format!("{}/expertise/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("jobId", job.as_str())])
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, "fetch job status").await?;
        let status: JobStatus = response.json().await.map_err(transport)?;
        debug!(job = %job, status = %status.status, "Fetched job status");
        Ok(status)
    }

    async fn get_results(&self, job: &JobId) -> StoreResult<ScoreResults> {
        let url = format!("{}/expertise/results", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("jobId", job.as_str())])
            .send()
            .await
            .map_err(transport)?;
        let response = Self::check(response, "fetch job results").await?;
        let results: ScoreResults = response.json().await.map_err(transport)?;
        debug!(job = %job, scores = results.results.len(), "Fetched job results");
        Ok(results)
    }
}
