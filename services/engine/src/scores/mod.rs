//! Affinity score ingestion.
//!
//! Scores arrive either as an uploaded stream or from an external scoring
//! job. Both paths end in one total replace of the committee's
//! AffinityScore set, with carryover's pinned weights laid over the results.

mod stream;

use std::collections::BTreeSet;
use std::sync::Arc;

use revassign_id::{CandidateId, GroupId, JobId};
use revassign_reconcile::{poll_until, Clock, PollError, PollOutcome, PollPolicy};
use revassign_relations::{normalize_score, NewRelation, RelationKind, RelationScope};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::carryover::CarriedDecisions;
use crate::config::{EngineConfig, VenueContext};
use crate::conflicts::committee_members;
use crate::error::{EngineError, EngineResult};
use crate::model::{Role, WorkItem};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;
use crate::scoring::{ScoreResults, ScoringRequest, ScoringService};
use crate::store::Stores;

pub use stream::{parse_stream, resolve, ParsedScores, ScoreTriple};

/// What a score ingestion did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreReport {
    pub created: usize,
    pub malformed: usize,
    pub unresolved: BTreeSet<String>,
    pub no_profiles: Vec<String>,
    pub no_publications: Vec<String>,
    pub job: Option<JobId>,
}

/// Loads AffinityScore relations for one committee.
#[derive(Clone)]
pub struct ScoreIngestor {
    ctx: VenueContext,
    permissions: PermissionScope,
    poll: PollPolicy,
    model: String,
    retained_score: f64,
    clock: Arc<dyn Clock>,
}

impl ScoreIngestor {
    pub fn new(ctx: &VenueContext, role: Role, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            ctx: ctx.clone(),
            permissions: PermissionScope::for_role(ctx, role),
            poll: config.score_poll,
            model: config.scoring.model.clone(),
            retained_score: config.retained_score,
            clock,
        }
    }

    fn committee(&self) -> &GroupId {
        self.permissions.committee()
    }

    /// Overrides carried-over pairs with their pinned weight and adds the
    /// ones missing from `triples`.
    async fn pin_carried(
        &self,
        replacer: &BulkReplacer,
        work_items: &[WorkItem],
        mut triples: Vec<ScoreTriple>,
    ) -> EngineResult<Vec<ScoreTriple>> {
        let carried = CarriedDecisions::load(replacer, self.committee()).await?;
        if carried.is_empty() {
            return Ok(triples);
        }

        let mut covered = BTreeSet::new();
        for triple in &mut triples {
            if let Some(score) = carried.pinned_score(triple.work_item, &triple.candidate, self.retained_score) {
                triple.score = score;
                covered.insert((triple.work_item, triple.candidate.clone()));
            }
        }
        for (id, candidate) in carried.pairs() {
            if covered.contains(&(*id, candidate.clone())) {
                continue;
            }
            let Some(work_item) = work_items.iter().find(|w| w.id == *id) else {
                continue;
            };
            let Some(score) = carried.pinned_score(*id, candidate, self.retained_score) else {
                continue;
            };
            triples.push(ScoreTriple {
                work_item: work_item.id,
                number: work_item.number,
                candidate: candidate.clone(),
                score,
            });
        }
        debug!(pinned = covered.len(), "applied carried-over scores");
        Ok(triples)
    }

    fn relations(&self, triples: &[ScoreTriple]) -> EngineResult<Vec<NewRelation>> {
        triples
            .iter()
            .map(|t| -> EngineResult<NewRelation> {
                Ok(self
                    .permissions
                    .builder(&self.ctx, RelationKind::AffinityScore, t.work_item, &t.candidate, Some(t.number))
                    .weight(t.score)
                    .build()?)
            })
            .collect()
    }

    /// Replaces the committee's scores with the contents of a score stream.
    #[instrument(skip(self, stores, replacer, input), fields(committee = %self.committee(), bytes = input.len()))]
    pub async fn ingest_stream(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        input: &[u8],
    ) -> EngineResult<ScoreReport> {
        let work_items = stores.submissions.work_items().await?;
        let parsed = parse_stream(input, &work_items);
        for key in &parsed.unresolved {
            warn!(work_item = %key, "score line references unknown work item");
        }
        if parsed.malformed > 0 {
            warn!(malformed = parsed.malformed, "skipped malformed score lines");
        }

        let members = committee_members(stores, self.committee()).await?;
        let profiles = stores.profiles.get_profiles(&members).await?;
        let no_profiles = members
            .iter()
            .filter(|m| !profiles.iter().any(|p| &p.id == *m))
            .map(|m| m.to_string())
            .collect();
        let no_publications = profiles
            .iter()
            .filter(|p| p.publications.is_empty())
            .map(|p| p.id.to_string())
            .collect();

        let triples = self.pin_carried(replacer, &work_items, parsed.triples).await?;
        let relations = self.relations(&triples)?;
        let scope = RelationScope::new(self.committee().clone(), RelationKind::AffinityScore);
        let outcome = replacer.replace(&scope, relations).await?;
        info!(created = outcome.requested, "ingested score stream");

        Ok(ScoreReport {
            created: outcome.requested,
            malformed: parsed.malformed,
            unresolved: parsed.unresolved,
            no_profiles,
            no_publications,
            job: None,
        })
    }

    /// Runs an external scoring job to completion and replaces the
    /// committee's scores with its results.
    ///
    /// Waits at most `score_poll.max_attempts` status checks. Flipping
    /// `cancel` to `true` abandons the wait.
    #[instrument(skip(self, stores, replacer, service, cancel), fields(committee = %self.committee()))]
    pub async fn ingest_job(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        service: &dyn ScoringService,
        cancel: &mut watch::Receiver<bool>,
    ) -> EngineResult<ScoreReport> {
        let request = ScoringRequest {
            name: self.ctx.role_name(self.permissions.role()).to_string(),
            match_group: self.committee().clone(),
            venue_id: self.ctx.venue_id.clone(),
            model: self.model.clone(),
        };
        let job = service.submit_job(&request).await?;
        info!(job = %job, "submitted scoring job");

        let results = self.wait_for(service, &job, cancel).await?;
        let work_items = stores.submissions.work_items().await?;
        let parsed = transform(&results, &work_items);
        for key in &parsed.unresolved {
            warn!(job = %job, work_item = %key, "score result references unknown work item");
        }

        let triples = self.pin_carried(replacer, &work_items, parsed.triples).await?;
        let relations = self.relations(&triples)?;
        let scope = RelationScope::new(self.committee().clone(), RelationKind::AffinityScore);
        let outcome = replacer.replace(&scope, relations).await?;
        info!(job = %job, created = outcome.requested, "ingested scoring job results");

        Ok(ScoreReport {
            created: outcome.requested,
            malformed: parsed.malformed,
            unresolved: parsed.unresolved,
            no_profiles: results.metadata.no_profile,
            no_publications: results.metadata.no_publications,
            job: Some(job),
        })
    }

    async fn wait_for(
        &self,
        service: &dyn ScoringService,
        job: &JobId,
        cancel: &mut watch::Receiver<bool>,
    ) -> EngineResult<ScoreResults> {
        let resource = format!("scoring job {job}");
        let completed = poll_until(&self.poll, self.clock.as_ref(), cancel, &resource, |_| async move {
            let status = service.get_status(job).await?;
            Ok::<_, EngineError>(if status.is_completed() {
                PollOutcome::Ready(())
            } else if status.is_error() {
                PollOutcome::Failed(status.description)
            } else {
                PollOutcome::Pending
            })
        })
        .await;

        let committee = self.committee().clone();
        let job_name = job.to_string();
        match completed {
            Ok(()) => Ok(service.get_results(job).await?),
            Err(EngineError::Poll(PollError::Timeout { attempts, .. })) => Err(EngineError::ScoringTimeout {
                committee,
                job: job_name,
                attempts,
            }),
            Err(EngineError::Poll(PollError::Failed { description, .. })) => Err(EngineError::ScoringFailed {
                committee,
                job: job_name,
                description,
            }),
            Err(EngineError::Poll(PollError::Cancelled { .. })) => Err(EngineError::ScoringCancelled {
                committee,
                job: job_name,
            }),
            Err(other) => Err(other),
        }
    }
}

impl std::fmt::Debug for ScoreIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreIngestor")
            .field("committee", self.committee())
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

/// Resolves service results into score triples.
fn transform(results: &ScoreResults, work_items: &[WorkItem]) -> ParsedScores {
    let mut parsed = ParsedScores::default();
    for entry in &results.results {
        let Ok(candidate) = CandidateId::parse(entry.user.trim()) else {
            parsed.malformed += 1;
            continue;
        };
        if !entry.score.is_finite() {
            parsed.malformed += 1;
            continue;
        }
        let Some(work_item) = resolve(entry.submission.trim(), work_items) else {
            parsed.unresolved.insert(entry.submission.clone());
            continue;
        };
        parsed.triples.push(ScoreTriple {
            work_item: work_item.id,
            number: work_item.number,
            candidate,
            score: normalize_score(entry.score),
        });
    }
    parsed
}
