//! Engine façade: the operations exposed to management callers.

use std::sync::Arc;

use revassign_id::{CandidateId, InvocationId, WorkItemId};
use revassign_reconcile::{never_cancelled, Clock};
use revassign_relations::{Relation, RelationScope};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::capacity::{CapacityManager, CapacityReport};
use crate::carryover::{CarryoverReport, ReassignmentCarryover};
use crate::config::{EngineConfig, VenueContext};
use crate::conflicts::{committee_members, ConflictDetector, ConflictReport};
use crate::deploy::{DeployReport, DeploymentCoordinator};
use crate::error::{EngineError, EngineResult};
use crate::features::ConflictPolicy;
use crate::model::Role;
use crate::replace::BulkReplacer;
use crate::scores::{ScoreIngestor, ScoreReport};
use crate::scoring::ScoringService;
use crate::seniority::SenioritySync;
use crate::store::{StoreError, Stores};
use crate::tracks::{TrackReport, TrackSync};

/// Where setup takes affinity scores from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScoreSource {
    /// Leave scores untouched.
    #[default]
    None,
    /// A `work_item,candidate,score` stream.
    Stream(Vec<u8>),
    /// Run a job on the scoring service.
    Compute,
}

/// What `setup` should compute besides capacities, tracks and seniority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOptions {
    pub scores: ScoreSource,
    /// `None` leaves conflicts untouched.
    pub conflicts: Option<ConflictPolicy>,
}

/// Summary returned by `setup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchingStatus {
    pub no_profiles: Vec<String>,
    pub no_publications: Vec<String>,
    #[serde(skip)]
    pub scores: Option<ScoreReport>,
    #[serde(skip)]
    pub conflicts: Option<ConflictReport>,
    #[serde(skip)]
    pub capacities: CapacityReport,
    #[serde(skip)]
    pub tracks: TrackReport,
    pub seniors: usize,
}

/// The assignment and conflict engine for one venue.
pub struct AssignmentEngine {
    ctx: VenueContext,
    config: EngineConfig,
    stores: Stores,
    clock: Arc<dyn Clock>,
    replacer: BulkReplacer,
    deployer: DeploymentCoordinator,
    scoring: Option<Arc<dyn ScoringService>>,
    cancel: watch::Receiver<bool>,
}

impl AssignmentEngine {
    pub fn new(ctx: VenueContext, config: EngineConfig, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let replacer = BulkReplacer::new(stores.relations.clone(), clock.clone(), &config);
        let deployer = DeploymentCoordinator::new(&ctx, &config);
        Self {
            ctx,
            config,
            stores,
            clock,
            replacer,
            deployer,
            scoring: None,
            cancel: never_cancelled(),
        }
    }

    #[must_use]
    pub fn with_scoring(mut self, service: Arc<dyn ScoringService>) -> Self {
        self.scoring = Some(service);
        self
    }

    /// Cancels a running scoring wait once `cancel` turns true.
    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_invocation(mut self, invocation: InvocationId) -> Self {
        self.replacer = self.replacer.with_invocation(invocation);
        self
    }

    pub fn context(&self) -> &VenueContext {
        &self.ctx
    }

    pub fn replacer(&self) -> &BulkReplacer {
        &self.replacer
    }

    fn current_year(&self) -> i32 {
        self.config.current_year()
    }

    /// Prepares solver inputs for one committee: scores, conflicts, custom
    /// capacities, tracks and seniority.
    ///
    /// Each relation kind is replaced independently; a failure stops the
    /// remaining steps but keeps those already done.
    #[instrument(skip(self, options), fields(venue = %self.ctx.venue_id, role = %role))]
    pub async fn setup(&self, role: Role, options: SetupOptions) -> EngineResult<MatchingStatus> {
        let committee = self.ctx.committee_id(role);
        if !self.ctx.has_role(role) {
            return Err(EngineError::UnknownCommittee(committee));
        }
        let members = committee_members(&self.stores, &committee).await?;
        if members.is_empty() {
            return Err(EngineError::EmptyCommittee(committee));
        }
        if self.stores.submissions.work_items().await?.is_empty() {
            return Err(EngineError::NoSubmissions(self.ctx.venue_id.clone()));
        }

        let mut status = MatchingStatus::default();
        let ingestor = ScoreIngestor::new(&self.ctx, role, &self.config, self.clock.clone());
        let scores = match options.scores {
            ScoreSource::None => None,
            ScoreSource::Stream(bytes) => Some(ingestor.ingest_stream(&self.stores, &self.replacer, &bytes).await?),
            ScoreSource::Compute => {
                let service = self.scoring.as_deref().ok_or_else(|| {
                    StoreError::Unavailable("no scoring service configured".to_string())
                })?;
                let mut cancel = self.cancel.clone();
                Some(
                    ingestor
                        .ingest_job(&self.stores, &self.replacer, service, &mut cancel)
                        .await?,
                )
            }
        };
        if let Some(report) = &scores {
            status.no_profiles = report.no_profiles.clone();
            status.no_publications = report.no_publications.clone();
        }
        status.scores = scores;

        if let Some(policy) = options.conflicts {
            let detector = ConflictDetector::new(&self.ctx, role, policy, self.current_year());
            let report = detector.run(&self.stores, &self.replacer).await?;
            if status.scores.is_none() {
                status.no_profiles = report.no_profiles.iter().map(CandidateId::to_string).collect();
            }
            status.conflicts = Some(report);
        }

        status.capacities = CapacityManager::new(&self.ctx, role)
            .sync(&self.stores, &self.replacer)
            .await?;
        status.tracks = TrackSync::new(&self.ctx, role)
            .sync_tracks(&self.stores, &self.replacer)
            .await?;

        let profiles = self.stores.profiles.get_profiles(&members).await?;
        status.seniors = SenioritySync::new(&self.ctx, role, self.config.seniority, self.current_year())
            .sync_seniority(&self.replacer, &profiles)
            .await?;

        info!(
            committee = %committee,
            no_profiles = status.no_profiles.len(),
            no_publications = status.no_publications.len(),
            "setup complete"
        );
        Ok(status)
    }

    /// Deploys the proposals of `role` tagged `label`.
    pub async fn deploy(
        &self,
        role: Role,
        label: &str,
        overwrite: bool,
        enable_reassignment: bool,
    ) -> EngineResult<DeployReport> {
        if !self.ctx.has_role(role) {
            return Err(EngineError::UnknownCommittee(self.ctx.committee_id(role)));
        }
        self.deployer
            .deploy(&self.stores, &self.replacer, role, label, overwrite, enable_reassignment)
            .await
    }

    /// Carries prior-cycle decisions over to `work_items` (all resubmissions
    /// if empty).
    pub async fn carryover(&self, work_items: &[WorkItemId]) -> EngineResult<CarryoverReport> {
        ReassignmentCarryover::new(&self.ctx, &self.config)
            .carryover(&self.stores, &self.replacer, work_items)
            .await
    }

    /// Active relations in `scope`.
    pub async fn relations(&self, scope: &RelationScope) -> EngineResult<Vec<Relation>> {
        self.replacer.read_active(scope).await
    }
}

impl std::fmt::Debug for AssignmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentEngine")
            .field("venue", &self.ctx.venue_id)
            .field("scoring", &self.scoring.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkItem;
    use crate::store::InMemoryStore;
    use revassign_id::GroupId;
    use revassign_reconcile::InstantClock;

    fn engine(store: Arc<InMemoryStore>) -> AssignmentEngine {
        let ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        AssignmentEngine::new(
            ctx,
            EngineConfig::default(),
            Stores::shared(store),
            Arc::new(InstantClock::new()),
        )
    }

    #[tokio::test]
    async fn test_setup_requires_members_and_submissions() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone());

        let err = engine.setup(Role::Reviewer, SetupOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyCommittee(_)));

        let committee = engine.context().committee_id(Role::Reviewer);
        store.update(|s| s.add_members(&committee, ["~Ada1"])).await;
        let err = engine.setup(Role::Reviewer, SetupOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::NoSubmissions(_)));

        let err = engine
            .setup(Role::SeniorAreaChair, SetupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCommittee(_)));
    }

    #[tokio::test]
    async fn test_compute_without_scoring_service_fails() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone());
        let committee = engine.context().committee_id(Role::Reviewer);
        store
            .update(|s| {
                s.add_members(&committee, ["~Ada1"]);
                s.work_items.push(WorkItem {
                    id: WorkItemId::new(),
                    number: 1,
                    authors: Vec::new(),
                    track: None,
                    previous: None,
                    reassignment: Default::default(),
                });
            })
            .await;
        let options = SetupOptions {
            scores: ScoreSource::Compute,
            conflicts: None,
        };
        let err = engine.setup(Role::Reviewer, options).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));
    }
}
