//! Per-candidate capacity overrides.
//!
//! A CustomCapacity relation (head: the committee group) caps how many work
//! items the solver may give one candidate. Overrides only ever tighten on
//! sync; raising one goes through [`CapacityManager::set_override`].

use std::collections::HashMap;

use revassign_id::CandidateId;
use revassign_relations::{NewRelation, RelationKind, RelationScope, MAX_CUSTOM_CAPACITY};
use tracing::{debug, info, instrument, warn};

use crate::config::VenueContext;
use crate::conflicts::committee_members;
use crate::error::EngineResult;
use crate::model::{LoadResponse, Profile, Role};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;
use crate::store::Stores;

/// Status label of a retained prior-cycle assignment.
pub const REQUESTED_LABEL: &str = "Requested";

/// Capacity after applying a requested override to a prior one.
///
/// The lower value wins; either side alone is taken as is.
pub fn effective_capacity(prior: Option<u32>, requested: Option<u32>) -> Option<u32> {
    match (prior, requested) {
        (Some(prior), Some(requested)) => Some(prior.min(requested)),
        (prior, requested) => prior.or(requested),
    }
}

/// What a capacity sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityReport {
    pub overrides: usize,
    /// Overrides set from retained resubmissions rather than a load answer.
    pub compensated: usize,
    /// Load answers that matched no committee member.
    pub unmatched_responses: usize,
}

/// Maintains CustomCapacity relations for one committee.
#[derive(Debug, Clone)]
pub struct CapacityManager {
    ctx: VenueContext,
    permissions: PermissionScope,
}

impl CapacityManager {
    pub fn new(ctx: &VenueContext, role: Role) -> Self {
        Self {
            ctx: ctx.clone(),
            permissions: PermissionScope::for_role(ctx, role),
        }
    }

    fn scope(&self) -> RelationScope {
        RelationScope::new(self.permissions.committee().clone(), RelationKind::CustomCapacity)
    }

    /// Recomputes every override from the committee's load answers.
    #[instrument(skip(self, stores, replacer), fields(committee = %self.permissions.committee()))]
    pub async fn sync(&self, stores: &Stores, replacer: &BulkReplacer) -> EngineResult<CapacityReport> {
        let committee = self.permissions.committee().clone();
        let members = committee_members(stores, &committee).await?;
        let profiles: HashMap<CandidateId, Profile> = stores
            .profiles
            .get_profiles(&members)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let responses = stores.registrations.load_responses(&committee).await?;

        let prior: HashMap<CandidateId, u32> = replacer
            .read_active(&self.scope())
            .await?
            .into_iter()
            .filter_map(|r| Some((r.tail, weight_to_capacity(r.weight?))))
            .collect();
        let retained = self.retained_counts(replacer).await?;

        let mut report = CapacityReport::default();
        let mut matched = vec![false; responses.len()];
        let mut relations = Vec::new();
        for member in &members {
            let response = find_response(member, profiles.get(member), &responses);
            if let Some(index) = response {
                matched[index] = true;
            }
            let response = response.map(|i| &responses[i]);

            let capacity = match response {
                Some(r) if wants_compensation(r) => {
                    report.compensated += 1;
                    Some(retained.get(member).copied().unwrap_or(0))
                }
                _ => effective_capacity(
                    prior.get(member).copied(),
                    response.and_then(LoadResponse::requested).map(|c| c.min(MAX_CUSTOM_CAPACITY)),
                ),
            };

            if let Some(capacity) = capacity {
                relations.push(self.relation(member, capacity)?);
            }
        }

        report.overrides = relations.len();
        report.unmatched_responses = matched.iter().filter(|m| !**m).count();
        if report.unmatched_responses > 0 {
            warn!(
                unmatched = report.unmatched_responses,
                "load responses without a matching committee member"
            );
        }

        replacer.replace(&self.scope(), relations).await?;
        info!(
            overrides = report.overrides,
            compensated = report.compensated,
            "synced custom capacities"
        );
        Ok(report)
    }

    /// Recomputes the override of one candidate who is only available for
    /// resubmissions: one slot per retained prior-cycle assignment.
    ///
    /// Returns `None` (and writes nothing) for candidates that did not opt in.
    #[instrument(skip(self, stores, replacer), fields(committee = %self.permissions.committee(), candidate = %tail))]
    pub async fn compensate(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        tail: &CandidateId,
    ) -> EngineResult<Option<u32>> {
        let committee = self.permissions.committee();
        let responses = stores.registrations.load_responses(committee).await?;
        let profile = stores.profiles.get_profile(tail).await?;
        let Some(index) = find_response(tail, profile.as_ref(), &responses) else {
            return Ok(None);
        };
        if !wants_compensation(&responses[index]) {
            return Ok(None);
        }

        let retained = self.retained_counts(replacer).await?;
        let capacity = retained.get(tail).copied().unwrap_or(0);
        let scope = self.scope().with_tail(tail.clone());
        replacer.replace(&scope, vec![self.relation(tail, capacity)?]).await?;
        debug!(capacity, "applied resubmission compensation");
        Ok(Some(capacity))
    }

    /// Sets an override without the tighten-only rule.
    pub async fn set_override(
        &self,
        replacer: &BulkReplacer,
        tail: &CandidateId,
        capacity: u32,
    ) -> EngineResult<()> {
        let scope = self.scope().with_tail(tail.clone());
        replacer.replace(&scope, vec![self.relation(tail, capacity)?]).await?;
        info!(candidate = %tail, capacity, "set capacity override");
        Ok(())
    }

    /// Effective capacity of one candidate: the override, else the venue default.
    pub async fn capacity_for(&self, replacer: &BulkReplacer, tail: &CandidateId) -> EngineResult<u32> {
        let scope = self.scope().with_tail(tail.clone());
        Ok(replacer
            .read_active(&scope)
            .await?
            .into_iter()
            .filter_map(|r| r.weight.map(weight_to_capacity))
            .min()
            .unwrap_or(self.ctx.default_max_papers))
    }

    /// Active "Requested" Status relations per candidate in this committee.
    async fn retained_counts(&self, replacer: &BulkReplacer) -> EngineResult<HashMap<CandidateId, u32>> {
        let scope = RelationScope::new(self.permissions.committee().clone(), RelationKind::Status)
            .with_label(REQUESTED_LABEL);
        let mut counts = HashMap::new();
        for relation in replacer.read_active(&scope).await? {
            *counts.entry(relation.tail).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn relation(&self, tail: &CandidateId, capacity: u32) -> EngineResult<NewRelation> {
        Ok(self
            .permissions
            .builder(
                &self.ctx,
                RelationKind::CustomCapacity,
                self.permissions.committee().clone(),
                tail,
                None,
            )
            .weight(f64::from(capacity.min(MAX_CUSTOM_CAPACITY)))
            .build()?)
    }
}

fn wants_compensation(response: &LoadResponse) -> bool {
    response.resubmissions_only && response.requested() == Some(0)
}

fn weight_to_capacity(weight: f64) -> u32 {
    weight.clamp(0.0, f64::from(MAX_CUSTOM_CAPACITY)) as u32
}

/// Index of the response signed with any of the member's signatures.
fn find_response(member: &CandidateId, profile: Option<&Profile>, responses: &[LoadResponse]) -> Option<usize> {
    let mut signatures: Vec<String> = vec![member.as_str().to_lowercase()];
    if let Some(profile) = profile {
        signatures.extend(profile.signatures().map(str::to_lowercase));
    }
    responses
        .iter()
        .position(|r| signatures.contains(&r.signature.trim().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::InMemoryStore;
    use revassign_id::{GroupId, WorkItemId};
    use revassign_reconcile::InstantClock;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[case(Some(6), Some(8), Some(6))]
    #[case(Some(6), Some(4), Some(4))]
    #[case(None, Some(4), Some(4))]
    #[case(Some(6), None, Some(6))]
    #[case(None, None, None)]
    fn test_effective_capacity_only_tightens(
        #[case] prior: Option<u32>,
        #[case] requested: Option<u32>,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(effective_capacity(prior, requested), expected);
    }

    fn ctx() -> VenueContext {
        VenueContext::new(GroupId::parse("ACL/2025").unwrap())
    }

    async fn setup(responses: Vec<LoadResponse>) -> (Arc<InMemoryStore>, Stores, BulkReplacer) {
        let ctx = ctx();
        let committee = ctx.committee_id(Role::Reviewer);
        let store = Arc::new(InMemoryStore::new());
        store
            .update(|s| {
                s.add_members(&committee, ["~Ada1", "~Bob1"]);
                let mut ada = Profile::new(CandidateId::parse("~Ada1").unwrap());
                ada.confirmed_emails = vec!["ada@umass.edu".into()];
                s.profiles.push(ada);
                s.load_responses.insert(committee.clone(), responses);
            })
            .await;
        let replacer = BulkReplacer::new(store.clone(), Arc::new(InstantClock::new()), &EngineConfig::default());
        (store.clone(), Stores::shared(store), replacer)
    }

    fn response(signature: &str, load: u32) -> LoadResponse {
        LoadResponse {
            signature: signature.into(),
            reduced_load: Some(load),
            max_load_this_cycle: None,
            resubmissions_only: false,
        }
    }

    #[tokio::test]
    async fn test_sync_never_loosens_an_override() {
        let (store, stores, replacer) = setup(vec![response("ada@umass.edu", 6)]).await;
        let manager = CapacityManager::new(&ctx(), Role::Reviewer);
        let ada = CandidateId::parse("~Ada1").unwrap();
        let bob = CandidateId::parse("~Bob1").unwrap();

        manager.sync(&stores, &replacer).await.unwrap();
        assert_eq!(manager.capacity_for(&replacer, &ada).await.unwrap(), 6);
        assert_eq!(manager.capacity_for(&replacer, &bob).await.unwrap(), 25);

        let committee = ctx().committee_id(Role::Reviewer);
        store
            .update(|s| {
                s.load_responses.insert(committee.clone(), vec![response("ada@umass.edu", 8)]);
            })
            .await;
        manager.sync(&stores, &replacer).await.unwrap();
        assert_eq!(manager.capacity_for(&replacer, &ada).await.unwrap(), 6);

        store
            .update(|s| {
                s.load_responses.insert(committee, vec![response("ADA@umass.edu", 4)]);
            })
            .await;
        manager.sync(&stores, &replacer).await.unwrap();
        assert_eq!(manager.capacity_for(&replacer, &ada).await.unwrap(), 4);

        manager.set_override(&replacer, &ada, 10).await.unwrap();
        assert_eq!(manager.capacity_for(&replacer, &ada).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_resubmission_only_capacity_counts_retained_items() {
        let mut only_resubmissions = response("~Bob1", 0);
        only_resubmissions.resubmissions_only = true;
        let (_store, stores, replacer) = setup(vec![only_resubmissions]).await;
        let manager = CapacityManager::new(&ctx(), Role::Reviewer);
        let bob = CandidateId::parse("~Bob1").unwrap();

        let report = manager.sync(&stores, &replacer).await.unwrap();
        assert_eq!(report.compensated, 1);
        assert_eq!(manager.capacity_for(&replacer, &bob).await.unwrap(), 0);

        let permissions = PermissionScope::for_role(&ctx(), Role::Reviewer);
        let committee = ctx().committee_id(Role::Reviewer);
        let status = permissions
            .builder(&ctx(), RelationKind::Status, WorkItemId::new(), &bob, Some(1))
            .label(REQUESTED_LABEL)
            .build()
            .unwrap();
        replacer
            .insert(&RelationScope::new(committee, RelationKind::Status), vec![status])
            .await
            .unwrap();

        assert_eq!(manager.compensate(&stores, &replacer, &bob).await.unwrap(), Some(1));
        assert_eq!(manager.capacity_for(&replacer, &bob).await.unwrap(), 1);

        let ada = CandidateId::parse("~Ada1").unwrap();
        assert_eq!(manager.compensate(&stores, &replacer, &ada).await.unwrap(), None);
    }
}
