//! Carrying prior-cycle reviewers and area chairs over to resubmissions.
//!
//! For each resubmitted work item and each of the reviewer and area chair
//! roles, the prior work item's committee is resolved to real profile ids
//! and every member is either reassigned (the author asked for new people)
//! or retained. All writes are per-head total replaces, so running the pass
//! again for the same work item converges to the same relations.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use revassign_id::{CandidateId, GroupId, WorkItemId};
use revassign_relations::{RelationKind, RelationScope};
use tracing::{debug, info, instrument, warn};

use crate::capacity::{CapacityManager, REQUESTED_LABEL};
use crate::config::{EngineConfig, VenueContext};
use crate::conflicts::committee_members;
use crate::error::EngineResult;
use crate::model::{PriorSubmission, ReassignmentChoice, Role, WorkItem};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;
use crate::store::Stores;
use crate::tracks::TrackSync;

/// Status label of a prior-cycle member the authors asked to replace.
pub const REASSIGNED_LABEL: &str = "Reassigned";

/// Roles carried over from a prior cycle.
const CARRIED_ROLES: [Role; 2] = [Role::Reviewer, Role::AreaChair];

/// What a carryover pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryoverReport {
    /// Resubmitted work items processed.
    pub work_items: usize,
    pub reassigned: usize,
    pub retained: usize,
    /// Candidates whose capacity was recomputed for retained work.
    pub compensated: usize,
    /// Prior members that could not be resolved to a current committee member.
    pub skipped: Vec<String>,
}

/// Resolved intent for one prior member.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Decision {
    candidate: CandidateId,
    reassign: bool,
}

/// Carryover decisions already recorded in a committee's Status relations.
///
/// Committee-wide Track and AffinityScore replaces consult this so that a
/// later setup keeps what carryover wrote for resubmissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarriedDecisions {
    /// `true` when the candidate was reassigned away from the work item.
    reassigned: BTreeMap<(WorkItemId, CandidateId), bool>,
}

impl CarriedDecisions {
    /// Reads the active Reassigned and Requested statuses of `committee`.
    pub async fn load(replacer: &BulkReplacer, committee: &GroupId) -> EngineResult<Self> {
        let scope = RelationScope::new(committee.clone(), RelationKind::Status);
        let mut reassigned = BTreeMap::new();
        for status in replacer.read_active(&scope).await? {
            let Some(work_item) = status.head.work_item() else {
                continue;
            };
            let reassign = match status.label.as_deref() {
                Some(REASSIGNED_LABEL) => true,
                Some(REQUESTED_LABEL) => false,
                _ => continue,
            };
            reassigned.insert((work_item, status.tail), reassign);
        }
        Ok(Self { reassigned })
    }

    pub fn is_empty(&self) -> bool {
        self.reassigned.is_empty()
    }

    /// Candidates reassigned away from `work_item`.
    pub fn reassigned_from(&self, work_item: WorkItemId) -> BTreeSet<CandidateId> {
        self.reassigned
            .iter()
            .filter(|((id, _), reassign)| *id == work_item && **reassign)
            .map(|((_, candidate), _)| candidate.clone())
            .collect()
    }

    /// The affinity carryover pinned for a pair, if any.
    pub fn pinned_score(&self, work_item: WorkItemId, candidate: &CandidateId, retained_score: f64) -> Option<f64> {
        self.reassigned
            .get(&(work_item, candidate.clone()))
            .map(|reassign| if *reassign { 0.0 } else { retained_score })
    }

    /// Every recorded (work item, candidate) pair.
    pub fn pairs(&self) -> impl Iterator<Item = &(WorkItemId, CandidateId)> {
        self.reassigned.keys()
    }
}

/// Applies prior-cycle decisions to resubmitted work items.
#[derive(Debug, Clone)]
pub struct ReassignmentCarryover {
    ctx: VenueContext,
    retained_score: f64,
}

impl ReassignmentCarryover {
    pub fn new(ctx: &VenueContext, config: &EngineConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            retained_score: config.retained_score,
        }
    }

    /// Runs carryover for `work_items`, or for every resubmission if empty.
    #[instrument(skip(self, stores, replacer, work_items), fields(venue = %self.ctx.venue_id, requested = work_items.len()))]
    pub async fn carryover(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        work_items: &[WorkItemId],
    ) -> EngineResult<CarryoverReport> {
        let selected: Vec<WorkItem> = stores
            .submissions
            .work_items()
            .await?
            .into_iter()
            .filter(|w| work_items.is_empty() || work_items.contains(&w.id))
            .collect();
        for id in work_items {
            if !selected.iter().any(|w| &w.id == id) {
                warn!(work_item = %id, "carryover requested for unknown work item");
            }
        }

        let mut report = CarryoverReport::default();
        for role in CARRIED_ROLES.into_iter().filter(|r| self.ctx.has_role(*r)) {
            let committee = self.ctx.committee_id(role);
            let members: HashSet<CandidateId> = committee_members(stores, &committee).await?.into_iter().collect();
            let mut compensate: BTreeSet<CandidateId> = BTreeSet::new();

            for work_item in &selected {
                let Some(previous) = &work_item.previous else {
                    continue;
                };
                let choice = match role {
                    Role::AreaChair => work_item.reassignment.area_chair,
                    _ => work_item.reassignment.reviewers,
                };
                if choice == ReassignmentChoice::NotApplicable {
                    debug!(work_item = %work_item.id, role = %role, "not a resubmission for this role");
                    continue;
                }

                let (prior_group, prior_members) = self.prior_members(stores, previous, role).await?;
                let mut decisions = Vec::new();
                for member in prior_members {
                    match self.resolve(stores, previous, &member).await? {
                        Some(candidate) if members.contains(&candidate) => decisions.push(Decision {
                            candidate,
                            reassign: choice == ReassignmentChoice::WantsNew,
                        }),
                        _ => {
                            debug!(member = %member, "prior member not in current committee");
                            report.skipped.push(member);
                        }
                    }
                }

                self.apply(stores, replacer, role, work_item, &prior_group, &decisions)
                    .await?;
                for decision in &decisions {
                    if decision.reassign {
                        report.reassigned += 1;
                    } else {
                        report.retained += 1;
                        compensate.insert(decision.candidate.clone());
                    }
                }
            }

            let capacity = CapacityManager::new(&self.ctx, role);
            for candidate in &compensate {
                if capacity.compensate(stores, replacer, candidate).await?.is_some() {
                    report.compensated += 1;
                }
            }
        }

        report.work_items = selected.iter().filter(|w| w.previous.is_some()).count();
        info!(
            work_items = report.work_items,
            reassigned = report.reassigned,
            retained = report.retained,
            skipped = report.skipped.len(),
            "carried over prior assignments"
        );
        Ok(report)
    }

    /// Prior committee group of `role` and its members.
    ///
    /// Reviewers come from the prior `Submitted` group when it exists, so
    /// only reviewers who actually reviewed are carried over.
    async fn prior_members(
        &self,
        stores: &Stores,
        previous: &PriorSubmission,
        role: Role,
    ) -> EngineResult<(GroupId, Vec<String>)> {
        let group = self
            .ctx
            .work_item_group_in(&previous.venue, previous.number)
            .join(self.ctx.role_name(role));

        if role == Role::Reviewer {
            let submitted = group.join(&self.ctx.submitted_name);
            if let Some(members) = stores.groups.get_members(&submitted).await? {
                return Ok((group, members));
            }
        }
        match stores.groups.get_members(&group).await? {
            Some(members) => Ok((group, members)),
            None => {
                warn!(group = %group, "prior committee group not found");
                Ok((group, Vec::new()))
            }
        }
    }

    /// Maps a prior member to a profile id, following anonymous groups.
    async fn resolve(
        &self,
        stores: &Stores,
        previous: &PriorSubmission,
        member: &str,
    ) -> EngineResult<Option<CandidateId>> {
        let mut member = member.to_string();
        if member.starts_with(previous.venue.as_str()) {
            let Ok(anonymous) = GroupId::parse(&member) else {
                return Ok(None);
            };
            match stores.groups.get_members(&anonymous).await?.and_then(|m| m.into_iter().next()) {
                Some(real) => member = real,
                None => return Ok(None),
            }
        }
        Ok(CandidateId::parse(&member).ok().filter(CandidateId::is_profile_id))
    }

    /// Writes the scores, statuses, tracks and group grants of one work item.
    async fn apply(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        role: Role,
        work_item: &WorkItem,
        prior_group: &GroupId,
        decisions: &[Decision],
    ) -> EngineResult<()> {
        let committee = self.ctx.committee_id(role);
        let permissions = PermissionScope::for_role(&self.ctx, role);
        let number = Some(work_item.number);

        for decision in decisions {
            let weight = if decision.reassign { 0.0 } else { self.retained_score };
            let score = permissions
                .builder(&self.ctx, RelationKind::AffinityScore, work_item.id, &decision.candidate, number)
                .weight(weight)
                .build()?;
            let scope = RelationScope::new(committee.clone(), RelationKind::AffinityScore)
                .with_head(work_item.id)
                .with_tail(decision.candidate.clone());
            replacer.replace(&scope, vec![score]).await?;
        }

        let statuses = decisions
            .iter()
            .map(|d| {
                let label = if d.reassign { REASSIGNED_LABEL } else { REQUESTED_LABEL };
                permissions
                    .builder(&self.ctx, RelationKind::Status, work_item.id, &d.candidate, number)
                    .label(label)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let status_scope = RelationScope::new(committee.clone(), RelationKind::Status).with_head(work_item.id);
        replacer.replace(&status_scope, statuses).await?;

        let reassigned: BTreeSet<CandidateId> = decisions
            .iter()
            .filter(|d| d.reassign)
            .map(|d| d.candidate.clone())
            .collect();
        TrackSync::new(&self.ctx, role)
            .sync_work_item(stores, replacer, work_item, &reassigned)
            .await?;

        // Prior-thread read access: the new committee group when retaining,
        // the new submitted group for reviewers being replaced.
        let grants: BTreeSet<GroupId> = decisions
            .iter()
            .filter_map(|d| match (d.reassign, role) {
                (false, _) => Some(self.ctx.paper_committee_id(work_item.number, role)),
                (true, Role::Reviewer) => Some(self.ctx.paper_submitted_id(work_item.number, role)),
                (true, _) => None,
            })
            .collect();
        if !grants.is_empty() {
            let grants: Vec<String> = grants.into_iter().map(GroupId::into_inner).collect();
            stores.groups.add_members(prior_group, &grants).await?;
        }

        debug!(
            work_item = %work_item.id,
            role = %role,
            decisions = decisions.len(),
            "applied carryover decisions"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoadResponse, ReassignmentRequest, TrackRegistration};
    use crate::store::InMemoryStore;
    use revassign_reconcile::InstantClock;
    use std::sync::Arc;

    struct Fixture {
        ctx: VenueContext,
        store: Arc<InMemoryStore>,
        stores: Stores,
        replacer: BulkReplacer,
        carryover: ReassignmentCarryover,
        paper: WorkItem,
    }

    async fn fixture(reassignment: ReassignmentRequest) -> Fixture {
        let ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        let prior_venue = GroupId::parse("ACL/2024").unwrap();
        let paper = WorkItem {
            id: WorkItemId::new(),
            number: 4,
            authors: Vec::new(),
            track: Some("NLP".into()),
            previous: Some(PriorSubmission {
                venue: prior_venue.clone(),
                number: 9,
                work_item: None,
            }),
            reassignment,
        };

        let store = Arc::new(InMemoryStore::new());
        let reviewers = ctx.committee_id(Role::Reviewer);
        let area_chairs = ctx.committee_id(Role::AreaChair);
        let item = paper.clone();
        store
            .update(|s| {
                s.work_items.push(item);
                s.add_members(&reviewers, ["~Ada1", "~Bob1", "~Cyd1"]);
                s.add_members(&area_chairs, ["~Chair1"]);
                let prior = prior_venue.join("Submission9");
                s.add_members(
                    &prior.join("Reviewers").join("Submitted"),
                    ["ACL/2024/Submission9/Reviewer_abcd", "~Bob1", "~Gone1"],
                );
                s.add_members(&prior.join("Reviewers"), ["~Ada1", "~Bob1", "~Gone1", "~Cyd1"]);
                s.add_members(&GroupId::parse("ACL/2024/Submission9/Reviewer_abcd").unwrap(), ["~Ada1"]);
                s.add_members(&prior.join("Area_Chairs"), ["~Chair1"]);
                s.track_registrations.insert(
                    reviewers.clone(),
                    vec![TrackRegistration {
                        signature: "~Cyd1".into(),
                        tracks: vec!["NLP".into()],
                    }],
                );
                s.load_responses.insert(
                    reviewers,
                    vec![LoadResponse {
                        signature: "~Bob1".into(),
                        reduced_load: Some(0),
                        max_load_this_cycle: None,
                        resubmissions_only: true,
                    }],
                );
            })
            .await;

        let config = EngineConfig::default();
        Fixture {
            stores: Stores::shared(store.clone()),
            replacer: BulkReplacer::new(store.clone(), Arc::new(InstantClock::new()), &config),
            carryover: ReassignmentCarryover::new(&ctx, &config),
            ctx,
            store,
            paper,
        }
    }

    async fn active(f: &Fixture, role: Role, kind: RelationKind) -> Vec<revassign_relations::Relation> {
        f.replacer
            .read_active(&RelationScope::new(f.ctx.committee_id(role), kind))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_retain_is_idempotent() {
        let f = fixture(ReassignmentRequest::default()).await;
        let first = f.carryover.carryover(&f.stores, &f.replacer, &[f.paper.id]).await.unwrap();
        assert_eq!(first.retained, 3);
        assert_eq!(first.skipped, ["~Gone1"]);
        f.carryover.carryover(&f.stores, &f.replacer, &[f.paper.id]).await.unwrap();

        let statuses = active(&f, Role::Reviewer, RelationKind::Status).await;
        let tails: BTreeSet<_> = statuses.iter().map(|r| r.tail.as_str()).collect();
        assert_eq!(statuses.len(), 2);
        assert_eq!(tails, BTreeSet::from(["~Ada1", "~Bob1"]));
        assert!(statuses.iter().all(|r| r.label.as_deref() == Some("Requested")));

        let scores = active(&f, Role::Reviewer, RelationKind::AffinityScore).await;
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|r| r.weight == Some(3.0)));

        let ac_statuses = active(&f, Role::AreaChair, RelationKind::Status).await;
        assert_eq!(ac_statuses.len(), 1);

        let groups = f.store.snapshot().await.groups;
        let prior = GroupId::parse("ACL/2024/Submission9/Reviewers").unwrap();
        assert!(groups[&prior].contains(&"ACL/2025/Submission4/Reviewers".to_string()));

        // Bob only takes resubmissions: one retained work item, one slot.
        let capacities = active(&f, Role::Reviewer, RelationKind::CustomCapacity).await;
        assert_eq!(capacities.len(), 1);
        assert_eq!(capacities[0].tail.as_str(), "~Bob1");
        assert_eq!(capacities[0].weight, Some(1.0));
    }

    #[tokio::test]
    async fn test_reassign_zeroes_scores_and_drops_tracks() {
        let f = fixture(ReassignmentRequest {
            reviewers: ReassignmentChoice::WantsNew,
            area_chair: ReassignmentChoice::NotApplicable,
        })
        .await;
        let report = f.carryover.carryover(&f.stores, &f.replacer, &[]).await.unwrap();
        assert_eq!(report.work_items, 1);
        assert_eq!(report.reassigned, 2);
        assert_eq!(report.compensated, 0);

        let statuses = active(&f, Role::Reviewer, RelationKind::Status).await;
        assert!(statuses.iter().all(|r| r.label.as_deref() == Some("Reassigned")));
        let scores = active(&f, Role::Reviewer, RelationKind::AffinityScore).await;
        assert!(scores.iter().all(|r| r.weight == Some(0.0)));
        assert!(active(&f, Role::AreaChair, RelationKind::Status).await.is_empty());

        // Cyd registered for NLP but was never on the prior committee.
        let tracks = active(&f, Role::Reviewer, RelationKind::Track).await;
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].tail.as_str(), "~Cyd1");
    }
}
