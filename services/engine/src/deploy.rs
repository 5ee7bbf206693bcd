//! Deployment of proposed assignments.
//!
//! Per work item: Unassigned -> Proposed (solver output, a ProposedAssignment
//! relation tagged with a label) -> Deployed (an Assignment relation plus
//! membership in the per-work-item committee group).
//!
//! Senior area chairs are proposed per area chair, not per work item, so
//! their deployment walks the already deployed area chair assignments.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures_util::{stream, StreamExt, TryStreamExt};
use rand::Rng;
use revassign_id::{CandidateId, GroupId, WorkItemId};
use revassign_relations::{Head, NewRelation, Relation, RelationKind, RelationScope};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::config::{EngineConfig, VenueContext};
use crate::error::{EngineError, EngineResult};
use crate::model::{Role, WorkItem};
use crate::replace::BulkReplacer;
use crate::store::Stores;

const SEED_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SEED_LEN: usize = 8;

/// What a deployment did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub committee: Option<GroupId>,
    pub label: String,
    /// Assignment relations written.
    pub assignments: usize,
    /// Work items whose committee group changed.
    pub work_items: usize,
    /// Work items left undeployed because no proposal carried the label.
    pub missing: Vec<u32>,
    /// Proposals already deployed, skipped.
    pub already_deployed: usize,
    /// Assignments soft-deleted by an overwrite.
    pub removed: usize,
    /// Senior area chairs whose area chairs have no deployed work items.
    pub unmapped: Vec<CandidateId>,
    /// Seed for the emergency re-invitation flow.
    pub reassignment_seed: Option<String>,
}

/// Deploys proposals into live assignments.
#[derive(Debug)]
pub struct DeploymentCoordinator {
    ctx: VenueContext,
    concurrency: usize,
    locks: Mutex<HashMap<WorkItemId, Arc<AsyncMutex<()>>>>,
}

impl DeploymentCoordinator {
    pub fn new(ctx: &VenueContext, config: &EngineConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            concurrency: config.deploy_concurrency.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock(&self, work_item: WorkItemId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry(work_item)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Deploys the proposals of `role` tagged `label`.
    ///
    /// With `overwrite`, current assignees are removed first; this is refused
    /// if any review of the role's stage exists. Senior area chairs go
    /// through [`deploy_senior`](Self::deploy_senior).
    #[instrument(skip(self, stores, replacer), fields(venue = %self.ctx.venue_id))]
    pub async fn deploy(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        role: Role,
        label: &str,
        overwrite: bool,
        enable_reassignment: bool,
    ) -> EngineResult<DeployReport> {
        if role == Role::SeniorAreaChair {
            return self.deploy_senior(stores, replacer, label, overwrite).await;
        }

        let committee = self.ctx.committee_id(role);
        let assignment_scope = RelationScope::new(committee.clone(), RelationKind::Assignment);
        let proposal_scope =
            RelationScope::new(committee.clone(), RelationKind::ProposedAssignment).with_label(label);
        let work_items = stores.submissions.work_items().await?;
        let mut report = DeployReport {
            committee: Some(committee.clone()),
            label: label.to_string(),
            ..Default::default()
        };

        if overwrite {
            self.ensure_no_reviews(stores, role, &work_items).await?;
            let current = replacer.read_active(&assignment_scope).await?;
            self.remove_memberships(stores, role, &work_items, &current).await?;
            report.removed = replacer.retire(&assignment_scope).await?;
        }

        let deployed: HashSet<(Head, CandidateId)> = replacer
            .read_active(&assignment_scope)
            .await?
            .into_iter()
            .map(|r| (r.head, r.tail))
            .collect();

        let mut by_work_item: BTreeMap<WorkItemId, Vec<Relation>> = BTreeMap::new();
        for proposal in replacer.read_active(&proposal_scope).await? {
            match proposal.head.work_item() {
                Some(id) => by_work_item.entry(id).or_default().push(proposal),
                None => warn!(head = %proposal.head, "proposal is not headed by a work item"),
            }
        }

        let mut jobs = Vec::new();
        for work_item in &work_items {
            match by_work_item.remove(&work_item.id) {
                Some(proposals) => jobs.push((work_item, proposals)),
                None => {
                    warn!(work_item = %work_item.id, number = work_item.number, label, "no proposed assignments; leaving undeployed");
                    report.missing.push(work_item.number);
                }
            }
        }
        for head in by_work_item.keys() {
            warn!(work_item = %head, "proposals reference an unknown work item");
        }

        let deployed = &deployed;
        let assignment_scope = &assignment_scope;
        let results: Vec<(usize, usize)> = stream::iter(jobs.into_iter().map(|(work_item, proposals)| async move {
            let _guard = self.lock(work_item.id).await;
            let fresh: Vec<&Relation> = proposals
                .iter()
                .filter(|p| !deployed.contains(&(p.head.clone(), p.tail.clone())))
                .collect();
            let skipped = proposals.len() - fresh.len();

            let members: Vec<String> = proposals.iter().map(|p| p.tail.to_string()).collect();
            stores
                .groups
                .add_members(&self.ctx.paper_committee_id(work_item.number, role), &members)
                .await?;

            let relations: Vec<NewRelation> = fresh.iter().map(|p| p.to_new(RelationKind::Assignment)).collect();
            let written = replacer.insert(assignment_scope, relations).await?;
            debug!(work_item = %work_item.id, written, skipped, "deployed work item");
            Ok::<_, EngineError>((written, skipped))
        }))
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await?;

        report.work_items = results.len();
        report.assignments = results.iter().map(|(w, _)| w).sum();
        report.already_deployed = results.iter().map(|(_, s)| s).sum();

        if role == Role::AreaChair && self.ctx.use_senior_area_chairs {
            let cascade = self.cascade_seniors(stores, replacer).await?;
            report.unmapped = cascade.unmapped;
        }

        if enable_reassignment && role == Role::Reviewer {
            let group = self.ctx.emergency_group(role);
            if stores.groups.create_group(&group).await? {
                info!(group = %group, "created emergency reviewer group");
            }
            report.reassignment_seed = Some(reassignment_seed());
        }

        info!(
            committee = %committee,
            label,
            assignments = report.assignments,
            work_items = report.work_items,
            missing = report.missing.len(),
            "deployed assignments"
        );
        Ok(report)
    }

    /// Deploys senior area chair proposals (head: an area chair).
    ///
    /// Per-work-item senior area chair groups are filled from the area
    /// chairs' deployed work items; a senior area chair reached through no
    /// deployed area chair gets no membership.
    #[instrument(skip(self, stores, replacer), fields(venue = %self.ctx.venue_id))]
    pub async fn deploy_senior(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        label: &str,
        overwrite: bool,
    ) -> EngineResult<DeployReport> {
        let committee = self.ctx.committee_id(Role::SeniorAreaChair);
        let assignment_scope = RelationScope::new(committee.clone(), RelationKind::Assignment);
        let proposal_scope =
            RelationScope::new(committee.clone(), RelationKind::ProposedAssignment).with_label(label);
        let work_items = stores.submissions.work_items().await?;
        let mut report = DeployReport {
            committee: Some(committee.clone()),
            label: label.to_string(),
            ..Default::default()
        };

        if overwrite {
            self.ensure_no_reviews(stores, Role::SeniorAreaChair, &work_items).await?;
            let papers = self.area_chair_papers(replacer, &work_items).await?;
            for current in replacer.read_active(&assignment_scope).await? {
                let Some(area_chair) = current.head.candidate() else {
                    continue;
                };
                for (id, number) in papers.get(area_chair).into_iter().flatten() {
                    let _guard = self.lock(*id).await;
                    stores
                        .groups
                        .remove_members(
                            &self.ctx.paper_committee_id(*number, Role::SeniorAreaChair),
                            &[current.tail.to_string()],
                        )
                        .await?;
                }
            }
            report.removed = replacer.retire(&assignment_scope).await?;
        }

        let deployed: HashSet<(Head, CandidateId)> = replacer
            .read_active(&assignment_scope)
            .await?
            .into_iter()
            .map(|r| (r.head, r.tail))
            .collect();
        let mut relations = Vec::new();
        for proposal in replacer.read_active(&proposal_scope).await? {
            if proposal.head.candidate().is_none() {
                warn!(head = %proposal.head, "senior proposal is not headed by an area chair");
            } else if deployed.contains(&(proposal.head.clone(), proposal.tail.clone())) {
                report.already_deployed += 1;
            } else {
                relations.push(proposal.to_new(RelationKind::Assignment));
            }
        }
        report.assignments = replacer.insert(&assignment_scope, relations).await?;

        let cascade = self.cascade_seniors(stores, replacer).await?;
        report.work_items = cascade.work_items;
        report.unmapped = cascade.unmapped;

        info!(
            committee = %committee,
            label,
            assignments = report.assignments,
            work_items = report.work_items,
            unmapped = report.unmapped.len(),
            "deployed senior area chair assignments"
        );
        Ok(report)
    }

    /// Adds each deployed senior area chair to the senior group of every work
    /// item their area chairs are deployed on.
    async fn cascade_seniors(&self, stores: &Stores, replacer: &BulkReplacer) -> EngineResult<Cascade> {
        let work_items = stores.submissions.work_items().await?;
        let papers = self.area_chair_papers(replacer, &work_items).await?;
        let senior_scope =
            RelationScope::new(self.ctx.committee_id(Role::SeniorAreaChair), RelationKind::Assignment);

        let mut per_work_item: BTreeMap<(WorkItemId, u32), BTreeSet<String>> = BTreeMap::new();
        let mut mapped: BTreeSet<CandidateId> = BTreeSet::new();
        let mut seniors: BTreeSet<CandidateId> = BTreeSet::new();
        for assignment in replacer.read_active(&senior_scope).await? {
            let Some(area_chair) = assignment.head.candidate() else {
                continue;
            };
            seniors.insert(assignment.tail.clone());
            for paper in papers.get(area_chair).into_iter().flatten() {
                per_work_item
                    .entry(*paper)
                    .or_default()
                    .insert(assignment.tail.to_string());
                mapped.insert(assignment.tail.clone());
            }
        }

        let unmapped: Vec<CandidateId> = seniors.difference(&mapped).cloned().collect();
        for senior in &unmapped {
            warn!(senior = %senior, "senior area chair has no deployed area chair work items");
        }

        let work_items = per_work_item.len();
        stream::iter(per_work_item.into_iter().map(|((id, number), members)| async move {
            let _guard = self.lock(id).await;
            let members: Vec<String> = members.into_iter().collect();
            stores
                .groups
                .add_members(&self.ctx.paper_committee_id(number, Role::SeniorAreaChair), &members)
                .await
        }))
        .buffer_unordered(self.concurrency)
        .try_collect::<Vec<()>>()
        .await?;

        Ok(Cascade { work_items, unmapped })
    }

    /// Work items (id, number) each area chair is deployed on.
    async fn area_chair_papers(
        &self,
        replacer: &BulkReplacer,
        work_items: &[WorkItem],
    ) -> EngineResult<HashMap<CandidateId, Vec<(WorkItemId, u32)>>> {
        let numbers: HashMap<WorkItemId, u32> = work_items.iter().map(|w| (w.id, w.number)).collect();
        let scope = RelationScope::new(self.ctx.committee_id(Role::AreaChair), RelationKind::Assignment);
        let mut papers: HashMap<CandidateId, Vec<(WorkItemId, u32)>> = HashMap::new();
        for assignment in replacer.read_active(&scope).await? {
            let Some(id) = assignment.head.work_item() else {
                continue;
            };
            if let Some(number) = numbers.get(&id) {
                papers.entry(assignment.tail).or_default().push((id, *number));
            }
        }
        Ok(papers)
    }

    async fn ensure_no_reviews(&self, stores: &Stores, role: Role, work_items: &[WorkItem]) -> EngineResult<()> {
        let stage = self.ctx.review_stage(role);
        let ids: Vec<WorkItemId> = work_items.iter().map(|w| w.id).collect();
        let reviews = stores.submissions.review_count(stage, &ids).await?;
        if reviews > 0 {
            return Err(EngineError::ReviewsExist {
                committee: self.ctx.committee_id(role),
                stage: stage.to_string(),
                reviews,
            });
        }
        Ok(())
    }

    async fn remove_memberships(
        &self,
        stores: &Stores,
        role: Role,
        work_items: &[WorkItem],
        current: &[Relation],
    ) -> EngineResult<()> {
        for work_item in work_items {
            let members: Vec<String> = current
                .iter()
                .filter(|r| r.head.work_item() == Some(work_item.id))
                .map(|r| r.tail.to_string())
                .collect();
            if members.is_empty() {
                continue;
            }
            let _guard = self.lock(work_item.id).await;
            stores
                .groups
                .remove_members(&self.ctx.paper_committee_id(work_item.number, role), &members)
                .await?;
        }
        Ok(())
    }
}

struct Cascade {
    work_items: usize,
    unmapped: Vec<CandidateId>,
}

/// Random seed for the emergency re-invitation links.
fn reassignment_seed() -> String {
    let mut rng = rand::rng();
    (0..SEED_LEN)
        .map(|_| char::from(SEED_CHARSET[rng.random_range(0..SEED_CHARSET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionScope;
    use crate::store::{InMemoryStore, ReviewNote};
    use revassign_reconcile::InstantClock;

    struct Fixture {
        ctx: VenueContext,
        store: Arc<InMemoryStore>,
        stores: Stores,
        replacer: BulkReplacer,
        coordinator: DeploymentCoordinator,
        papers: Vec<WorkItem>,
    }

    async fn fixture() -> Fixture {
        let mut ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        ctx.use_senior_area_chairs = true;
        let papers: Vec<WorkItem> = (1..=3)
            .map(|number| WorkItem {
                id: WorkItemId::new(),
                number,
                authors: Vec::new(),
                track: None,
                previous: None,
                reassignment: Default::default(),
            })
            .collect();
        let store = Arc::new(InMemoryStore::new());
        let seeded = papers.clone();
        store.update(|s| s.work_items = seeded).await;
        let config = EngineConfig::default();
        Fixture {
            stores: Stores::shared(store.clone()),
            replacer: BulkReplacer::new(store.clone(), Arc::new(InstantClock::new()), &config),
            coordinator: DeploymentCoordinator::new(&ctx, &config),
            ctx,
            store,
            papers,
        }
    }

    fn candidate(id: &str) -> CandidateId {
        CandidateId::parse(id).unwrap()
    }

    async fn propose(f: &Fixture, role: Role, head: impl Into<Head>, tail: &str, label: &str) {
        let permissions = PermissionScope::for_role(&f.ctx, role);
        let relation = permissions
            .builder(&f.ctx, RelationKind::ProposedAssignment, head, &candidate(tail), None)
            .weight(0.5)
            .label(label)
            .build()
            .unwrap();
        let scope = RelationScope::new(f.ctx.committee_id(role), RelationKind::ProposedAssignment);
        f.replacer.insert(&scope, vec![relation]).await.unwrap();
    }

    async fn members(f: &Fixture, number: u32, role: Role) -> Vec<String> {
        f.store
            .snapshot()
            .await
            .groups
            .get(&f.ctx.paper_committee_id(number, role))
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_deploy_adds_members_and_assignments() {
        let f = fixture().await;
        propose(&f, Role::Reviewer, f.papers[0].id, "~Ada1", "run-1").await;
        propose(&f, Role::Reviewer, f.papers[0].id, "~Bob1", "run-1").await;
        propose(&f, Role::Reviewer, f.papers[1].id, "~Ada1", "run-1").await;
        propose(&f, Role::Reviewer, f.papers[2].id, "~Cyd1", "run-0").await;

        let report = f
            .coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-1", false, true)
            .await
            .unwrap();

        assert_eq!(report.assignments, 3);
        assert_eq!(report.work_items, 2);
        assert_eq!(report.missing, [3]);
        assert_eq!(members(&f, 1, Role::Reviewer).await, ["~Ada1", "~Bob1"]);
        assert!(members(&f, 3, Role::Reviewer).await.is_empty());

        let seed = report.reassignment_seed.unwrap();
        assert_eq!(seed.len(), 8);
        assert!(seed.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert!(f.store.snapshot().await.groups.contains_key(&f.ctx.emergency_group(Role::Reviewer)));

        let again = f
            .coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-1", false, false)
            .await
            .unwrap();
        assert_eq!(again.assignments, 0);
        assert_eq!(again.already_deployed, 3);
    }

    #[tokio::test]
    async fn test_overwrite_refused_after_reviews_and_groups_untouched() {
        let f = fixture().await;
        propose(&f, Role::Reviewer, f.papers[0].id, "~Ada1", "run-1").await;
        f.coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-1", false, false)
            .await
            .unwrap();
        propose(&f, Role::Reviewer, f.papers[0].id, "~Bob1", "run-2").await;

        let paper = f.papers[0].id;
        f.store
            .update(|s| {
                s.reviews.push(ReviewNote {
                    stage: "Official_Review".into(),
                    work_item: paper,
                })
            })
            .await;
        let before = f.store.snapshot().await.groups;

        let err = f
            .coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-2", true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReviewsExist { reviews: 1, .. }));
        assert_eq!(f.store.snapshot().await.groups, before);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_previous_assignees() {
        let f = fixture().await;
        propose(&f, Role::Reviewer, f.papers[0].id, "~Ada1", "run-1").await;
        f.coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-1", false, false)
            .await
            .unwrap();
        propose(&f, Role::Reviewer, f.papers[0].id, "~Bob1", "run-2").await;

        let report = f
            .coordinator
            .deploy(&f.stores, &f.replacer, Role::Reviewer, "run-2", true, false)
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(members(&f, 1, Role::Reviewer).await, ["~Bob1"]);
        let active = f
            .replacer
            .read_active(&RelationScope::new(f.ctx.committee_id(Role::Reviewer), RelationKind::Assignment))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tail.as_str(), "~Bob1");
    }

    #[tokio::test]
    async fn test_senior_deploy_cascades_through_area_chairs() {
        let f = fixture().await;
        propose(&f, Role::AreaChair, f.papers[0].id, "~Chair1", "ac").await;
        propose(&f, Role::AreaChair, f.papers[1].id, "~Chair1", "ac").await;
        propose(&f, Role::AreaChair, f.papers[2].id, "~Chair2", "ac").await;
        f.coordinator
            .deploy(&f.stores, &f.replacer, Role::AreaChair, "ac", false, false)
            .await
            .unwrap();

        propose(&f, Role::SeniorAreaChair, candidate("~Chair1"), "~Senior1", "sac").await;
        propose(&f, Role::SeniorAreaChair, candidate("~Nobody1"), "~Senior2", "sac").await;

        let report = f
            .coordinator
            .deploy(&f.stores, &f.replacer, Role::SeniorAreaChair, "sac", false, false)
            .await
            .unwrap();

        assert_eq!(report.assignments, 2);
        assert_eq!(report.work_items, 2);
        assert_eq!(report.unmapped, [candidate("~Senior2")]);
        assert_eq!(members(&f, 1, Role::SeniorAreaChair).await, ["~Senior1"]);
        assert_eq!(members(&f, 2, Role::SeniorAreaChair).await, ["~Senior1"]);
        assert!(members(&f, 3, Role::SeniorAreaChair).await.is_empty());
        let groups = f.store.snapshot().await.groups;
        assert!(!groups.values().flatten().any(|m| m == "~Senior2"));
    }
}
