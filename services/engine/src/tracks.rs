//! Track tags: which candidates registered for a work item's research area.

use std::collections::{BTreeMap, BTreeSet};

use revassign_id::CandidateId;
use revassign_relations::{NewRelation, RelationKind, RelationScope};
use tracing::{debug, info, instrument, warn};

use crate::carryover::CarriedDecisions;
use crate::config::VenueContext;
use crate::conflicts::committee_members;
use crate::error::EngineResult;
use crate::model::{Role, WorkItem};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;
use crate::store::Stores;

/// Committee members per registered track.
pub type Registrations = BTreeMap<String, BTreeSet<CandidateId>>;

/// What a track sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackReport {
    pub relations: usize,
    /// Registrations whose signature matches no committee member.
    pub unresolved: Vec<String>,
}

/// Maintains Track relations for one committee.
#[derive(Debug, Clone)]
pub struct TrackSync {
    ctx: VenueContext,
    permissions: PermissionScope,
}

impl TrackSync {
    pub fn new(ctx: &VenueContext, role: Role) -> Self {
        Self {
            ctx: ctx.clone(),
            permissions: PermissionScope::for_role(ctx, role),
        }
    }

    fn scope(&self) -> RelationScope {
        RelationScope::new(self.permissions.committee().clone(), RelationKind::Track)
    }

    /// Registered tracks of the committee's members, resolved to profile ids.
    pub async fn registrations(&self, stores: &Stores) -> EngineResult<(Registrations, Vec<String>)> {
        let committee = self.permissions.committee();
        let members = committee_members(stores, committee).await?;
        let profiles = stores.profiles.get_profiles(&members).await?;

        let mut registrations = Registrations::new();
        let mut unresolved = Vec::new();
        for registration in stores.registrations.track_registrations(committee).await? {
            let signature = registration.signature.trim().to_lowercase();
            let candidate = members
                .iter()
                .find(|m| m.as_str().to_lowercase() == signature)
                .or_else(|| {
                    profiles
                        .iter()
                        .find(|p| p.signatures().any(|s| s.to_lowercase() == signature))
                        .map(|p| &p.id)
                });
            let Some(candidate) = candidate else {
                unresolved.push(registration.signature);
                continue;
            };
            for track in registration.tracks {
                registrations.entry(track).or_default().insert(candidate.clone());
            }
        }
        Ok((registrations, unresolved))
    }

    /// Track relations of one work item, leaving out `exclude`.
    pub fn relations(
        &self,
        work_item: &WorkItem,
        registrations: &Registrations,
        exclude: &BTreeSet<CandidateId>,
    ) -> EngineResult<Vec<NewRelation>> {
        let Some(track) = work_item.track.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(candidates) = registrations.get(track) else {
            return Ok(Vec::new());
        };
        candidates
            .difference(exclude)
            .map(|candidate| -> EngineResult<NewRelation> {
                Ok(self
                    .permissions
                    .builder(&self.ctx, RelationKind::Track, work_item.id, candidate, Some(work_item.number))
                    .weight(1.0)
                    .label(track)
                    .build()?)
            })
            .collect()
    }

    /// Replaces the committee's Track set.
    ///
    /// Candidates carryover reassigned away from a work item stay excluded.
    #[instrument(skip(self, stores, replacer), fields(committee = %self.permissions.committee()))]
    pub async fn sync_tracks(&self, stores: &Stores, replacer: &BulkReplacer) -> EngineResult<TrackReport> {
        let (registrations, unresolved) = self.registrations(stores).await?;
        for signature in &unresolved {
            warn!(signature = %signature, "track registration matches no committee member");
        }

        let carried = CarriedDecisions::load(replacer, self.permissions.committee()).await?;
        let mut relations = Vec::new();
        for work_item in stores.submissions.work_items().await? {
            let exclude = carried.reassigned_from(work_item.id);
            relations.extend(self.relations(&work_item, &registrations, &exclude)?);
        }
        let report = TrackReport {
            relations: relations.len(),
            unresolved,
        };
        replacer.replace(&self.scope(), relations).await?;
        info!(relations = report.relations, tracks = registrations.len(), "synced tracks");
        Ok(report)
    }

    /// Replaces the Track set of one work item, leaving out `exclude`.
    pub async fn sync_work_item(
        &self,
        stores: &Stores,
        replacer: &BulkReplacer,
        work_item: &WorkItem,
        exclude: &BTreeSet<CandidateId>,
    ) -> EngineResult<usize> {
        let (registrations, _) = self.registrations(stores).await?;
        let relations = self.relations(work_item, &registrations, exclude)?;
        let written = relations.len();
        replacer
            .replace(&self.scope().with_head(work_item.id), relations)
            .await?;
        debug!(work_item = %work_item.id, written, excluded = exclude.len(), "synced work item tracks");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::{Profile, TrackRegistration};
    use crate::store::InMemoryStore;
    use revassign_id::{GroupId, WorkItemId};
    use revassign_reconcile::InstantClock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tracks_follow_registrations() {
        let ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        let committee = ctx.committee_id(Role::Reviewer);
        let nlp = WorkItem {
            id: WorkItemId::new(),
            number: 1,
            authors: Vec::new(),
            track: Some("NLP".into()),
            previous: None,
            reassignment: Default::default(),
        };
        let untracked = WorkItem {
            id: WorkItemId::new(),
            number: 2,
            track: None,
            ..nlp.clone()
        };

        let store = Arc::new(InMemoryStore::new());
        let items = vec![nlp.clone(), untracked];
        store
            .update(|s| {
                s.work_items = items;
                s.add_members(&committee, ["~Ada1", "~Bob1"]);
                let mut bob = Profile::new(CandidateId::parse("~Bob1").unwrap());
                bob.confirmed_emails = vec!["bob@umass.edu".into()];
                s.profiles.push(bob);
                s.track_registrations.insert(
                    committee.clone(),
                    vec![
                        TrackRegistration {
                            signature: "~Ada1".into(),
                            tracks: vec!["NLP".into(), "Vision".into()],
                        },
                        TrackRegistration {
                            signature: "bob@umass.edu".into(),
                            tracks: vec!["NLP".into()],
                        },
                        TrackRegistration {
                            signature: "stranger@x.org".into(),
                            tracks: vec!["NLP".into()],
                        },
                    ],
                );
            })
            .await;

        let stores = Stores::shared(store.clone());
        let replacer = BulkReplacer::new(store.clone(), Arc::new(InstantClock::new()), &EngineConfig::default());
        let sync = TrackSync::new(&ctx, Role::Reviewer);

        let report = sync.sync_tracks(&stores, &replacer).await.unwrap();
        assert_eq!(report.relations, 2);
        assert_eq!(report.unresolved, ["stranger@x.org"]);

        let exclude = BTreeSet::from([CandidateId::parse("~Ada1").unwrap()]);
        assert_eq!(sync.sync_work_item(&stores, &replacer, &nlp, &exclude).await.unwrap(), 1);
        let active = replacer
            .read_active(&RelationScope::new(committee, RelationKind::Track))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tail.as_str(), "~Bob1");
        assert_eq!(active[0].label.as_deref(), Some("NLP"));
    }

    #[tokio::test]
    async fn test_committee_sync_keeps_reassigned_candidates_out() {
        let ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        let committee = ctx.committee_id(Role::Reviewer);
        let paper = WorkItem {
            id: WorkItemId::new(),
            number: 3,
            authors: Vec::new(),
            track: Some("NLP".into()),
            previous: None,
            reassignment: Default::default(),
        };

        let store = Arc::new(InMemoryStore::new());
        let items = vec![paper.clone()];
        store
            .update(|s| {
                s.work_items = items;
                s.add_members(&committee, ["~Ada1", "~Cyd1"]);
                s.track_registrations.insert(
                    committee.clone(),
                    vec![
                        TrackRegistration {
                            signature: "~Ada1".into(),
                            tracks: vec!["NLP".into()],
                        },
                        TrackRegistration {
                            signature: "~Cyd1".into(),
                            tracks: vec!["NLP".into()],
                        },
                    ],
                );
            })
            .await;

        let stores = Stores::shared(store.clone());
        let replacer = BulkReplacer::new(store.clone(), Arc::new(InstantClock::new()), &EngineConfig::default());
        let ada = CandidateId::parse("~Ada1").unwrap();
        let status = PermissionScope::for_role(&ctx, Role::Reviewer)
            .builder(&ctx, RelationKind::Status, paper.id, &ada, Some(paper.number))
            .label(crate::carryover::REASSIGNED_LABEL)
            .build()
            .unwrap();
        replacer
            .insert(&RelationScope::new(committee.clone(), RelationKind::Status), vec![status])
            .await
            .unwrap();

        let sync = TrackSync::new(&ctx, Role::Reviewer);
        assert_eq!(sync.sync_tracks(&stores, &replacer).await.unwrap().relations, 1);
        let active = replacer
            .read_active(&RelationScope::new(committee, RelationKind::Track))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tail.as_str(), "~Cyd1");
    }
}
