//! Conflict-of-interest detection.

use std::collections::{BTreeMap, HashMap};

use revassign_id::{CandidateId, GroupId};
use revassign_relations::{Head, NewRelation, RelationKind, RelationScope};
use tracing::{debug, info, instrument, warn};

use crate::config::VenueContext;
use crate::error::EngineResult;
use crate::features::{aggregate, extract, ConflictFeatures, ConflictPolicy};
use crate::model::{Profile, Role, WorkItem};
use crate::permissions::PermissionScope;
use crate::replace::BulkReplacer;
use crate::store::Stores;

/// Conflict features of the senior area chairs paired with each area chair.
pub type SeniorFeatures = HashMap<CandidateId, Vec<ConflictFeatures>>;

/// Output of a pure detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub relations: Vec<NewRelation>,
    /// Area chairs marked conflicted only through a paired senior area chair.
    pub transferred: usize,
}

/// What a conflict pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub conflicts: usize,
    pub transferred: usize,
    /// Committee members without a profile.
    pub no_profiles: Vec<CandidateId>,
    /// Authors without a profile; they contribute no features.
    pub missing_authors: Vec<CandidateId>,
}

/// Computes Conflict relations for one committee.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    ctx: VenueContext,
    permissions: PermissionScope,
    policy: ConflictPolicy,
    current_year: i32,
}

impl ConflictDetector {
    pub fn new(ctx: &VenueContext, role: Role, policy: ConflictPolicy, current_year: i32) -> Self {
        Self {
            ctx: ctx.clone(),
            permissions: PermissionScope::for_role(ctx, role),
            policy,
            current_year,
        }
    }

    /// Conflict relations between `work_items` and `candidates`.
    ///
    /// Authors missing from `authors` contribute nothing. `seniors` is only
    /// consulted for a candidate with no direct conflict.
    pub fn detect(
        &self,
        work_items: &[WorkItem],
        authors: &HashMap<CandidateId, Profile>,
        candidates: &[Profile],
        seniors: &SeniorFeatures,
    ) -> EngineResult<Detection> {
        let candidate_features = candidates
            .iter()
            .map(|p| -> EngineResult<_> {
                Ok((p.id.clone(), extract(p, self.policy, self.current_year)?))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let mut detection = Detection::default();
        for work_item in work_items {
            let profiles = work_item.authors.iter().filter_map(|a| authors.get(a));
            let author_features = aggregate(profiles, self.policy, self.current_year)?;
            if author_features.is_empty() {
                debug!(work_item = %work_item.id, "work item has no author features");
                continue;
            }

            for (candidate, features) in &candidate_features {
                let shared = author_features.conflicts_with(features);
                let conflicted = if !shared.is_empty() {
                    true
                } else if seniors
                    .get(candidate)
                    .is_some_and(|sacs| sacs.iter().any(|s| !author_features.conflicts_with(s).is_empty()))
                {
                    detection.transferred += 1;
                    true
                } else {
                    false
                };

                if conflicted {
                    detection.relations.push(
                        self.permissions
                            .builder(
                                &self.ctx,
                                RelationKind::Conflict,
                                work_item.id,
                                candidate,
                                Some(work_item.number),
                            )
                            .build()?,
                    );
                }
            }
        }
        Ok(detection)
    }

    /// Detects conflicts for every committee member against every work item
    /// and replaces the committee's Conflict set.
    #[instrument(skip(self, stores, replacer), fields(committee = %self.permissions.committee()))]
    pub async fn run(&self, stores: &Stores, replacer: &BulkReplacer) -> EngineResult<ConflictReport> {
        let committee = self.permissions.committee().clone();
        let members = committee_members(stores, &committee).await?;
        let candidates = stores.profiles.get_profiles(&members).await?;
        let mut report = ConflictReport {
            no_profiles: missing(&members, &candidates),
            ..Default::default()
        };
        for id in &report.no_profiles {
            warn!(candidate = %id, "no profile for committee member; skipping conflicts");
        }

        let work_items = stores.submissions.work_items().await?;
        let author_ids: Vec<CandidateId> = {
            let mut ids: Vec<_> = work_items.iter().flat_map(|w| w.authors.iter().cloned()).collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let author_profiles = stores.profiles.get_profiles(&author_ids).await?;
        report.missing_authors = missing(&author_ids, &author_profiles);
        for id in &report.missing_authors {
            warn!(author = %id, "no profile for author; treating as featureless");
        }
        let authors: HashMap<_, _> = author_profiles.into_iter().map(|p| (p.id.clone(), p)).collect();

        let seniors = if self.permissions.role() == Role::AreaChair && self.ctx.use_senior_area_chairs {
            self.senior_features(stores, replacer).await?
        } else {
            SeniorFeatures::new()
        };

        let detection = self.detect(&work_items, &authors, &candidates, &seniors)?;
        report.conflicts = detection.relations.len();
        report.transferred = detection.transferred;

        let scope = RelationScope::new(committee, RelationKind::Conflict);
        replacer.replace(&scope, detection.relations).await?;

        info!(
            conflicts = report.conflicts,
            transferred = report.transferred,
            no_profiles = report.no_profiles.len(),
            "computed conflicts"
        );
        Ok(report)
    }

    /// Features of the senior area chairs assigned to each area chair.
    async fn senior_features(&self, stores: &Stores, replacer: &BulkReplacer) -> EngineResult<SeniorFeatures> {
        let scope = RelationScope::new(self.ctx.committee_id(Role::SeniorAreaChair), RelationKind::Assignment);
        let mut pairs: BTreeMap<CandidateId, Vec<CandidateId>> = BTreeMap::new();
        for relation in replacer.read_active(&scope).await? {
            if let Head::Candidate(area_chair) = relation.head {
                pairs.entry(area_chair).or_default().push(relation.tail);
            }
        }

        let mut sac_ids: Vec<_> = pairs.values().flatten().cloned().collect();
        sac_ids.sort();
        sac_ids.dedup();
        let features: HashMap<CandidateId, ConflictFeatures> = stores
            .profiles
            .get_profiles(&sac_ids)
            .await?
            .iter()
            .map(|p| -> EngineResult<_> {
                Ok((p.id.clone(), extract(p, self.policy, self.current_year)?))
            })
            .collect::<EngineResult<_>>()?;

        Ok(pairs
            .into_iter()
            .map(|(ac, sacs)| {
                let sac_features = sacs.iter().filter_map(|s| features.get(s).cloned()).collect();
                (ac, sac_features)
            })
            .collect())
    }
}

/// Committee members that look like candidate ids.
pub(crate) async fn committee_members(
    stores: &Stores,
    committee: &GroupId,
) -> EngineResult<Vec<CandidateId>> {
    let members = stores.groups.get_members(committee).await?.unwrap_or_default();
    Ok(members
        .iter()
        .filter_map(|m| CandidateId::parse(m).ok())
        .collect())
}

fn missing(ids: &[CandidateId], profiles: &[Profile]) -> Vec<CandidateId> {
    ids.iter()
        .filter(|id| !profiles.iter().any(|p| &p.id == *id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProfileRelation;
    use revassign_id::{GroupId, WorkItemId};

    fn ctx() -> VenueContext {
        let mut ctx = VenueContext::new(GroupId::parse("ACL/2025").unwrap());
        ctx.use_senior_area_chairs = true;
        ctx
    }

    fn profile(id: &str, emails: &[&str]) -> Profile {
        let mut p = Profile::new(CandidateId::parse(id).unwrap());
        p.emails = emails.iter().map(|e| e.to_string()).collect();
        p
    }

    fn work_item(number: u32, authors: &[&str]) -> WorkItem {
        WorkItem {
            id: WorkItemId::new(),
            number,
            authors: authors.iter().map(|a| CandidateId::parse(a).unwrap()).collect(),
            track: None,
            previous: None,
            reassignment: Default::default(),
        }
    }

    fn by_id(profiles: Vec<Profile>) -> HashMap<CandidateId, Profile> {
        profiles.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    #[test]
    fn test_author_relation_matches_candidate_email() {
        let mut author = profile("~Author1", &["author@gmail.com"]);
        author.relations = vec![ProfileRelation {
            email: "a@x.com".into(),
            relation: "Advisor".into(),
            start: None,
            end: None,
        }];
        let candidate = profile("~Candidate1", &["a@x.com"]);
        let paper = work_item(7, &["~Author1"]);

        let detector = ConflictDetector::new(&ctx(), Role::Reviewer, ConflictPolicy::Default, 2025);
        let detection = detector
            .detect(&[paper.clone()], &by_id(vec![author]), &[candidate], &SeniorFeatures::new())
            .unwrap();

        assert_eq!(detection.relations.len(), 1);
        let conflict = &detection.relations[0];
        assert_eq!(conflict.head, Head::WorkItem(paper.id));
        assert_eq!(conflict.weight, Some(-1.0));
        assert_eq!(conflict.label.as_deref(), Some("Conflict"));
        assert!(conflict.readers.contains("~Candidate1"));
        assert_eq!(conflict.nonreaders.as_slice(), ["ACL/2025/Submission7/Authors"]);
    }

    #[test]
    fn test_shared_domain_conflicts_and_common_domains_do_not() {
        let author = profile("~Author1", &["author@gmail.com", "author@cs.umass.edu"]);
        let same_school = profile("~Near1", &["near@umass.edu"]);
        let gmail_only = profile("~Far1", &["far@gmail.com"]);
        let paper = work_item(1, &["~Author1"]);

        let detector = ConflictDetector::new(&ctx(), Role::Reviewer, ConflictPolicy::Default, 2025);
        let detection = detector
            .detect(&[paper], &by_id(vec![author]), &[same_school, gmail_only], &SeniorFeatures::new())
            .unwrap();
        let tails: Vec<_> = detection.relations.iter().map(|r| r.tail.as_str()).collect();
        assert_eq!(tails, ["~Near1"]);
    }

    #[test]
    fn test_missing_author_profile_contributes_nothing() {
        let candidate = profile("~Candidate1", &["c@umass.edu"]);
        let paper = work_item(1, &["~Ghost1"]);
        let detector = ConflictDetector::new(&ctx(), Role::Reviewer, ConflictPolicy::Default, 2025);
        let detection = detector
            .detect(&[paper], &HashMap::new(), &[candidate], &SeniorFeatures::new())
            .unwrap();
        assert!(detection.relations.is_empty());
    }

    #[test]
    fn test_senior_conflict_transfers_to_area_chair() {
        let author = profile("~Author1", &["author@mit.edu"]);
        let area_chair = profile("~Chair1", &["chair@stanford.edu"]);
        let senior = profile("~Senior1", &["senior@mit.edu"]);
        let paper = work_item(3, &["~Author1"]);

        let senior_features = extract(&senior, ConflictPolicy::Default, 2025).unwrap();
        let seniors = SeniorFeatures::from([(area_chair.id.clone(), vec![senior_features])]);

        let detector = ConflictDetector::new(&ctx(), Role::AreaChair, ConflictPolicy::Default, 2025);
        let detection = detector
            .detect(&[paper], &by_id(vec![author]), &[area_chair], &seniors)
            .unwrap();
        assert_eq!(detection.relations.len(), 1);
        assert_eq!(detection.transferred, 1);
        assert_eq!(
            detection.relations[0].readers.as_slice(),
            ["ACL/2025", "ACL/2025/Senior_Area_Chairs", "~Chair1"]
        );
    }
}
