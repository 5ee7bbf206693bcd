//! Reader chains for relations emitted on behalf of a committee.

use revassign_id::{CandidateId, GroupId};
use revassign_relations::{Head, NewRelation, NewRelationBuilder, ReaderList, RelationKind};

use crate::config::VenueContext;
use crate::model::Role;

/// Who may read relations emitted for one committee.
///
/// Built once per committee and reused for every relation kind:
/// - reviewer level: venue, senior area chairs (if used), area chairs (if used)
/// - area chair level: venue, senior area chairs (if used)
/// - senior area chair and ethics level: venue
///
/// The tail candidate is always appended last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionScope {
    committee: GroupId,
    role: Role,
    base: ReaderList,
}

impl PermissionScope {
    pub fn for_role(ctx: &VenueContext, role: Role) -> Self {
        let mut base = ReaderList::new();
        base.push(ctx.venue_id.as_str());
        match role {
            Role::Reviewer => {
                if ctx.use_senior_area_chairs {
                    base.push(ctx.committee_id(Role::SeniorAreaChair).into_inner());
                }
                if ctx.use_area_chairs {
                    base.push(ctx.committee_id(Role::AreaChair).into_inner());
                }
            }
            Role::AreaChair => {
                if ctx.use_senior_area_chairs {
                    base.push(ctx.committee_id(Role::SeniorAreaChair).into_inner());
                }
            }
            Role::SeniorAreaChair | Role::EthicsReviewer => {}
        }

        Self {
            committee: ctx.committee_id(role),
            role,
            base,
        }
    }

    pub fn committee(&self) -> &GroupId {
        &self.committee
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Readers of a relation whose tail is `tail`.
    pub fn readers(&self, tail: &CandidateId) -> ReaderList {
        self.base.clone().with(tail.as_str())
    }

    /// Non-readers of a relation: the author group of a work-item head,
    /// unless the kind is author-visible.
    pub fn nonreaders(
        &self,
        ctx: &VenueContext,
        kind: RelationKind,
        work_item_number: Option<u32>,
    ) -> ReaderList {
        let mut nonreaders = ReaderList::new();
        if let Some(number) = work_item_number {
            if kind.hidden_from_authors() {
                nonreaders.push(ctx.authors_id(number).into_inner());
            }
        }
        nonreaders
    }

    /// Builder pre-filled with this committee, the head and tail, and the
    /// reader chain.
    pub fn builder(
        &self,
        ctx: &VenueContext,
        kind: RelationKind,
        head: impl Into<Head>,
        tail: &CandidateId,
        work_item_number: Option<u32>,
    ) -> NewRelationBuilder {
        NewRelation::builder(self.committee.clone(), kind)
            .head(head)
            .tail(tail.clone())
            .readers(self.readers(tail))
            .nonreaders(self.nonreaders(ctx, kind, work_item_number))
    }
}
