//! Relation scopes: the unit of total replacement.

use revassign_id::{CandidateId, GroupId};
use serde::{Deserialize, Serialize};

use crate::{Head, NewRelation, Relation, RelationKind};

/// Selects the relations of one kind that a refresh owns.
///
/// A scope always names a committee and a kind. Optional head, tail and label
/// filters narrow it, e.g. Status relations for one work item only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationScope {
    pub committee: GroupId,
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<Head>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<CandidateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RelationScope {
    /// Scope covering every relation of `kind` for a committee.
    pub fn new(committee: GroupId, kind: RelationKind) -> Self {
        Self {
            committee,
            kind,
            head: None,
            tail: None,
            label: None,
        }
    }

    #[must_use]
    pub fn with_head(mut self, head: impl Into<Head>) -> Self {
        self.head = Some(head.into());
        self
    }

    #[must_use]
    pub fn with_tail(mut self, tail: CandidateId) -> Self {
        self.tail = Some(tail);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns true if the stored relation falls in this scope.
    ///
    /// Lifecycle is not checked here.
    pub fn matches(&self, relation: &Relation) -> bool {
        self.matches_parts(
            &relation.committee,
            relation.kind,
            &relation.head,
            &relation.tail,
            relation.label.as_deref(),
        )
    }

    /// Returns true if a relation about to be inserted falls in this scope.
    pub fn covers(&self, relation: &NewRelation) -> bool {
        self.matches_parts(
            &relation.committee,
            relation.kind,
            &relation.head,
            &relation.tail,
            relation.label.as_deref(),
        )
    }

    fn matches_parts(
        &self,
        committee: &GroupId,
        kind: RelationKind,
        head: &Head,
        tail: &CandidateId,
        label: Option<&str>,
    ) -> bool {
        committee == &self.committee
            && kind == self.kind
            && self.head.as_ref().is_none_or(|h| h == head)
            && self.tail.as_ref().is_none_or(|t| t == tail)
            && self.label.as_deref().is_none_or(|l| Some(l) == label)
    }

    /// Stable key identifying this exact scope in the audit log.
    pub fn key(&self) -> String {
        let mut key = format!("{}/-/{}", self.committee, self.kind.suffix());
        if let Some(head) = &self.head {
            key.push_str(&format!("?head={}", head));
        }
        if let Some(tail) = &self.tail {
            key.push_str(&format!("&tail={}", tail));
        }
        if let Some(label) = &self.label {
            key.push_str(&format!("&label={}", label));
        }
        key
    }

    /// Key of the lock guarding this scope.
    ///
    /// Scopes of the same committee and kind can overlap (a committee-wide
    /// refresh covers every per-head refresh), so they share one lock.
    pub fn lock_key(&self) -> String {
        format!("{}/-/{}", self.committee, self.kind.suffix())
    }
}

impl std::fmt::Display for RelationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}
