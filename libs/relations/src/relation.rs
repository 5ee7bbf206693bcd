//! The relation record and its builder.

use chrono::{DateTime, Utc};
use revassign_id::{CandidateId, GroupId, InvocationId, RelationId, RelationVersion, WorkItemId};
use serde::{Deserialize, Serialize};

use crate::{RelationError, RelationKind};

/// The head end of a relation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Head {
    /// A paper submission.
    WorkItem(WorkItemId),
    /// A committee or other group.
    Group(GroupId),
    /// A candidate, e.g. the area chair a senior area chair is paired with.
    Candidate(CandidateId),
}

impl Head {
    /// Returns the work item id if this head is a work item.
    pub fn work_item(&self) -> Option<WorkItemId> {
        match self {
            Head::WorkItem(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the candidate id if this head is a candidate.
    pub fn candidate(&self) -> Option<&CandidateId> {
        match self {
            Head::Candidate(id) => Some(id),
            _ => None,
        }
    }
}

impl std::fmt::Display for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Head::WorkItem(id) => write!(f, "{}", id),
            Head::Group(id) => write!(f, "{}", id),
            Head::Candidate(id) => write!(f, "{}", id),
        }
    }
}

impl From<WorkItemId> for Head {
    fn from(id: WorkItemId) -> Self {
        Head::WorkItem(id)
    }
}

impl From<GroupId> for Head {
    fn from(id: GroupId) -> Self {
        Head::Group(id)
    }
}

impl From<CandidateId> for Head {
    fn from(id: CandidateId) -> Self {
        Head::Candidate(id)
    }
}

/// Ordered, duplicate-free list of reader identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReaderList(Vec<String>);

impl ReaderList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a reader unless already present.
    pub fn push(&mut self, reader: impl Into<String>) {
        let reader = reader.into();
        if !self.0.contains(&reader) {
            self.0.push(reader);
        }
    }

    /// Returns a copy with one more reader appended.
    #[must_use]
    pub fn with(mut self, reader: impl Into<String>) -> Self {
        self.push(reader);
        self
    }

    pub fn contains(&self, reader: &str) -> bool {
        self.0.iter().any(|r| r == reader)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ReaderList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = ReaderList::new();
        for reader in iter {
            list.push(reader);
        }
        list
    }
}

/// Lifecycle state of a stored relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    SoftDeleted {
        at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        by: Option<InvocationId>,
    },
}

impl Lifecycle {
    /// Returns true if the relation is active.
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// A validated relation ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRelation {
    /// Committee whose relation set this belongs to (e.g. `ACL/2025/Reviewers`).
    pub committee: GroupId,
    pub kind: RelationKind,
    pub head: Head,
    pub tail: CandidateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub readers: ReaderList,
    #[serde(default, skip_serializing_if = "ReaderList::is_empty")]
    pub nonreaders: ReaderList,
}

impl NewRelation {
    /// Creates a new relation builder.
    pub fn builder(committee: GroupId, kind: RelationKind) -> NewRelationBuilder {
        NewRelationBuilder::new(committee, kind)
    }

    /// Stamp the relation with storage metadata.
    pub fn materialize(self, version: RelationVersion, invocation: Option<InvocationId>) -> Relation {
        Relation {
            id: RelationId::new(),
            committee: self.committee,
            kind: self.kind,
            head: self.head,
            tail: self.tail,
            weight: self.weight,
            label: self.label,
            readers: self.readers,
            nonreaders: self.nonreaders,
            lifecycle: Lifecycle::Active,
            version,
            invocation,
            created_at: Utc::now(),
        }
    }

    /// Identity of the edge ignoring weight, label and permissions.
    pub fn edge_key(&self) -> (RelationKind, &Head, &CandidateId) {
        (self.kind, &self.head, &self.tail)
    }
}

/// Builder for constructing validated relations.
#[derive(Debug)]
pub struct NewRelationBuilder {
    committee: GroupId,
    kind: RelationKind,
    head: Option<Head>,
    tail: Option<CandidateId>,
    weight: Option<f64>,
    label: Option<String>,
    readers: ReaderList,
    nonreaders: ReaderList,
}

impl NewRelationBuilder {
    pub fn new(committee: GroupId, kind: RelationKind) -> Self {
        Self {
            committee,
            kind,
            head: None,
            tail: None,
            weight: None,
            label: None,
            readers: ReaderList::new(),
            nonreaders: ReaderList::new(),
        }
    }

    pub fn head(mut self, head: impl Into<Head>) -> Self {
        self.head = Some(head.into());
        self
    }

    pub fn tail(mut self, tail: CandidateId) -> Self {
        self.tail = Some(tail);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn maybe_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn readers(mut self, readers: ReaderList) -> Self {
        self.readers = readers;
        self
    }

    pub fn nonreaders(mut self, nonreaders: ReaderList) -> Self {
        self.nonreaders = nonreaders;
        self
    }

    /// Validates the relation against its kind.
    ///
    /// # Errors
    ///
    /// Returns an error if head or tail are unset, the head does not fit the
    /// kind, or the weight is outside the kind's domain.
    pub fn build(self) -> Result<NewRelation, RelationError> {
        let head = self.head.ok_or(RelationError::MissingField("head"))?;
        let tail = self.tail.ok_or(RelationError::MissingField("tail"))?;
        if !self.kind.accepts_head(&head) {
            return Err(RelationError::InvalidHead {
                kind: self.kind,
                head: head.to_string(),
            });
        }
        let weight = self.kind.normalize_weight(self.weight)?;
        let label = match (self.kind, self.label) {
            (RelationKind::Conflict, None) => Some(crate::CONFLICT_LABEL.to_string()),
            (_, label) => label,
        };

        Ok(NewRelation {
            committee: self.committee,
            kind: self.kind,
            head,
            tail,
            weight,
            label,
            readers: self.readers,
            nonreaders: self.nonreaders,
        })
    }
}

/// A stored relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub committee: GroupId,
    pub kind: RelationKind,
    pub head: Head,
    pub tail: CandidateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub readers: ReaderList,
    #[serde(default, skip_serializing_if = "ReaderList::is_empty")]
    pub nonreaders: ReaderList,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
    pub version: RelationVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<InvocationId>,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Copy this relation's payload into a new insert under another kind,
    /// keeping weight, label and permissions.
    pub fn to_new(&self, kind: RelationKind) -> NewRelation {
        NewRelation {
            committee: self.committee.clone(),
            kind,
            head: self.head.clone(),
            tail: self.tail.clone(),
            weight: self.weight,
            label: self.label.clone(),
            readers: self.readers.clone(),
            nonreaders: self.nonreaders.clone(),
        }
    }
}
