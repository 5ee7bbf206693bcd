//! Store interfaces consumed by the engine.
//!
//! The engine holds no persistent state of its own. Everything it reads or
//! writes goes through these traits:
//! - Profiles of candidates and authors
//! - Committee and per-work-item groups
//! - Submissions and submitted reviews
//! - Registration answers (loads, tracks)
//! - Relations and the replacement log
//!
//! `InMemoryStore` implements all of them for tests and the CLI.

mod error;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use revassign_id::{CandidateId, GroupId, InvocationId, RelationVersion, WorkItemId};
use revassign_relations::{NewRelation, Relation, RelationScope, ReplacementRecord};

use crate::model::{LoadResponse, Profile, TrackRegistration, WorkItem};

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, MemorySnapshot, ReviewNote};

/// Profile lookups.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: &CandidateId) -> StoreResult<Option<Profile>>;

    /// Profiles for `ids`; ids without a profile are left out.
    async fn get_profiles(&self, ids: &[CandidateId]) -> StoreResult<Vec<Profile>>;
}

/// Group membership.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Members of `group`, or `None` if the group does not exist.
    async fn get_members(&self, group: &GroupId) -> StoreResult<Option<Vec<String>>>;

    /// Adds members, creating the group if needed. Existing members are kept once.
    async fn add_members(&self, group: &GroupId, members: &[String]) -> StoreResult<()>;

    async fn remove_members(&self, group: &GroupId, members: &[String]) -> StoreResult<()>;

    /// Creates an empty group; returns false if it already existed.
    async fn create_group(&self, group: &GroupId) -> StoreResult<bool>;
}

/// Submissions of the current cycle.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn work_items(&self) -> StoreResult<Vec<WorkItem>>;

    async fn get_work_item(&self, id: &WorkItemId) -> StoreResult<Option<WorkItem>>;

    /// Number of `stage` notes submitted for any of `work_items`.
    async fn review_count(&self, stage: &str, work_items: &[WorkItemId]) -> StoreResult<usize>;
}

/// Registration and availability answers.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn load_responses(&self, committee: &GroupId) -> StoreResult<Vec<LoadResponse>>;

    async fn track_registrations(&self, committee: &GroupId)
        -> StoreResult<Vec<TrackRegistration>>;
}

/// Relation storage.
///
/// Relations are append-only: `soft_delete` flips lifecycle state and never
/// removes rows.
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Inserts relations stamped with `version`; returns how many were stored.
    async fn bulk_create(
        &self,
        relations: Vec<NewRelation>,
        version: RelationVersion,
        invocation: Option<InvocationId>,
    ) -> StoreResult<usize>;

    /// Soft-deletes every active relation in `scope`; returns how many.
    async fn soft_delete(
        &self,
        scope: &RelationScope,
        invocation: Option<InvocationId>,
    ) -> StoreResult<usize>;

    /// Active relations in `scope`.
    async fn count(&self, scope: &RelationScope) -> StoreResult<usize>;

    /// Active relations in `scope`.
    async fn list(&self, scope: &RelationScope) -> StoreResult<Vec<Relation>>;

    async fn append_record(&self, record: ReplacementRecord) -> StoreResult<()>;

    /// Replacement log entries whose scope key equals `scope`'s, oldest first.
    async fn records(&self, scope: &RelationScope) -> StoreResult<Vec<ReplacementRecord>>;
}

/// Handles to every store the engine uses.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub groups: Arc<dyn GroupStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub relations: Arc<dyn RelationStore>,
}

impl Stores {
    /// Uses one backend for every store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ProfileStore
            + GroupStore
            + SubmissionStore
            + RegistrationStore
            + RelationStore
            + 'static,
    {
        Self {
            profiles: store.clone(),
            groups: store.clone(),
            submissions: store.clone(),
            registrations: store.clone(),
            relations: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
