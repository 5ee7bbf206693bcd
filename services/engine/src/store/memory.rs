//! In-memory store backend.
//!
//! Backs the CLI (via a JSON snapshot on disk) and every test. Two knobs
//! simulate storage misbehaviour: dropped inserts and delayed soft-delete
//! acknowledgement.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use revassign_id::{CandidateId, GroupId, InvocationId, RelationVersion, WorkItemId};
use revassign_relations::{Lifecycle, NewRelation, Relation, RelationScope, ReplacementRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    GroupStore, ProfileStore, RegistrationStore, RelationStore, StoreResult, SubmissionStore,
};
use crate::model::{LoadResponse, Profile, TrackRegistration, WorkItem};

/// A submitted review or meta-review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub stage: String,
    pub work_item: WorkItemId,
}

/// Serialisable contents of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub groups: BTreeMap<GroupId, Vec<String>>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
    #[serde(default)]
    pub reviews: Vec<ReviewNote>,
    #[serde(default)]
    pub load_responses: BTreeMap<GroupId, Vec<LoadResponse>>,
    #[serde(default)]
    pub track_registrations: BTreeMap<GroupId, Vec<TrackRegistration>>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub records: Vec<ReplacementRecord>,
}

impl MemorySnapshot {
    /// Adds members to a group, creating it if needed.
    pub fn add_members<I, S>(&mut self, group: &GroupId, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.groups.entry(group.clone()).or_default();
        for member in members {
            let member = member.into();
            if !entry.contains(&member) {
                entry.push(member);
            }
        }
    }
}

#[derive(Debug, Default)]
struct DeletionLag {
    /// Further `count` reads that still see deleted relations.
    reads: u32,
    /// Relations those reads still see.
    phantom: usize,
}

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemorySnapshot>,
    dropped_inserts: AtomicUsize,
    deletion_lag_reads: Mutex<u32>,
    lag: Mutex<DeletionLag>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: MemorySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            ..Default::default()
        }
    }

    /// Loads a JSON snapshot from disk.
    pub async fn load(path: &Path) -> StoreResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let snapshot: MemorySnapshot = serde_json::from_slice(&bytes)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Writes the current contents to disk as JSON.
    pub async fn save(&self, path: &Path) -> StoreResult<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        self.state.read().await.clone()
    }

    /// Mutates the contents directly, for seeding.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut MemorySnapshot),
    {
        let mut state = self.state.write().await;
        f(&mut state);
    }

    /// Every relation ever stored, including soft-deleted ones.
    pub async fn all_relations(&self) -> Vec<Relation> {
        self.state.read().await.relations.clone()
    }

    /// Silently drop the next `n` relations passed to `bulk_create`.
    pub fn drop_next_inserts(&self, n: usize) {
        self.dropped_inserts.store(n, Ordering::SeqCst);
    }

    /// After each following soft-delete, the next `reads` count calls still
    /// report the deleted relations.
    pub fn set_deletion_lag(&self, reads: u32) {
        if let Ok(mut lag_reads) = self.deletion_lag_reads.lock() {
            *lag_reads = reads;
        }
    }

    fn take_dropped(&self, available: usize) -> usize {
        let mut current = self.dropped_inserts.load(Ordering::SeqCst);
        loop {
            let take = current.min(available);
            match self.dropped_inserts.compare_exchange(
                current,
                current - take,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return take,
                Err(actual) => current = actual,
            }
        }
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_profile(&self, id: &CandidateId) -> StoreResult<Option<Profile>> {
        let state = self.state.read().await;
        Ok(state.profiles.iter().find(|p| &p.id == id).cloned())
    }

    async fn get_profiles(&self, ids: &[CandidateId]) -> StoreResult<Vec<Profile>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.profiles.iter().find(|p| &p.id == id).cloned())
            .collect())
    }
}

#[async_trait]
impl GroupStore for InMemoryStore {
    async fn get_members(&self, group: &GroupId) -> StoreResult<Option<Vec<String>>> {
        Ok(self.state.read().await.groups.get(group).cloned())
    }

    async fn add_members(&self, group: &GroupId, members: &[String]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.add_members(group, members.iter().cloned());
        Ok(())
    }

    async fn remove_members(&self, group: &GroupId, members: &[String]) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.groups.get_mut(group) {
            existing.retain(|m| !members.contains(m));
        }
        Ok(())
    }

    async fn create_group(&self, group: &GroupId) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.groups.contains_key(group) {
            return Ok(false);
        }
        state.groups.insert(group.clone(), Vec::new());
        Ok(true)
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn work_items(&self) -> StoreResult<Vec<WorkItem>> {
        Ok(self.state.read().await.work_items.clone())
    }

    async fn get_work_item(&self, id: &WorkItemId) -> StoreResult<Option<WorkItem>> {
        let state = self.state.read().await;
        Ok(state.work_items.iter().find(|w| &w.id == id).cloned())
    }

    async fn review_count(&self, stage: &str, work_items: &[WorkItemId]) -> StoreResult<usize> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .iter()
            .filter(|r| r.stage == stage && work_items.contains(&r.work_item))
            .count())
    }
}

#[async_trait]
impl RegistrationStore for InMemoryStore {
    async fn load_responses(&self, committee: &GroupId) -> StoreResult<Vec<LoadResponse>> {
        let state = self.state.read().await;
        Ok(state
            .load_responses
            .get(committee)
            .cloned()
            .unwrap_or_default())
    }

    async fn track_registrations(
        &self,
        committee: &GroupId,
    ) -> StoreResult<Vec<TrackRegistration>> {
        let state = self.state.read().await;
        Ok(state
            .track_registrations
            .get(committee)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RelationStore for InMemoryStore {
    async fn bulk_create(
        &self,
        relations: Vec<NewRelation>,
        version: RelationVersion,
        invocation: Option<InvocationId>,
    ) -> StoreResult<usize> {
        let dropped = self.take_dropped(relations.len());
        let keep = relations.len() - dropped;
        if dropped > 0 {
            debug!(dropped, "dropping relations on insert");
        }

        let mut state = self.state.write().await;
        state.relations.extend(
            relations
                .into_iter()
                .take(keep)
                .map(|r| r.materialize(version, invocation)),
        );
        Ok(keep)
    }

    async fn soft_delete(
        &self,
        scope: &RelationScope,
        invocation: Option<InvocationId>,
    ) -> StoreResult<usize> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut removed = 0;
        for relation in state
            .relations
            .iter_mut()
            .filter(|r| r.is_active() && scope.matches(r))
        {
            relation.lifecycle = Lifecycle::SoftDeleted {
                at: now,
                by: invocation,
            };
            removed += 1;
        }

        let lag_reads = self.deletion_lag_reads.lock().map(|r| *r).unwrap_or(0);
        if removed > 0 && lag_reads > 0 {
            if let Ok(mut lag) = self.lag.lock() {
                lag.reads = lag_reads;
                lag.phantom = removed;
            }
        }
        Ok(removed)
    }

    async fn count(&self, scope: &RelationScope) -> StoreResult<usize> {
        let phantom = match self.lag.lock() {
            Ok(mut lag) if lag.reads > 0 => {
                lag.reads -= 1;
                lag.phantom
            }
            _ => 0,
        };
        let state = self.state.read().await;
        let active = state
            .relations
            .iter()
            .filter(|r| r.is_active() && scope.matches(r))
            .count();
        Ok(active + phantom)
    }

    async fn list(&self, scope: &RelationScope) -> StoreResult<Vec<Relation>> {
        let state = self.state.read().await;
        Ok(state
            .relations
            .iter()
            .filter(|r| r.is_active() && scope.matches(r))
            .cloned()
            .collect())
    }

    async fn append_record(&self, record: ReplacementRecord) -> StoreResult<()> {
        self.state.write().await.records.push(record);
        Ok(())
    }

    async fn records(&self, scope: &RelationScope) -> StoreResult<Vec<ReplacementRecord>> {
        let key = scope.key();
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.scope.key() == key)
            .cloned()
            .collect())
    }
}
