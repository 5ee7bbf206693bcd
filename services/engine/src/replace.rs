//! Total replacement of relation sets.
//!
//! Every component that produces a complete relation set goes through
//! [`BulkReplacer::replace`]:
//! 1. soft-delete the active relations of the scope
//! 2. wait until the store reports none left
//! 3. insert the new set in concurrent batches
//! 4. fail if fewer relations are active than were requested
//! 5. append a [`ReplacementRecord`]
//!
//! The whole sequence runs under a lock keyed by committee and kind, so
//! replacements of overlapping scopes never interleave and `read_active`
//! never observes a half-replaced set.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures_util::{stream, StreamExt, TryStreamExt};
use revassign_id::{InvocationId, RelationVersion};
use revassign_reconcile::{never_cancelled, poll_until, Clock, PollOutcome, PollPolicy, SetDigest};
use revassign_relations::{NewRelation, Relation, RelationScope, ReplacementRecord};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::store::{RelationStore, StoreError};

/// Outcome of one total replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOutcome {
    pub scope: RelationScope,
    pub version: RelationVersion,
    pub removed: usize,
    pub requested: usize,
    pub active: usize,
    pub digest: String,
    /// The new set is identical to the previous version's.
    pub unchanged: bool,
}

/// The shared delete, insert, verify primitive.
pub struct BulkReplacer {
    relations: Arc<dyn RelationStore>,
    clock: Arc<dyn Clock>,
    deletion_poll: PollPolicy,
    batch_size: usize,
    concurrency: usize,
    invocation: Option<InvocationId>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BulkReplacer {
    pub fn new(relations: Arc<dyn RelationStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            relations,
            clock,
            deletion_poll: config.deletion_poll,
            batch_size: config.batch_size.max(1),
            concurrency: config.bulk_concurrency.max(1),
            invocation: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Tag every write with the invocation that made it.
    #[must_use]
    pub fn with_invocation(mut self, invocation: InvocationId) -> Self {
        self.invocation = Some(invocation);
        self
    }

    pub fn invocation(&self) -> Option<InvocationId> {
        self.invocation
    }

    async fn lock(&self, scope: &RelationScope) -> OwnedMutexGuard<()> {
        let key = scope.lock_key();
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Replaces the active set of `scope` with `relations`.
    ///
    /// # Errors
    ///
    /// - `OutOfScope` if a relation does not belong to `scope` (nothing is touched)
    /// - `Poll` if the soft-delete is never acknowledged
    /// - `CountMismatch` if fewer relations are active afterwards than requested
    #[instrument(skip(self, relations), fields(scope = %scope, requested = relations.len()))]
    pub async fn replace(
        &self,
        scope: &RelationScope,
        relations: Vec<NewRelation>,
    ) -> EngineResult<ReplaceOutcome> {
        check_scope(scope, &relations)?;
        let relations = dedupe(relations);
        let requested = relations.len();
        let digest = SetDigest::of(&relations)
            .map_err(StoreError::from)?
            .into_inner();

        let _guard = self.lock(scope).await;

        let previous = self.relations.records(scope).await?.pop();
        let version = previous
            .as_ref()
            .map_or(RelationVersion::INITIAL, |r| r.version)
            .next();

        let removed = self.retire_locked(scope).await?;
        self.insert_batches(relations, version).await?;

        let active = self.relations.count(scope).await?;
        if active < requested {
            return Err(EngineError::CountMismatch {
                scope: scope.key(),
                requested,
                active,
            });
        }

        let unchanged = previous.as_ref().is_some_and(|p| p.digest == digest);
        self.relations
            .append_record(ReplacementRecord {
                scope: scope.clone(),
                version,
                digest: digest.clone(),
                requested,
                removed,
                active_after: active,
                invocation: self.invocation,
                occurred_at: Utc::now(),
            })
            .await?;

        info!(
            version = %version,
            removed,
            inserted = requested,
            unchanged,
            "replaced relation set"
        );

        Ok(ReplaceOutcome {
            scope: scope.clone(),
            version,
            removed,
            requested,
            active,
            digest,
            unchanged,
        })
    }

    /// Appends relations to `scope` without removing anything.
    ///
    /// # Errors
    ///
    /// `CountMismatch` if the active count did not grow by `relations.len()`.
    #[instrument(skip(self, relations), fields(scope = %scope, requested = relations.len()))]
    pub async fn insert(&self, scope: &RelationScope, relations: Vec<NewRelation>) -> EngineResult<usize> {
        check_scope(scope, &relations)?;
        if relations.is_empty() {
            return Ok(0);
        }
        let requested = relations.len();

        let _guard = self.lock(scope).await;
        let version = self
            .relations
            .records(scope)
            .await?
            .pop()
            .map_or(RelationVersion::INITIAL, |r| r.version);

        let before = self.relations.count(scope).await?;
        self.insert_batches(relations, version).await?;
        let active = self.relations.count(scope).await?;
        if active < before + requested {
            return Err(EngineError::CountMismatch {
                scope: scope.key(),
                requested: before + requested,
                active,
            });
        }
        debug!(inserted = requested, "inserted relations");
        Ok(requested)
    }

    /// Soft-deletes the active set of `scope` and waits for acknowledgement.
    pub async fn retire(&self, scope: &RelationScope) -> EngineResult<usize> {
        let _guard = self.lock(scope).await;
        self.retire_locked(scope).await
    }

    /// Active relations of `scope`, never mid-replacement.
    pub async fn read_active(&self, scope: &RelationScope) -> EngineResult<Vec<Relation>> {
        let _guard = self.lock(scope).await;
        Ok(self.relations.list(scope).await?)
    }

    async fn retire_locked(&self, scope: &RelationScope) -> EngineResult<usize> {
        let removed = self.relations.soft_delete(scope, self.invocation).await?;
        if removed > 0 {
            debug!(scope = %scope, removed, "soft-deleted active relations");
        }

        let mut cancel = never_cancelled();
        let resource = format!("soft-delete of {}", scope.key());
        poll_until(
            &self.deletion_poll,
            self.clock.as_ref(),
            &mut cancel,
            &resource,
            |_| {
                let relations = self.relations.clone();
                let scope = scope.clone();
                async move {
                    let remaining = relations.count(&scope).await?;
                    Ok::<_, EngineError>(if remaining == 0 {
                        PollOutcome::Ready(())
                    } else {
                        PollOutcome::Pending
                    })
                }
            },
        )
        .await?;

        Ok(removed)
    }

    async fn insert_batches(&self, relations: Vec<NewRelation>, version: RelationVersion) -> EngineResult<usize> {
        let mut batches = Vec::new();
        let mut iter = relations.into_iter().peekable();
        while iter.peek().is_some() {
            batches.push(iter.by_ref().take(self.batch_size).collect::<Vec<_>>());
        }

        let invocation = self.invocation;
        let stored: Vec<usize> = stream::iter(batches.into_iter().map(|batch| {
            let store = self.relations.clone();
            async move { store.bulk_create(batch, version, invocation).await }
        }))
        .buffer_unordered(self.concurrency)
        .try_collect()
        .await?;

        Ok(stored.into_iter().sum())
    }
}

fn check_scope(scope: &RelationScope, relations: &[NewRelation]) -> EngineResult<()> {
    match relations.iter().find(|r| !scope.covers(r)) {
        Some(stray) => Err(EngineError::OutOfScope {
            scope: scope.key(),
            head: stray.head.to_string(),
            tail: stray.tail.to_string(),
        }),
        None => Ok(()),
    }
}

/// Keeps the first relation per (head, tail, label).
fn dedupe(relations: Vec<NewRelation>) -> Vec<NewRelation> {
    let mut seen = HashSet::new();
    let before = relations.len();
    let kept: Vec<_> = relations
        .into_iter()
        .filter(|r| seen.insert((r.head.clone(), r.tail.clone(), r.label.clone())))
        .collect();
    if kept.len() < before {
        debug!(dropped = before - kept.len(), "dropped duplicate relations");
    }
    kept
}
