use chrono::{DateTime, Utc};
use revassign_id::{InvocationId, RelationVersion};
use serde::{Deserialize, Serialize};

use crate::RelationScope;

/// One entry of the append-only replacement log.
///
/// Written after every successful total replacement of a scope. `digest` is a
/// fingerprint of the requested set, so two records with the same digest mean
/// the refresh changed nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementRecord {
    pub scope: RelationScope,
    pub version: RelationVersion,
    pub digest: String,
    /// Relations the caller asked to insert.
    pub requested: usize,
    /// Active relations soft-deleted before the insert.
    pub removed: usize,
    /// Active relations counted after the insert.
    pub active_after: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<InvocationId>,
    pub occurred_at: DateTime<Utc>,
}

impl ReplacementRecord {
    /// Returns true if this record replaced the scope with the same set as `previous`.
    pub fn is_noop_after(&self, previous: &ReplacementRecord) -> bool {
        self.scope == previous.scope && self.digest == previous.digest
    }
}
