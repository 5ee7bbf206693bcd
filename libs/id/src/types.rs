//! Typed ID definitions for engine resources.

use crate::{define_id, define_key};

// =============================================================================
// Engine-minted identifiers
// =============================================================================

define_id!(RelationId, "rel");
define_id!(WorkItemId, "sub");
define_id!(InvocationId, "inv");

// =============================================================================
// Externally-owned keys
// =============================================================================

define_key!(CandidateId, "candidate");
define_key!(GroupId, "group");
define_key!(JobId, "job");

impl CandidateId {
    /// Prefix carried by canonical profile ids (as opposed to raw emails).
    pub const PROFILE_PREFIX: char = '~';

    /// Returns true if this key names a profile rather than a bare email.
    #[must_use]
    pub fn is_profile_id(&self) -> bool {
        self.0.starts_with(Self::PROFILE_PREFIX)
    }
}

impl GroupId {
    /// Path separator between group id segments.
    pub const SEPARATOR: char = '/';

    /// Appends a path segment: `ACL/2025` + `Reviewers` -> `ACL/2025/Reviewers`.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches(Self::SEPARATOR);
        Self(format!("{}{}{}", self.0, Self::SEPARATOR, segment))
    }

    /// The final path segment, e.g. `Reviewers`.
    #[must_use]
    pub fn last_segment(&self) -> &str {
        self.0
            .rsplit(Self::SEPARATOR)
            .next()
            .unwrap_or(self.0.as_str())
    }

    /// Returns true if `other` lives underneath this group's path.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &str) -> bool {
        other.len() > self.0.len()
            && other.starts_with(self.0.as_str())
            && other[self.0.len()..].starts_with(Self::SEPARATOR)
    }
}

// =============================================================================
// Relation Version
// =============================================================================

/// Version of a relation scope's active set.
///
/// Every total replacement of a (kind, scope) appends a new version; the
/// previous version becomes inactive. Versions start at 1 and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RelationVersion(u64);

impl RelationVersion {
    /// The version before any replacement happened.
    pub const INITIAL: Self = Self(0);

    /// Creates a version from a raw counter.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the underlying counter.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for RelationVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl serde::Serialize for RelationVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RelationVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = u64::deserialize(deserializer)?;
        Ok(Self(version))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relation_id_roundtrip() {
        let id = RelationId::new();
        let s = id.to_string();
        let parsed: RelationId = s.parse().unwrap();
        assert_eq!(id, parsed);
        assert!(s.starts_with("rel_"));
    }

    #[test]
    fn test_work_item_id_invalid_prefix() {
        let result: Result<WorkItemId, _> = "rel_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::InvalidPrefix { .. }
        ));
    }

    #[test]
    fn test_work_item_id_missing_separator() {
        let result: Result<WorkItemId, _> = "sub01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::MissingSeparator
        ));
    }

    #[test]
    fn test_work_item_id_invalid_ulid() {
        let result: Result<WorkItemId, _> = "sub_invalid".parse();
        assert!(matches!(result.unwrap_err(), crate::IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_work_item_id_json_roundtrip() {
        let id = WorkItemId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: WorkItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_serde_rejects_foreign_prefix_and_padded_keys() {
        let foreign = format!("\"{}\"", RelationId::new());
        assert!(serde_json::from_str::<WorkItemId>(&foreign).is_err());
        assert!(serde_json::from_str::<GroupId>("\" ACL/2025\"").is_err());

        let group: GroupId = serde_json::from_str("\"ACL/2025\"").unwrap();
        assert_eq!(serde_json::to_string(&group).unwrap(), "\"ACL/2025\"");
    }

    #[test]
    fn test_id_exposes_its_ulid() {
        let id = InvocationId::new();
        assert_eq!(InvocationId::from_ulid(id.ulid()), id);
        assert_eq!(crate::Ulid::from(id), id.ulid());
    }

    #[test]
    fn test_candidate_key_rejects_padding() {
        assert!(CandidateId::parse("").unwrap_err().is_empty());
        assert!(matches!(
            CandidateId::parse(" ~Ada_Lovelace1"),
            Err(crate::IdError::Whitespace { .. })
        ));
        let id = CandidateId::parse("~Ada_Lovelace1").unwrap();
        assert!(id.is_profile_id());
        assert!(!CandidateId::parse("ada@example.org").unwrap().is_profile_id());
    }

    #[test]
    fn test_candidate_key_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(CandidateId::parse("~Ada_Lovelace1").unwrap(), 3);
        assert_eq!(map.get("~Ada_Lovelace1"), Some(&3));
    }

    #[test]
    fn test_group_paths() {
        let venue = GroupId::parse("ACL/2025").unwrap();
        let reviewers = venue.join("Reviewers");
        assert_eq!(reviewers.as_str(), "ACL/2025/Reviewers");
        assert_eq!(reviewers.last_segment(), "Reviewers");
        assert!(venue.is_ancestor_of("ACL/2025/Submission3/Reviewer_x1"));
        assert!(!venue.is_ancestor_of("ACL/20251/Reviewers"));
        assert!(!venue.is_ancestor_of("ACL/2025"));
    }

    #[test]
    fn test_relation_version_next() {
        let v = RelationVersion::INITIAL;
        assert_eq!(v.next().value(), 1);
        assert_eq!(v.next().next().to_string(), "v2");
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = [RelationId::PREFIX, WorkItemId::PREFIX, InvocationId::PREFIX];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn prop_group_join_keeps_last_segment(segment in "[A-Za-z_]{1,16}") {
            let venue = GroupId::parse("Venue/2025").unwrap();
            let joined = venue.join(&segment);
            prop_assert_eq!(joined.last_segment(), segment.as_str());
            prop_assert!(venue.is_ancestor_of(joined.as_str()));
        }
    }
}
