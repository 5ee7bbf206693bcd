//! Relation kinds and their weight domains.

use serde::{Deserialize, Serialize};

use crate::{Head, RelationError};

/// Weight carried by every conflict relation.
pub const CONFLICT_WEIGHT: f64 = -1.0;

/// Label carried by every conflict relation.
pub const CONFLICT_LABEL: &str = "Conflict";

/// Upper bound for a custom capacity weight.
pub const MAX_CUSTOM_CAPACITY: u32 = 1_000;

/// Decimal places kept on affinity scores.
pub const SCORE_PRECISION: i32 = 4;

/// Kind tag of a derived relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Conflict,
    AffinityScore,
    CustomCapacity,
    ProposedAssignment,
    Assignment,
    InviteAssignment,
    Status,
    Track,
    Seniority,
}

impl RelationKind {
    /// All kinds, in a stable order.
    pub const ALL: [RelationKind; 9] = [
        RelationKind::Conflict,
        RelationKind::AffinityScore,
        RelationKind::CustomCapacity,
        RelationKind::ProposedAssignment,
        RelationKind::Assignment,
        RelationKind::InviteAssignment,
        RelationKind::Status,
        RelationKind::Track,
        RelationKind::Seniority,
    ];

    /// Invitation-style suffix used when naming the relation set,
    /// e.g. `ACL/2025/Reviewers/-/Affinity_Score`.
    pub fn suffix(&self) -> &'static str {
        match self {
            RelationKind::Conflict => "Conflict",
            RelationKind::AffinityScore => "Affinity_Score",
            RelationKind::CustomCapacity => "Custom_Max_Papers",
            RelationKind::ProposedAssignment => "Proposed_Assignment",
            RelationKind::Assignment => "Assignment",
            RelationKind::InviteAssignment => "Invite_Assignment",
            RelationKind::Status => "Status",
            RelationKind::Track => "Research_Area",
            RelationKind::Seniority => "Seniority",
        }
    }

    /// Whether a work-item-headed relation of this kind must hide from the
    /// work item's authors.
    pub fn hidden_from_authors(&self) -> bool {
        !matches!(self, RelationKind::CustomCapacity | RelationKind::Seniority)
    }

    /// Whether the kind accepts the given head.
    pub fn accepts_head(&self, head: &Head) -> bool {
        match self {
            RelationKind::CustomCapacity | RelationKind::Seniority => {
                matches!(head, Head::Group(_))
            }
            RelationKind::ProposedAssignment | RelationKind::Assignment => {
                matches!(head, Head::WorkItem(_) | Head::Candidate(_))
            }
            RelationKind::Conflict
            | RelationKind::AffinityScore
            | RelationKind::InviteAssignment
            | RelationKind::Status
            | RelationKind::Track => matches!(head, Head::WorkItem(_)),
        }
    }

    /// Validate and normalise a weight for this kind.
    ///
    /// Returns the weight that will actually be stored.
    pub fn normalize_weight(&self, weight: Option<f64>) -> Result<Option<f64>, RelationError> {
        if let Some(w) = weight {
            if !w.is_finite() {
                return Err(self.invalid(w, "weight must be finite"));
            }
        }

        match self {
            RelationKind::Conflict => match weight {
                None => Ok(Some(CONFLICT_WEIGHT)),
                Some(w) if w == CONFLICT_WEIGHT => Ok(Some(w)),
                Some(w) => Err(self.invalid(w, "conflict weight is always -1")),
            },
            RelationKind::AffinityScore => match weight {
                None => Err(RelationError::MissingField("weight")),
                Some(w) => Ok(Some(normalize_score(w))),
            },
            RelationKind::CustomCapacity => match weight {
                None => Err(RelationError::MissingField("weight")),
                Some(w) if w.fract() != 0.0 => {
                    Err(self.invalid(w, "capacity must be a whole number"))
                }
                Some(w) if w < 0.0 || w > f64::from(MAX_CUSTOM_CAPACITY) => {
                    Err(self.invalid(w, "capacity out of range"))
                }
                Some(w) => Ok(Some(w)),
            },
            RelationKind::Track | RelationKind::Seniority => Ok(Some(weight.unwrap_or(1.0))),
            RelationKind::ProposedAssignment
            | RelationKind::Assignment
            | RelationKind::InviteAssignment
            | RelationKind::Status => Ok(weight),
        }
    }

    fn invalid(&self, weight: f64, reason: &'static str) -> RelationError {
        RelationError::InvalidWeight {
            kind: *self,
            weight: weight.to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Clamp a raw affinity score to `[0, +inf)` and round to four decimals.
pub fn normalize_score(raw: f64) -> f64 {
    let factor = 10f64.powi(SCORE_PRECISION);
    (raw.max(0.0) * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use revassign_id::{GroupId, WorkItemId};
    use rstest::rstest;

    #[test]
    fn test_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&RelationKind::AffinityScore).unwrap(),
            "\"affinity_score\""
        );
        assert_eq!(RelationKind::CustomCapacity.to_string(), "Custom_Max_Papers");
    }

    #[rstest]
    #[case(0.123456, 0.1235)]
    #[case(-0.5, 0.0)]
    #[case(0.99996, 1.0)]
    #[case(12.0, 12.0)]
    fn test_normalize_score(#[case] raw: f64, #[case] expected: f64) {
        assert_eq!(normalize_score(raw), expected);
    }

    #[rstest]
    #[case(RelationKind::Conflict, None, Some(-1.0))]
    #[case(RelationKind::Track, None, Some(1.0))]
    #[case(RelationKind::Status, None, None)]
    #[case(RelationKind::CustomCapacity, Some(6.0), Some(6.0))]
    #[case(RelationKind::AffinityScore, Some(-3.0), Some(0.0))]
    fn test_weight_domains_accept(
        #[case] kind: RelationKind,
        #[case] weight: Option<f64>,
        #[case] expected: Option<f64>,
    ) {
        assert_eq!(kind.normalize_weight(weight).unwrap(), expected);
    }

    #[rstest]
    #[case(RelationKind::Conflict, Some(0.5))]
    #[case(RelationKind::CustomCapacity, Some(2.5))]
    #[case(RelationKind::CustomCapacity, Some(-1.0))]
    #[case(RelationKind::CustomCapacity, Some(5_000.0))]
    #[case(RelationKind::CustomCapacity, None)]
    #[case(RelationKind::AffinityScore, Some(f64::INFINITY))]
    #[case(RelationKind::Assignment, Some(f64::NAN))]
    fn test_weight_domains_reject(#[case] kind: RelationKind, #[case] weight: Option<f64>) {
        assert!(kind.normalize_weight(weight).is_err());
    }

    #[test]
    fn test_accepts_head() {
        let work_item = Head::WorkItem(WorkItemId::new());
        let group = Head::Group(GroupId::parse("V/Reviewers").unwrap());
        assert!(RelationKind::Conflict.accepts_head(&work_item));
        assert!(!RelationKind::Conflict.accepts_head(&group));
        assert!(RelationKind::CustomCapacity.accepts_head(&group));
        assert!(!RelationKind::Seniority.accepts_head(&work_item));
    }

    proptest! {
        #[test]
        fn prop_normalized_score_is_non_negative_and_stable(raw in -1.0e6f64..1.0e6) {
            let once = normalize_score(raw);
            prop_assert!(once >= 0.0);
            prop_assert_eq!(normalize_score(once), once);
        }
    }
}
