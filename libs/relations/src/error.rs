//! Error types for relation construction.

use thiserror::Error;

use crate::RelationKind;

/// Errors that can occur when building relations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelationError {
    /// The weight is outside the kind's domain.
    #[error("invalid {kind} weight {weight}: {reason}")]
    InvalidWeight {
        kind: RelationKind,
        weight: String,
        reason: &'static str,
    },

    /// A required builder field was not set.
    #[error("relation is missing required field '{0}'")]
    MissingField(&'static str),

    /// The relation head does not fit the kind.
    #[error("{kind} relations cannot be headed by {head}")]
    InvalidHead { kind: RelationKind, head: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RelationError {
    fn from(err: serde_json::Error) -> Self {
        RelationError::Serialization(err.to_string())
    }
}
