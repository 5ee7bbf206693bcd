//! # revassign-relations
//!
//! The generic derived-edge model shared by every engine component.
//!
//! ## Design Principles
//!
//! - Every derived fact (conflict, score, capacity, assignment, status, ...)
//!   is one `Relation` tagged with a `RelationKind`
//! - Each kind owns its weight domain; `NewRelation::build` rejects weights
//!   outside it (a capacity is a bounded integer, a score a clamped float)
//! - Relations are never edited in place: a refresh soft-deletes the active
//!   set of a `RelationScope` and appends a new version
//! - Every refresh leaves a `ReplacementRecord` in an append-only log keyed by
//!   (kind, scope, version)

mod error;
mod kind;
mod record;
mod relation;
mod scope;

pub use error::RelationError;
pub use kind::*;
pub use record::ReplacementRecord;
pub use relation::*;
pub use scope::RelationScope;
