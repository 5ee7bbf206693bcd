//! # revassign-id
//!
//! Typed identifiers for the review-assignment engine.
//!
//! ## Two kinds of identity
//!
//! - **Engine-minted ids** (`RelationId`, `WorkItemId`, `InvocationId`) are
//!   ULID-backed with a type prefix: `{prefix}_{ulid}`, e.g.
//!   `rel_01HV4Z2WQXKJNM8GPQY6VBKC3D`. They sort by creation time.
//! - **Externally-owned keys** (`CandidateId`, `GroupId`, `JobId`) are opaque
//!   strings assigned by the profile store, the group store, or the external
//!   scoring service (`~Ada_Lovelace1`, `ACL/2025/Reviewers`, `job-42`). They
//!   are validated (non-empty, no surrounding whitespace) but otherwise kept
//!   verbatim.
//!
//! Mixing the two is a type error: a relation tail is always a `CandidateId`,
//! a committee is always a `GroupId`.

mod error;
mod macros;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use macros::parse_prefixed;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
