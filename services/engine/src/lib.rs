//! revassign assignment and conflict engine.
//!
//! Produces the solver inputs for a review cycle (affinity scores, conflicts,
//! custom capacities, tracks, seniority), deploys the solver's proposals, and
//! carries prior-cycle decisions over to resubmissions. All state lives in the
//! stores behind [`store::Stores`].

pub mod capacity;
pub mod carryover;
pub mod config;
pub mod conflicts;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod features;
pub mod model;
pub mod permissions;
pub mod replace;
pub mod scores;
pub mod scoring;
pub mod seniority;
pub mod store;
pub mod tracks;

pub use engine::{AssignmentEngine, MatchingStatus, ScoreSource, SetupOptions};
pub use error::{EngineError, EngineResult};
