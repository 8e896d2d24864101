//! Vote casting and tallying.

pub mod eligibility;
pub mod recorder;
pub mod tally;

pub use eligibility::{can_vote, DenyReason, Eligibility};
pub use recorder::cast_vote;
pub use tally::{compute_results, CandidateTally, PositionResult, Statistics, Winners};
