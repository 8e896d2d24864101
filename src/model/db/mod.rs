//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

pub mod audit_log;
pub mod ballot;
pub mod candidate;
pub mod election_status;
pub mod status_change;
pub mod user;
