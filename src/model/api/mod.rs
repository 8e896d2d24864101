//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Password hashes never leave the server.

pub mod audit;
pub mod auth;
pub mod candidate;
pub mod election;
pub mod id;
pub mod otp;
pub mod pagination;
pub mod results;
pub mod sms;
pub mod user;
pub mod vote;
