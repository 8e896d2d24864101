//! Data models, split by where they live:
//!
//! - `db` holds documents as stored in MongoDB.
//! - `api` holds request and response bodies.
//! - `common` holds types shared by both.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;
