//! Types shared between the database and API representations.

pub mod audit;
pub mod position;
pub mod user;
