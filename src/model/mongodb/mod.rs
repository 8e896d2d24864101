mod bson;
mod collection;
pub mod errors;

pub use bson::{optional_chrono_datetime, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
