use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::election_status::ElectionStatus,
    mongodb::{optional_chrono_datetime, Coll, Id},
};

/// One saved election status, kept after it has been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeCore {
    pub is_active: bool,
    #[serde(default, with = "optional_chrono_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_chrono_datetime")]
    pub end_time: Option<DateTime<Utc>>,
    pub changed_by: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub changed_at: DateTime<Utc>,
}

impl StatusChangeCore {
    pub fn new(status: &ElectionStatus, changed_by: Id) -> Self {
        Self {
            is_active: status.is_active,
            start_time: status.start_time,
            end_time: status.end_time,
            changed_by,
            changed_at: status.updated_at.unwrap_or_else(Utc::now),
        }
    }

    /// Append this change to the history.
    pub async fn record(self, history: &Coll<NewStatusChange>) -> Result<()> {
        history.insert_one(self, None).await?;
        Ok(())
    }
}

/// A status change without an ID.
pub type NewStatusChange = StatusChangeCore;

/// A status change from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub change: StatusChangeCore,
}

impl Deref for StatusChange {
    type Target = StatusChangeCore;

    fn deref(&self) -> &Self::Target {
        &self.change
    }
}
