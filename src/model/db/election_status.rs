use chrono::{DateTime, Utc};
use mongodb::{bson::doc, options::ReplaceOptions, ClientSession};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::{optional_chrono_datetime, Coll};

/// The `_id` of the single status document.
pub const ELECTION_STATUS_ID: &str = "current";

/// Whether voting is open, and the window in which it may happen.
/// A missing bound leaves that side of the window unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    pub is_active: bool,
    #[serde(default, with = "optional_chrono_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_chrono_datetime")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_chrono_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ElectionStatus {
    /// Read the stored status, if one has ever been saved.
    pub async fn stored(statuses: &Coll<ElectionStatus>) -> Result<Option<Self>> {
        let status = statuses
            .find_one(doc! { "_id": ELECTION_STATUS_ID }, None)
            .await?;
        Ok(status)
    }

    /// Read the current status, treating a missing document as inactive.
    pub async fn current(statuses: &Coll<ElectionStatus>) -> Result<Self> {
        Ok(Self::stored(statuses).await?.unwrap_or_default())
    }

    /// As [`Self::current`], but inside a transaction.
    pub async fn current_with_session(
        statuses: &Coll<ElectionStatus>,
        session: &mut ClientSession,
    ) -> Result<Self> {
        let status = statuses
            .find_one_with_session(doc! { "_id": ELECTION_STATUS_ID }, None, session)
            .await?;
        Ok(status.unwrap_or_default())
    }

    /// Overwrite the stored status, creating it if needed.
    pub async fn save(&self, statuses: &Coll<ElectionStatus>) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        statuses
            .replace_one(doc! { "_id": ELECTION_STATUS_ID }, self, options)
            .await?;
        Ok(())
    }
}
