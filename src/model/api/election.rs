use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::{election_status::ElectionStatus, status_change::StatusChange};

use super::id::ApiId;

/// The election status as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatusDescription {
    pub is_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<ElectionStatus> for ElectionStatusDescription {
    fn from(status: ElectionStatus) -> Self {
        Self {
            is_active: status.is_active,
            start_time: status.start_time,
            end_time: status.end_time,
            updated_at: status.updated_at,
        }
    }
}

/// A past election status change, as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeDescription {
    pub id: ApiId,
    pub is_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub changed_by: ApiId,
    pub changed_at: DateTime<Utc>,
}

impl From<StatusChange> for StatusChangeDescription {
    fn from(change: StatusChange) -> Self {
        Self {
            id: change.id.into(),
            is_active: change.change.is_active,
            start_time: change.change.start_time,
            end_time: change.change.end_time,
            changed_by: change.change.changed_by.into(),
            changed_at: change.change.changed_at,
        }
    }
}

/// The election status as shown to everyone, with participation so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicElectionStatus {
    #[serde(flatten)]
    pub status: ElectionStatusDescription,
    pub total_voters: u64,
    pub voted_count: u64,
}

/// A new election status from an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionStatusUpdate {
    pub is_active: bool,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl ElectionStatusUpdate {
    /// Build the status to store, checking the window is the right way round.
    pub fn into_status(self, now: DateTime<Utc>) -> Result<ElectionStatus> {
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                return Err(Error::bad_request("Start time must be before end time"));
            }
        }
        Ok(ElectionStatus {
            is_active: self.is_active,
            start_time: self.start_time,
            end_time: self.end_time,
            updated_at: Some(now),
        })
    }
}
