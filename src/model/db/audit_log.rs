use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{serde_helpers::chrono_datetime_as_bson_datetime, Document},
    ClientSession,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::audit::{AuditAction, EntityType},
    mongodb::{Coll, Id},
};

/// An append-only record of a mutating action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntryCore {
    pub action: AuditAction,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<Id>,
    pub actor_id: Id,
    #[serde(default)]
    pub metadata: Document,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntryCore {
    pub fn new(
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl Into<Option<Id>>,
        actor_id: Id,
        metadata: Document,
    ) -> Self {
        Self {
            action,
            entity_type,
            entity_id: entity_id.into(),
            actor_id,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Append this entry to the log.
    pub async fn record(self, log: &Coll<NewAuditLogEntry>) -> Result<()> {
        log.insert_one(self, None).await?;
        Ok(())
    }

    /// Append this entry to the log as part of a transaction.
    pub async fn record_with_session(
        self,
        log: &Coll<NewAuditLogEntry>,
        session: &mut ClientSession,
    ) -> Result<()> {
        log.insert_one_with_session(self, None, session).await?;
        Ok(())
    }
}

/// An audit entry without an ID.
pub type NewAuditLogEntry = AuditLogEntryCore;

/// An audit entry from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub entry: AuditLogEntryCore,
}

impl Deref for AuditLogEntry {
    type Target = AuditLogEntryCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}
