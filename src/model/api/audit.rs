use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::Serialize;

use crate::model::{
    common::audit::{AuditAction, EntityType},
    db::audit_log::AuditLogEntry,
};

use super::id::ApiId;

/// An audit log entry as returned to admins.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntryDescription {
    pub id: ApiId,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: Option<ApiId>,
    pub actor_id: ApiId,
    pub metadata: Document,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditLogEntry> for AuditLogEntryDescription {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            id: entry.id.into(),
            action: entry.entry.action,
            entity_type: entry.entry.entity_type,
            entity_id: entry.entry.entity_id.map(Into::into),
            actor_id: entry.entry.actor_id.into(),
            metadata: entry.entry.metadata,
            timestamp: entry.entry.timestamp,
        }
    }
}
