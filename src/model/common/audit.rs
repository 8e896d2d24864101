use mongodb::bson::Bson;
use rocket::form::FromFormField;
use serde::{Deserialize, Serialize};

/// Every mutating action that leaves an audit trail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, FromFormField)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    #[field(value = "VOTE_CREATE")]
    VoteCreate,
    #[field(value = "CANDIDATE_CREATE")]
    CandidateCreate,
    #[field(value = "CANDIDATE_UPDATE")]
    CandidateUpdate,
    #[field(value = "CANDIDATE_DELETE")]
    CandidateDelete,
    #[field(value = "ELECTION_STATUS_UPDATE")]
    ElectionStatusUpdate,
    #[field(value = "USER_CREATE")]
    UserCreate,
    #[field(value = "USER_DELETE")]
    UserDelete,
    #[field(value = "PASSWORD_RESET")]
    PasswordReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoteCreate => "VOTE_CREATE",
            Self::CandidateCreate => "CANDIDATE_CREATE",
            Self::CandidateUpdate => "CANDIDATE_UPDATE",
            Self::CandidateDelete => "CANDIDATE_DELETE",
            Self::ElectionStatusUpdate => "ELECTION_STATUS_UPDATE",
            Self::UserCreate => "USER_CREATE",
            Self::UserDelete => "USER_DELETE",
            Self::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl From<AuditAction> for Bson {
    fn from(action: AuditAction) -> Self {
        Bson::String(action.as_str().to_string())
    }
}

/// The kind of entity an audit entry refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Vote,
    Candidate,
    ElectionStatus,
    User,
}
