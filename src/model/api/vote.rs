use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::db::ballot::Ballot;

use super::id::ApiId;

/// A vote for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: ApiId,
}

/// A recorded ballot, as shown to the student who cast it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotDescription {
    pub id: ApiId,
    pub candidate_id: ApiId,
    pub position_id: String,
    pub cast_at: DateTime<Utc>,
}

impl From<Ballot> for BallotDescription {
    fn from(ballot: Ballot) -> Self {
        Self {
            id: ballot.id.into(),
            candidate_id: ballot.ballot.candidate_id.into(),
            position_id: ballot.ballot.position_id,
            cast_at: ballot.ballot.cast_at,
        }
    }
}

/// The positions a student has already voted for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotedPositions {
    pub positions: Vec<String>,
}
