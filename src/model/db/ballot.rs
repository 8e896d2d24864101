use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

use super::candidate::Candidate;

/// Core ballot data: one voter's choice for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCore {
    pub voter_id: Id,
    pub candidate_id: Id,
    /// Copied from the candidate when cast, so uniqueness per position can be indexed.
    pub position_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl BallotCore {
    /// A ballot from `voter_id` for the given candidate.
    pub fn new(voter_id: Id, candidate: &Candidate, cast_at: DateTime<Utc>) -> Self {
        Self {
            voter_id,
            candidate_id: candidate.id,
            position_id: candidate.position_id.clone(),
            cast_at,
        }
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}
