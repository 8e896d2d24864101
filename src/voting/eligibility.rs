use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rocket::http::Status;

use crate::error::Error;
use crate::model::db::{candidate::Candidate, election_status::ElectionStatus};

/// Why a vote attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    VotingNotActive,
    NotStarted(DateTime<Utc>),
    Ended,
    CandidateNotFound,
    AlreadyVoted,
}

impl DenyReason {
    /// The HTTP status a refusal is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::CandidateNotFound => Status::NotFound,
            _ => Status::BadRequest,
        }
    }
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VotingNotActive => write!(f, "Voting is not currently active"),
            Self::NotStarted(start) => write!(
                f,
                "Voting has not started yet. It will begin at {}",
                start.to_rfc3339()
            ),
            Self::Ended => write!(f, "Voting has ended"),
            Self::CandidateNotFound => write!(f, "Candidate not found"),
            Self::AlreadyVoted => write!(f, "You have already voted for this position"),
        }
    }
}

impl From<DenyReason> for Error {
    fn from(reason: DenyReason) -> Self {
        Error::Status(reason.status(), reason.to_string())
    }
}

/// The outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(DenyReason),
}

impl Eligibility {
    /// Convert into a `Result`, for use with `?`.
    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(reason),
        }
    }
}

/// Decide whether a voter may vote for `candidate` at `now`.
///
/// `voted_positions` holds the positions the voter already has a ballot for.
/// Checks run in a fixed order and the first failure wins, so an inactive
/// election always reports as inactive regardless of anything else.
pub fn can_vote(
    status: &ElectionStatus,
    candidate: Option<&Candidate>,
    voted_positions: &HashSet<String>,
    now: DateTime<Utc>,
) -> Eligibility {
    if !status.is_active {
        return Eligibility::Deny(DenyReason::VotingNotActive);
    }
    if let Some(start) = status.start_time {
        if now < start {
            return Eligibility::Deny(DenyReason::NotStarted(start));
        }
    }
    if let Some(end) = status.end_time {
        if now > end {
            return Eligibility::Deny(DenyReason::Ended);
        }
    }
    let Some(candidate) = candidate else {
        return Eligibility::Deny(DenyReason::CandidateNotFound);
    };
    if voted_positions.contains(&candidate.position_id) {
        return Eligibility::Deny(DenyReason::AlreadyVoted);
    }
    Eligibility::Allow
}
