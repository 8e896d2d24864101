use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Client, ClientSession, Database};
use rocket::http::Status;

use crate::error::{Error, Result};
use crate::model::{
    common::{
        audit::{AuditAction, EntityType},
        position::Position,
    },
    db::{
        audit_log::NewAuditLogEntry,
        ballot::{Ballot, BallotCore},
        candidate::Candidate,
        election_status::ElectionStatus,
        user::User,
    },
    mongodb::{
        errors::{is_duplicate_key_error, is_write_conflict_error},
        Coll, Id,
    },
};
use crate::notifier::Notifier;

use super::eligibility::{can_vote, DenyReason};

/// Cast `voter`'s ballot for a candidate.
///
/// Eligibility is re-checked inside the same transaction that inserts the
/// ballot, bumps the candidate's count and writes the audit entry, so either
/// all three happen or none do. The unique `(voter_id, position_id)` index
/// backs up the one-ballot-per-position rule against concurrent attempts.
///
/// Once committed the vote is final: the confirmation message is attempted
/// once and a delivery failure is only logged.
pub async fn cast_vote(
    db_client: &Client,
    db: &Database,
    notifier: &dyn Notifier,
    voter: &User,
    candidate_id: Id,
    now: DateTime<Utc>,
) -> Result<Ballot> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let (ballot, candidate) = record(db, &mut session, voter, candidate_id, now)
        .await
        .map_err(classify_write_error)?;
    session
        .commit_transaction()
        .await
        .map_err(|e| classify_write_error(e.into()))?;

    info!(
        "Recorded ballot {} from voter {} for position {}",
        ballot.id, voter.id, ballot.position_id
    );

    // Best effort: the vote stands whatever happens here.
    if let Some(ref phone) = voter.phone {
        let position = Position::lookup(&candidate.position_id);
        if let Err(e) = notifier
            .notify_vote_cast(phone, &candidate.name, position.title)
            .await
        {
            warn!("Vote confirmation for ballot {} not sent: {e}", ballot.id);
        }
    }

    Ok(ballot)
}

/// The transactional part of casting a vote.
async fn record(
    db: &Database,
    session: &mut ClientSession,
    voter: &User,
    candidate_id: Id,
    now: DateTime<Utc>,
) -> Result<(Ballot, Candidate)> {
    let statuses = Coll::<ElectionStatus>::from_db(db);
    let candidates = Coll::<Candidate>::from_db(db);
    let ballots = Coll::<Ballot>::from_db(db);
    let audit_log = Coll::<NewAuditLogEntry>::from_db(db);

    // Gather everything the decision depends on, fresh.
    let status = ElectionStatus::current_with_session(&statuses, session).await?;
    let candidate = candidates
        .find_one_with_session(candidate_id.as_doc(), None, session)
        .await?;
    let voted_positions: HashSet<String> = ballots
        .distinct_with_session("position_id", doc! { "voter_id": voter.id }, None, session)
        .await?
        .into_iter()
        .filter_map(|position| position.as_str().map(str::to_string))
        .collect();

    can_vote(&status, candidate.as_ref(), &voted_positions, now).into_result()?;
    let candidate = candidate.ok_or(DenyReason::CandidateNotFound)?;

    let ballot = Ballot {
        id: Id::new(),
        ballot: BallotCore::new(voter.id, &candidate, now),
    };
    ballots
        .insert_one_with_session(&ballot, None, session)
        .await?;

    let increment = doc! { "$inc": { "vote_count": 1 } };
    candidates
        .update_one_with_session(candidate.id.as_doc(), increment, None, session)
        .await?;

    let metadata = doc! {
        "candidate_id": candidate.id,
        "position_id": &candidate.position_id,
    };
    NewAuditLogEntry::new(
        AuditAction::VoteCreate,
        EntityType::Vote,
        ballot.id,
        voter.id,
        metadata,
    )
    .record_with_session(&audit_log, session)
    .await?;

    Ok((ballot, candidate))
}

/// Report storage-level conflicts in voting terms.
fn classify_write_error(err: Error) -> Error {
    match err {
        Error::Db(ref e) if is_duplicate_key_error(e) => DenyReason::AlreadyVoted.into(),
        Error::Db(ref e) if is_write_conflict_error(e) => {
            warn!("Concurrent vote write conflict: {e}");
            Error::Status(
                Status::Conflict,
                "Another vote was being recorded at the same time, please try again".to_string(),
            )
        }
        other => other,
    }
}
