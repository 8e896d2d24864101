use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    audit_log::{AuditLogEntry, NewAuditLogEntry},
    ballot::{Ballot, NewBallot},
    candidate::{Candidate, NewCandidate},
    election_status::ElectionStatus,
    status_change::{NewStatusChange, StatusChange},
    user::{NewUser, User},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<&State<Database>>().await {
            request::Outcome::Success(db) => request::Outcome::Success(Coll::from_db(db)),
            _ => request::Outcome::Failure((Status::InternalServerError, ())),
        }
    }
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Candidate collections
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}
impl MongoCollection for NewCandidate {
    const NAME: &'static str = CANDIDATES;
}

// Ballot collections
const BALLOTS: &str = "ballots";
impl MongoCollection for Ballot {
    const NAME: &'static str = BALLOTS;
}
impl MongoCollection for NewBallot {
    const NAME: &'static str = BALLOTS;
}

// Election status collection
const ELECTION_STATUS: &str = "election_status";
impl MongoCollection for ElectionStatus {
    const NAME: &'static str = ELECTION_STATUS;
}

// Election status history collections
const STATUS_HISTORY: &str = "election_status_history";
impl MongoCollection for StatusChange {
    const NAME: &'static str = STATUS_HISTORY;
}
impl MongoCollection for NewStatusChange {
    const NAME: &'static str = STATUS_HISTORY;
}

// Audit log collections
const AUDIT_LOG: &str = "audit_log";
impl MongoCollection for AuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}
impl MongoCollection for NewAuditLogEntry {
    const NAME: &'static str = AUDIT_LOG;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    // Admin accounts have no student ID.
    let unique_sparse = IndexOptions::builder().unique(true).sparse(true).build();

    // User collection.
    let email_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique.clone())
        .build();
    let student_id_index = IndexModel::builder()
        .keys(doc! {"student_id": 1})
        .options(unique_sparse)
        .build();
    Coll::<User>::from_db(db)
        .create_indexes([email_index, student_id_index], None)
        .await?;

    // Candidate collection: one candidacy per student, one candidate per seat.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"student_id": 1})
        .options(unique.clone())
        .build();
    let seat_index = IndexModel::builder()
        .keys(doc! {"position_id": 1, "gender": 1, "seat": 1})
        .options(unique.clone())
        .build();
    Coll::<Candidate>::from_db(db)
        .create_indexes([candidate_index, seat_index], None)
        .await?;

    // Ballot collection: at most one ballot per voter per position.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"voter_id": 1, "position_id": 1})
        .options(unique)
        .build();
    let ballot_candidate_index = IndexModel::builder()
        .keys(doc! {"candidate_id": 1})
        .build();
    Coll::<Ballot>::from_db(db)
        .create_indexes([ballot_index, ballot_candidate_index], None)
        .await?;

    // Election status history.
    let history_index = IndexModel::builder()
        .keys(doc! {"changed_at": -1})
        .build();
    Coll::<StatusChange>::from_db(db)
        .create_index(history_index, None)
        .await?;

    // Audit log collection.
    let audit_index = IndexModel::builder()
        .keys(doc! {"timestamp": -1})
        .build();
    Coll::<AuditLogEntry>::from_db(db)
        .create_index(audit_index, None)
        .await?;

    Ok(())
}
