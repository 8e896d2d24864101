use std::collections::{HashMap, HashSet};

use chrono::Utc;
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
    Client, ClientSession, Database,
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        audit::AuditLogEntryDescription,
        auth::{Admin, AuthToken},
        candidate::{CandidateDescription, CandidateSpec, CandidateUpdate},
        election::{ElectionStatusDescription, ElectionStatusUpdate, StatusChangeDescription},
        pagination::{Paginated, Pagination},
        results::{AdminResults, AdminStats},
        user::{CreateUserRequest, UserDescription},
    },
    common::{
        audit::{AuditAction, EntityType},
        position::Position,
        user::{Gender, Role},
    },
    db::{
        audit_log::{AuditLogEntry, NewAuditLogEntry},
        ballot::Ballot,
        candidate::{Candidate, NewCandidate},
        election_status::ElectionStatus,
        status_change::{NewStatusChange, StatusChange},
        user::{NewUser, User},
    },
    mongodb::{errors::is_duplicate_key_error, Coll, Id},
};
use crate::throttle::RateLimit;
use crate::voting::tally::{
    ballot_counts, compute_results, load_statistics, load_tallies, position_breakdown,
    student_breakdown,
};

pub fn routes() -> Vec<Route> {
    routes![
        list_candidates,
        get_candidate,
        create_candidate,
        update_candidate,
        delete_candidate,
        get_election_status,
        set_election_status,
        election_status_history,
        results,
        stats,
        list_users,
        create_user,
        delete_user,
        audit_log,
    ]
}

/// Every candidate, newest first, with live ballot counts.
#[get("/admin/candidates")]
async fn list_candidates(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let newest_first = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let all: Vec<Candidate> = candidates
        .find(None, newest_first)
        .await?
        .try_collect()
        .await?;
    let counts = ballot_counts(&ballots, None).await?;
    let list = all
        .into_iter()
        .map(|candidate| {
            let count = counts.get(&candidate.id).copied().unwrap_or(0);
            CandidateDescription::with_count(candidate, count)
        })
        .collect();
    Ok(Json(list))
}

#[get("/admin/candidates/<candidate_id>")]
async fn get_candidate(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    candidate_id: Id,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
) -> Result<Json<CandidateDescription>> {
    let candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    let count = ballots
        .count_documents(doc! { "candidate_id": candidate_id }, None)
        .await?;
    Ok(Json(CandidateDescription::with_count(candidate, count)))
}

/// The lowest seat of `position` still open to `gender`, refusing a candidate
/// who would exceed the quota. `exclude` leaves an existing candidate out.
///
/// Two registrations racing for the same seat are settled by the unique seat index.
async fn free_seat(
    candidates: &Coll<Candidate>,
    position: &Position,
    gender: Gender,
    exclude: Option<Id>,
) -> Result<i32> {
    let mut filter = doc! { "position_id": position.id, "gender": gender };
    if let Some(id) = exclude {
        filter.insert("_id", doc! { "$ne": id });
    }
    let taken: HashSet<i32> = candidates
        .find(filter, None)
        .await?
        .map_ok(|candidate| candidate.seat)
        .try_collect()
        .await?;
    let seats = position.seats_for(gender) as i32;
    (0..seats)
        .find(|seat| !taken.contains(seat))
        .ok_or_else(|| {
            Error::bad_request(format!(
                "{} already has the maximum number of {gender} candidates",
                position.title
            ))
        })
}

fn seat_taken() -> Error {
    Error::Status(
        Status::Conflict,
        "That seat was just taken, please try again".to_string(),
    )
}

#[post("/admin/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    spec: Json<CandidateSpec>,
    candidates: Coll<Candidate>,
    new_candidates: Coll<NewCandidate>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<CandidateDescription>> {
    let position = spec.validate()?;
    let already_registered = Error::bad_request("Candidate already exists");

    // Check student ID uniqueness.
    let with_student_id = doc! { "student_id": spec.student_id.trim() };
    if candidates
        .find_one(with_student_id.clone(), None)
        .await?
        .is_some()
    {
        return Err(already_registered);
    }
    let seat = free_seat(&candidates, position, spec.gender, None).await?;

    // Create and insert the candidate.
    let mut candidate: NewCandidate = spec.0.into();
    candidate.seat = seat;
    let id: Id = match new_candidates.insert_one(&candidate, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| {
                Error::Status(Status::InternalServerError, "Bad inserted ID".to_string())
            })?
            .into(),
        // Lost a race: either for the student ID or for the seat.
        Err(e) if is_duplicate_key_error(&e) => {
            if candidates.find_one(with_student_id, None).await?.is_some() {
                return Err(already_registered);
            }
            return Err(seat_taken());
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = doc! {
        "name": &candidate.name,
        "student_id": &candidate.student_id,
        "position_id": &candidate.position_id,
        "gender": candidate.gender,
        "seat": candidate.seat,
    };
    NewAuditLogEntry::new(
        AuditAction::CandidateCreate,
        EntityType::Candidate,
        id,
        token.id,
        metadata,
    )
    .record(&audit_log)
    .await?;
    info!("Admin {} registered candidate {id}", token.id);

    let candidate = Candidate { id, candidate };
    Ok(Json(CandidateDescription::with_count(candidate, 0)))
}

#[put("/admin/candidates/<candidate_id>", data = "<update>", format = "json")]
async fn update_candidate(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    candidate_id: Id,
    update: Json<CandidateUpdate>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<CandidateDescription>> {
    let mut candidate = candidates
        .find_one(candidate_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    let old_position = candidate.position_id.clone();
    update.0.apply_to(&mut candidate.candidate)?;

    let votes = ballots
        .count_documents(doc! { "candidate_id": candidate_id }, None)
        .await?;
    if candidate.position_id != old_position {
        if votes > 0 {
            return Err(Error::bad_request(
                "Cannot change the position of a candidate who has received votes",
            ));
        }
        let position = Position::lookup(&candidate.position_id);
        candidate.seat =
            free_seat(&candidates, position, candidate.gender, Some(candidate_id)).await?;
    }

    // Only the editable fields, so concurrent count increments are never overwritten.
    let fields = doc! {
        "name": &candidate.name,
        "position_id": &candidate.position_id,
        "seat": candidate.seat,
        "department": &candidate.department,
        "manifesto": &candidate.manifesto,
        "image_url": candidate.image_url.as_deref(),
    };
    match candidates
        .update_one(candidate_id.as_doc(), doc! { "$set": fields.clone() }, None)
        .await
    {
        Ok(_) => {}
        Err(e) if is_duplicate_key_error(&e) => return Err(seat_taken()),
        Err(e) => return Err(e.into()),
    }

    NewAuditLogEntry::new(
        AuditAction::CandidateUpdate,
        EntityType::Candidate,
        candidate_id,
        token.id,
        fields,
    )
    .record(&audit_log)
    .await?;
    info!("Admin {} updated candidate {candidate_id}", token.id);

    Ok(Json(CandidateDescription::with_count(candidate, votes)))
}

/// Delete a candidate together with every ballot cast for them.
#[delete("/admin/candidates/<candidate_id>")]
async fn delete_candidate(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    candidate_id: Id,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let candidates = Coll::<Candidate>::from_db(db);
    let ballots = Coll::<Ballot>::from_db(db);
    let audit_log = Coll::<NewAuditLogEntry>::from_db(db);

    let candidate = candidates
        .find_one_with_session(candidate_id.as_doc(), None, &mut session)
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;
    let removed = ballots
        .delete_many_with_session(doc! { "candidate_id": candidate_id }, None, &mut session)
        .await?
        .deleted_count;
    candidates
        .delete_one_with_session(candidate_id.as_doc(), None, &mut session)
        .await?;

    let metadata = doc! {
        "name": &candidate.name,
        "position_id": &candidate.position_id,
        "deleted_ballots": removed as i64,
    };
    NewAuditLogEntry::new(
        AuditAction::CandidateDelete,
        EntityType::Candidate,
        candidate_id,
        token.id,
        metadata,
    )
    .record_with_session(&audit_log, &mut session)
    .await?;

    session.commit_transaction().await?;
    info!(
        "Admin {} deleted candidate {candidate_id} and {removed} ballots",
        token.id
    );
    Ok(())
}

#[get("/admin/election-status")]
async fn get_election_status(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    statuses: Coll<ElectionStatus>,
) -> Result<Json<ElectionStatusDescription>> {
    let status = ElectionStatus::current(&statuses).await?;
    Ok(Json(status.into()))
}

#[put("/admin/election-status", data = "<update>", format = "json")]
async fn set_election_status(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    update: Json<ElectionStatusUpdate>,
    statuses: Coll<ElectionStatus>,
    history: Coll<NewStatusChange>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<ElectionStatusDescription>> {
    let status = update.0.into_status(Utc::now())?;
    status.save(&statuses).await?;
    NewStatusChange::new(&status, token.id)
        .record(&history)
        .await?;

    let metadata = doc! {
        "is_active": status.is_active,
        "start_time": status.start_time,
        "end_time": status.end_time,
    };
    NewAuditLogEntry::new(
        AuditAction::ElectionStatusUpdate,
        EntityType::ElectionStatus,
        None,
        token.id,
        metadata,
    )
    .record(&audit_log)
    .await?;
    info!(
        "Admin {} set election active={} ({:?} to {:?})",
        token.id, status.is_active, status.start_time, status.end_time
    );

    Ok(Json(status.into()))
}

/// Live results at any time, one page of ranked candidates at a time.
#[get("/admin/results?<position_id>")]
async fn results(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    position_id: Option<&str>,
    pagination: Pagination,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    users: Coll<User>,
) -> Result<Json<AdminResults>> {
    if let Some(id) = position_id {
        if Position::get(id).is_none() {
            return Err(Error::bad_request(format!("Invalid position: {id}")));
        }
    }

    let tallies = load_tallies(&candidates, &ballots, position_id).await?;
    let positions = compute_results(tallies);

    let ranked: Vec<_> = positions
        .iter()
        .flat_map(|result| result.candidates.iter().cloned())
        .collect();
    let total = ranked.len() as u64;
    let page = ranked
        .into_iter()
        .skip(pagination.skip() as usize)
        .take(pagination.limit() as usize)
        .collect();

    Ok(Json(AdminResults {
        candidates: pagination.to_paginated(total, page),
        winners: positions.into_iter().map(Into::into).collect(),
        statistics: load_statistics(&users, &ballots).await?,
        by_department: student_breakdown(&users, "department").await?,
        by_gender: student_breakdown(&users, "gender").await?,
    }))
}

#[get("/admin/stats")]
async fn stats(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    users: Coll<User>,
    statuses: Coll<ElectionStatus>,
) -> Result<Json<AdminStats>> {
    Ok(Json(AdminStats {
        statistics: load_statistics(&users, &ballots).await?,
        total_candidates: candidates.count_documents(None, None).await?,
        by_department: student_breakdown(&users, "department").await?,
        by_gender: student_breakdown(&users, "gender").await?,
        by_position: position_breakdown(&ballots).await?,
        status: ElectionStatus::current(&statuses).await?.into(),
    }))
}

/// Escape a user-supplied string for use inside a MongoDB regex.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$-/".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Filter for the user list: optional role plus a case-insensitive search.
fn user_filter(role: Option<Role>, search: Option<&str>) -> Document {
    let mut filter = Document::new();
    if let Some(role) = role {
        filter.insert("role", role);
    }
    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = doc! { "$regex": escape_regex(search), "$options": "i" };
        let fields = ["name", "email", "student_id", "department"];
        let any_field: Vec<Document> = fields
            .iter()
            .map(|&field| doc! { field: pattern.clone() })
            .collect();
        filter.insert("$or", any_field);
    }
    filter
}

#[get("/admin/users?<role>&<search>")]
async fn list_users(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    role: Option<Role>,
    search: Option<&str>,
    pagination: Pagination,
    users: Coll<User>,
) -> Result<Json<Paginated<UserDescription>>> {
    let filter = user_filter(role, search);
    let total = users.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit() as i64)
        .build();
    let page: Vec<UserDescription> = users
        .find(filter, options)
        .await?
        .map_ok(UserDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.to_paginated(total, page)))
}

#[post("/admin/users", data = "<request>", format = "json")]
async fn create_user(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    request: Json<CreateUserRequest>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    audit_log: Coll<NewAuditLogEntry>,
) -> Result<Json<UserDescription>> {
    let user = request.0.into_user()?;
    let taken = Error::bad_request("A user with this email or student ID already exists");

    // Check email and student ID uniqueness.
    let mut same_identity = vec![doc! { "email": &user.email }];
    if let Some(ref student_id) = user.student_id {
        same_identity.push(doc! { "student_id": student_id });
    }
    if users
        .find_one(doc! { "$or": same_identity }, None)
        .await?
        .is_some()
    {
        return Err(taken);
    }

    let id: Id = match new_users.insert_one(&user, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| {
                Error::Status(Status::InternalServerError, "Bad inserted ID".to_string())
            })?
            .into(),
        Err(e) if is_duplicate_key_error(&e) => return Err(taken),
        Err(e) => return Err(e.into()),
    };

    let metadata = doc! { "email": &user.email, "role": user.role };
    NewAuditLogEntry::new(AuditAction::UserCreate, EntityType::User, id, token.id, metadata)
        .record(&audit_log)
        .await?;
    info!("Admin {} created {} account {id}", token.id, user.role);

    Ok(Json(User { id, user }.into()))
}

/// Delete a student, their ballots, and the counts those ballots contributed.
#[delete("/admin/users/<user_id>")]
async fn delete_user(
    _limit: RateLimit,
    token: AuthToken<Admin>,
    user_id: Id,
    db_client: &State<Client>,
    db: &State<Database>,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let removed = remove_student(db, &mut session, user_id, token.id).await?;

    session.commit_transaction().await?;
    info!(
        "Admin {} deleted student {user_id} and {removed} ballots",
        token.id
    );
    Ok(())
}

/// The transactional part of deleting a student. Returns the number of ballots removed.
async fn remove_student(
    db: &Database,
    session: &mut ClientSession,
    user_id: Id,
    actor_id: Id,
) -> Result<u64> {
    let users = Coll::<User>::from_db(db);
    let candidates = Coll::<Candidate>::from_db(db);
    let ballots = Coll::<Ballot>::from_db(db);
    let audit_log = Coll::<NewAuditLogEntry>::from_db(db);

    let user = users
        .find_one_with_session(user_id.as_doc(), None, session)
        .await?
        .ok_or_else(|| Error::not_found(format!("User {user_id}")))?;
    if user.role != Role::Student {
        return Err(Error::bad_request("Only student accounts can be deleted"));
    }

    // Work out how many ballots each candidate is about to lose.
    let mut lost: HashMap<Id, i64> = HashMap::new();
    let mut cast = ballots
        .find_with_session(doc! { "voter_id": user_id }, None, session)
        .await?;
    while let Some(ballot) = cast.next(session).await {
        *lost.entry(ballot?.candidate_id).or_default() += 1;
    }
    for (candidate_id, count) in &lost {
        let decrement = doc! { "$inc": { "vote_count": -count } };
        candidates
            .update_one_with_session(candidate_id.as_doc(), decrement, None, session)
            .await?;
    }

    let removed = ballots
        .delete_many_with_session(doc! { "voter_id": user_id }, None, session)
        .await?
        .deleted_count;
    users
        .delete_one_with_session(user_id.as_doc(), None, session)
        .await?;

    let metadata = doc! {
        "email": &user.email,
        "deleted_ballots": removed as i64,
    };
    NewAuditLogEntry::new(
        AuditAction::UserDelete,
        EntityType::User,
        user_id,
        actor_id,
        metadata,
    )
    .record_with_session(&audit_log, session)
    .await?;

    Ok(removed)
}

/// Every election status ever saved, newest first.
#[get("/admin/election-status/history")]
async fn election_status_history(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    pagination: Pagination,
    history: Coll<StatusChange>,
) -> Result<Json<Paginated<StatusChangeDescription>>> {
    let total = history.count_documents(None, None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "changed_at": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit() as i64)
        .build();
    let page: Vec<StatusChangeDescription> = history
        .find(None, options)
        .await?
        .map_ok(StatusChangeDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.to_paginated(total, page)))
}

/// The audit log, newest first.
#[get("/admin/audit-log?<action>")]
async fn audit_log(
    _limit: RateLimit,
    _token: AuthToken<Admin>,
    action: Option<AuditAction>,
    pagination: Pagination,
    entries: Coll<AuditLogEntry>,
) -> Result<Json<Paginated<AuditLogEntryDescription>>> {
    let filter = action.map(|action| doc! { "action": action });
    let total = entries.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "timestamp": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit() as i64)
        .build();
    let page: Vec<AuditLogEntryDescription> = entries
        .find(filter, options)
        .await?
        .map_ok(AuditLogEntryDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.to_paginated(total, page)))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use crate::model::{
        api::candidate::CandidateSpec,
        db::{ballot::BallotCore, user::EXAMPLE_PASSWORD},
    };

    use super::*;

    async fn insert_candidate(db: &Database, candidate: NewCandidate) -> Candidate {
        let candidate = Candidate {
            id: Id::new(),
            candidate,
        };
        Coll::<Candidate>::from_db(db)
            .insert_one(&candidate, None)
            .await
            .unwrap();
        candidate
    }

    async fn insert_user(db: &Database, user: NewUser) -> User {
        let user = User { id: Id::new(), user };
        Coll::<User>::from_db(db).insert_one(&user, None).await.unwrap();
        user
    }

    /// Cast a ballot directly, keeping the cached count in step.
    async fn insert_ballot(db: &Database, voter: &User, candidate: &Candidate) {
        let ballot = Ballot {
            id: Id::new(),
            ballot: BallotCore::new(voter.id, candidate, Utc::now()),
        };
        Coll::<Ballot>::from_db(db)
            .insert_one(&ballot, None)
            .await
            .unwrap();
        Coll::<Candidate>::from_db(db)
            .update_one(
                candidate.id.as_doc(),
                doc! { "$inc": { "vote_count": 1 } },
                None,
            )
            .await
            .unwrap();
    }

    #[test]
    fn search_is_escaped_and_case_insensitive() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");

        let filter = user_filter(Some(Role::Student), Some("  Karma "));
        assert_eq!(filter.get_str("role").unwrap(), "STUDENT");
        let any_field = filter.get_array("$or").unwrap();
        assert_eq!(any_field.len(), 4);
        let name = any_field[0].as_document().unwrap().get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), "Karma");
        assert_eq!(name.get_str("$options").unwrap(), "i");

        assert!(user_filter(None, Some("   ")).is_empty());
    }

    #[backend_test(admin)]
    async fn register_candidate(client: Client, candidates: Coll<Candidate>) {
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let created: CandidateDescription = response.into_json().await.unwrap();
        assert_eq!(created.position_title, "Chief Councillor");
        assert_eq!(created.vote_count, Some(0));

        let stored = candidates
            .find_one(created.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Tashi Dorji");

        // The same student cannot stand twice.
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn gender_quota_is_enforced(client: Client) {
        let first = CandidateSpec::example();
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(first).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // A second male candidate for a one-seat position.
        let second_male = CandidateSpec {
            name: "Kinley Penjor".to_string(),
            student_id: "02190199".to_string(),
            ..CandidateSpec::example()
        };
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(second_male).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // The female seat is still open.
        let female = CandidateSpec {
            gender: Gender::Female,
            ..second_male
        };
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(female).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(admin)]
    async fn concurrent_registrations_respect_the_quota(
        client: Client,
        candidates: Coll<Candidate>,
    ) {
        let first = CandidateSpec::example();
        let second = CandidateSpec {
            name: "Kinley Penjor".to_string(),
            student_id: "02190199".to_string(),
            ..CandidateSpec::example()
        };
        let (a, b) = rocket::tokio::join!(
            client
                .post(uri!(create_candidate))
                .header(ContentType::JSON)
                .body(json!(first).to_string())
                .dispatch(),
            client
                .post(uri!(create_candidate))
                .header(ContentType::JSON)
                .body(json!(second).to_string())
                .dispatch(),
        );
        let statuses = [a.status(), b.status()];
        assert_eq!(statuses.iter().filter(|&&s| s == Status::Ok).count(), 1);
        assert!(statuses
            .iter()
            .all(|s| [Status::Ok, Status::BadRequest, Status::Conflict].contains(s)));

        let standing = candidates
            .count_documents(
                doc! { "position_id": "chief_councillor", "gender": Gender::Male },
                None,
            )
            .await
            .unwrap();
        assert_eq!(standing, 1);
    }

    #[backend_test]
    async fn seats_are_unique_per_position_and_gender(new_candidates: Coll<NewCandidate>) {
        new_candidates
            .insert_one(NewCandidate::example(), None)
            .await
            .unwrap();
        let same_seat = NewCandidate {
            name: "Kinley Penjor".to_string(),
            student_id: "02190199".to_string(),
            ..NewCandidate::example()
        };
        let err = new_candidates
            .insert_one(&same_seat, None)
            .await
            .unwrap_err();
        assert!(is_duplicate_key_error(&err));

        // The same seat number in another position is a different seat.
        let other_position = NewCandidate {
            position_id: "block_councillor".to_string(),
            ..same_seat
        };
        new_candidates
            .insert_one(&other_position, None)
            .await
            .unwrap();
    }

    #[backend_test(admin)]
    async fn deleted_candidates_free_their_seat(client: Client, candidates: Coll<Candidate>) {
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let created: CandidateDescription = response.into_json().await.unwrap();
        let created_id: Id = *created.id;

        let response = client
            .delete(uri!(delete_candidate(created_id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let replacement = CandidateSpec {
            name: "Kinley Penjor".to_string(),
            student_id: "02190199".to_string(),
            ..CandidateSpec::example()
        };
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(replacement).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let stored = candidates
            .find_one(doc! { "student_id": "02190199" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.seat, 0);
    }

    #[backend_test(admin)]
    async fn invalid_registration(client: Client) {
        let response = client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(
                json!(CandidateSpec {
                    position_id: "treasurer".to_string(),
                    ..CandidateSpec::example()
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "Invalid position: treasurer");
    }

    #[backend_test(admin)]
    async fn update_candidate_fields_and_position(client: Client, db: Database) {
        let candidate = insert_candidate(&db, NewCandidate::example()).await;

        let response = client
            .put(uri!(update_candidate(candidate.id)))
            .header(ContentType::JSON)
            .body(json!({ "position_id": "block_councillor", "manifesto": "New plan" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let updated: CandidateDescription = response.into_json().await.unwrap();
        assert_eq!(updated.position_id, "block_councillor");
        assert_eq!(updated.manifesto, "New plan");
        assert_eq!(updated.name, "Tashi Dorji");

        // Once votes exist the position is fixed.
        let voter = insert_user(&db, NewUser::example_student2()).await;
        let moved = Coll::<Candidate>::from_db(&db)
            .find_one(candidate.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        insert_ballot(&db, &voter, &moved).await;
        let response = client
            .put(uri!(update_candidate(candidate.id)))
            .header(ContentType::JSON)
            .body(json!({ "position_id": "chief_councillor" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let audits = Coll::<AuditLogEntry>::from_db(&db)
            .count_documents(doc! { "action": AuditAction::CandidateUpdate }, None)
            .await
            .unwrap();
        assert_eq!(audits, 1);
    }

    #[backend_test(admin)]
    async fn delete_candidate_cascades(client: Client, db: Database) {
        let candidate = insert_candidate(&db, NewCandidate::example()).await;
        let other = insert_candidate(&db, NewCandidate::example_other_position()).await;
        let voter = insert_user(&db, NewUser::example_student2()).await;
        insert_ballot(&db, &voter, &candidate).await;
        insert_ballot(&db, &voter, &other).await;

        let response = client
            .delete(uri!(delete_candidate(candidate.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let ballots = Coll::<Ballot>::from_db(&db);
        assert_eq!(ballots.count_documents(None, None).await.unwrap(), 1);
        assert_eq!(
            Coll::<Candidate>::from_db(&db)
                .count_documents(None, None)
                .await
                .unwrap(),
            1
        );

        let response = client
            .delete(uri!(delete_candidate(candidate.id)))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn election_status_round_trip(client: Client, db: Database) {
        let response = client.get(uri!(get_election_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let status: ElectionStatusDescription = response.into_json().await.unwrap();
        assert!(!status.is_active);

        let now = Utc::now();
        let response = client
            .put(uri!(set_election_status))
            .header(ContentType::JSON)
            .body(
                json!({
                    "is_active": true,
                    "start_time": now - Duration::hours(1),
                    "end_time": now + Duration::hours(1),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let stored = ElectionStatus::current(&Coll::from_db(&db)).await.unwrap();
        assert!(stored.is_active);
        assert!(stored.start_time.unwrap() < now);
        assert!(stored.end_time.unwrap() > now);

        // Backwards windows are refused.
        let response = client
            .put(uri!(set_election_status))
            .header(ContentType::JSON)
            .body(
                json!({
                    "is_active": true,
                    "start_time": now + Duration::hours(1),
                    "end_time": now - Duration::hours(1),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn admin_results_are_paginated(client: Client, db: Database) {
        let chief_male = insert_candidate(&db, NewCandidate::example()).await;
        let chief_female = insert_candidate(&db, NewCandidate::example2()).await;
        let cultural = insert_candidate(&db, NewCandidate::example_other_position()).await;
        let voter = insert_user(&db, NewUser::example_student2()).await;
        insert_ballot(&db, &voter, &chief_female).await;
        insert_ballot(&db, &voter, &cultural).await;

        let response = client
            .get("/admin/results?page=1&limit=2")
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        let items = body["candidates"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        // Chief councillor first, highest count first.
        assert_eq!(items[0]["id"], chief_female.id.to_string());
        assert_eq!(items[1]["id"], chief_male.id.to_string());
        assert_eq!(body["candidates"]["pagination"]["total"], 3);
        assert_eq!(body["candidates"]["pagination"]["total_pages"], 2);
        assert_eq!(body["winners"].as_array().unwrap().len(), 2);

        let response = client
            .get("/admin/results?position_id=cultural_councillor")
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["candidates"]["items"][0]["id"], cultural.id.to_string());
        assert_eq!(body["candidates"]["pagination"]["total"], 1);

        let response = client.get("/admin/results?limit=500").dispatch().await;
        assert_eq!(Status::BadRequest, response.status());
        let response = client
            .get(format!("/admin/results?page={}&limit=100", u64::MAX))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let response = client
            .get(format!("/admin/users?page={}", u64::MAX))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let response = client
            .get("/admin/results?position_id=treasurer")
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn stats_summarise_participation(client: Client, db: Database) {
        let candidate = insert_candidate(&db, NewCandidate::example()).await;
        let voter = insert_user(&db, NewUser::example_student2()).await;
        insert_user(&db, NewUser::example_student()).await;
        insert_ballot(&db, &voter, &candidate).await;

        let response = client.get(uri!(stats)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["statistics"]["total_voters"], 2);
        assert_eq!(body["statistics"]["voted_count"], 1);
        assert_eq!(body["statistics"]["voter_turnout"], 50.0);
        assert_eq!(body["total_candidates"], 1);
        assert_eq!(body["by_position"][0]["key"], "chief_councillor");
        assert_eq!(body["by_position"][0]["count"], 1);
    }

    #[backend_test(admin)]
    async fn users_are_searchable(client: Client, db: Database) {
        insert_user(&db, NewUser::example_student()).await;
        insert_user(&db, NewUser::example_student2()).await;

        let response = client.get("/admin/users?role=STUDENT").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let page: Paginated<UserDescription> = response.into_json().await.unwrap();
        assert_eq!(page.pagination.total, 2);

        let response = client.get("/admin/users?search=pema").dispatch().await;
        let page: Paginated<UserDescription> = response.into_json().await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Pema Choden");

        let response = client.get("/admin/users?page=2&limit=3").dispatch().await;
        let page: Paginated<UserDescription> = response.into_json().await.unwrap();
        // Two students, the signed-in admin and the default admin.
        assert_eq!(page.pagination.total, 4);
        assert_eq!(page.items.len(), 1);
    }

    #[backend_test(admin)]
    async fn create_user_account(client: Client, users: Coll<User>) {
        let response = client
            .post(uri!(create_user))
            .header(ContentType::JSON)
            .body(json!(CreateUserRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let stored = users
            .find_one(doc! { "student_id": "02210003" }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.verify_password(EXAMPLE_PASSWORD));

        let response = client
            .post(uri!(create_user))
            .header(ContentType::JSON)
            .body(json!(CreateUserRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn delete_student_cascades(client: Client, db: Database) {
        let candidate = insert_candidate(&db, NewCandidate::example()).await;
        let leaving = insert_user(&db, NewUser::example_student()).await;
        let staying = insert_user(&db, NewUser::example_student2()).await;
        insert_ballot(&db, &leaving, &candidate).await;
        insert_ballot(&db, &staying, &candidate).await;

        let response = client
            .delete(uri!(delete_user(leaving.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let stored = Coll::<Candidate>::from_db(&db)
            .find_one(candidate.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.vote_count, 1);
        assert_eq!(
            Coll::<Ballot>::from_db(&db)
                .count_documents(None, None)
                .await
                .unwrap(),
            1
        );

        let audit = Coll::<AuditLogEntry>::from_db(&db)
            .find_one(doc! { "action": AuditAction::UserDelete }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(audit.entity_id, Some(leaving.id));
        assert_eq!(audit.metadata.get_i64("deleted_ballots").unwrap(), 1);
    }

    #[backend_test(admin)]
    async fn admins_cannot_be_deleted(client: Client, db: Database) {
        let other_admin = insert_user(
            &db,
            NewUser {
                email: "registrar@rub.edu.bt".to_string(),
                ..NewUser::example_admin()
            },
        )
        .await;

        let response = client
            .delete(uri!(delete_user(other_admin.id)))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client.delete(uri!(delete_user(Id::new()))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn election_status_history_is_kept(client: Client, users: Coll<User>) {
        let now = Utc::now();
        let updates = [
            json!({ "is_active": false }),
            json!({
                "is_active": true,
                "start_time": now,
                "end_time": now + Duration::hours(8),
            }),
            json!({ "is_active": false, "start_time": now }),
        ];
        for update in updates {
            let response = client
                .put(uri!(set_election_status))
                .header(ContentType::JSON)
                .body(update.to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
        }
        // Refused updates leave no trace.
        client
            .put(uri!(set_election_status))
            .header(ContentType::JSON)
            .body(json!({ "is_active": true, "start_time": now, "end_time": now }).to_string())
            .dispatch()
            .await;

        let admin = users
            .find_one(doc! { "email": NewUser::example_admin().email }, None)
            .await
            .unwrap()
            .unwrap();
        let response = client
            .get(uri!(election_status_history))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["pagination"]["total"], 3);
        let items = body["items"].as_array().unwrap();
        // Newest first.
        assert_eq!(items[0]["is_active"], false);
        assert!(items[0]["end_time"].is_null());
        assert_eq!(items[1]["is_active"], true);
        assert!(!items[1]["end_time"].is_null());
        assert_eq!(items[2]["is_active"], false);
        assert!(items[2]["start_time"].is_null());
        assert_eq!(items[0]["changed_by"], admin.id.to_string());

        let response = client
            .get("/admin/election-status/history?page=2&limit=2")
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["pagination"]["total_pages"], 2);
    }

    #[backend_test(admin)]
    async fn audit_log_filters_by_action(client: Client) {
        client
            .post(uri!(create_candidate))
            .header(ContentType::JSON)
            .body(json!(CandidateSpec::example()).to_string())
            .dispatch()
            .await;
        client
            .put(uri!(set_election_status))
            .header(ContentType::JSON)
            .body(json!({ "is_active": false }).to_string())
            .dispatch()
            .await;

        let response = client.get("/admin/audit-log").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["pagination"]["total"], 2);
        // Newest first.
        assert_eq!(body["items"][0]["action"], "ELECTION_STATUS_UPDATE");

        let response = client
            .get("/admin/audit-log?action=CANDIDATE_CREATE")
            .dispatch()
            .await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["pagination"]["total"], 1);
        assert_eq!(body["items"][0]["entity_type"], "CANDIDATE");
    }

    #[backend_test(student)]
    async fn students_are_not_admins(client: Client) {
        let response = client.get(uri!(stats)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
        let response = client.get(uri!(list_candidates)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
