use chrono::Utc;
use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        candidate::CandidateDescription,
        election::PublicElectionStatus,
        results::PublicResults,
    },
    common::position::Position,
    db::{ballot::Ballot, candidate::Candidate, election_status::ElectionStatus, user::User},
    mongodb::Coll,
};
use crate::throttle::RateLimit;
use crate::voting::tally::{
    compute_results, load_statistics, load_tallies, results_unavailable_reason,
};

pub fn routes() -> Vec<Route> {
    routes![positions, candidates, election_status, results]
}

#[get("/positions")]
async fn positions(_limit: RateLimit) -> Json<&'static [Position]> {
    Json(Position::all())
}

/// Every candidate, newest first.
#[get("/candidates")]
async fn candidates(
    _limit: RateLimit,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let newest_first = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let list: Vec<CandidateDescription> = candidates
        .find(None, newest_first)
        .await?
        .map_ok(CandidateDescription::public)
        .try_collect()
        .await?;
    Ok(Json(list))
}

#[get("/election/status")]
async fn election_status(
    _limit: RateLimit,
    statuses: Coll<ElectionStatus>,
    users: Coll<User>,
    ballots: Coll<Ballot>,
) -> Result<Json<PublicElectionStatus>> {
    let status = ElectionStatus::current(&statuses).await?;
    let statistics = load_statistics(&users, &ballots).await?;
    Ok(Json(PublicElectionStatus {
        status: status.into(),
        total_voters: statistics.total_voters,
        voted_count: statistics.voted_count,
    }))
}

/// Final results, available once the election has closed.
#[get("/results")]
async fn results(
    _limit: RateLimit,
    statuses: Coll<ElectionStatus>,
    candidates: Coll<Candidate>,
    ballots: Coll<Ballot>,
    users: Coll<User>,
) -> Result<Json<PublicResults>> {
    let status = ElectionStatus::stored(&statuses).await?;
    if let Some(reason) = results_unavailable_reason(status.as_ref(), Utc::now()) {
        return Err(Error::Status(Status::Forbidden, reason.to_string()));
    }

    let tallies = load_tallies(&candidates, &ballots, None).await?;
    let statistics = load_statistics(&users, &ballots).await?;
    Ok(Json(PublicResults {
        positions: compute_results(tallies),
        statistics,
    }))
}
