use std::sync::Arc;

use chrono::Utc;
use mongodb::{bson::doc, Client, Database};
use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        auth::{AuthToken, Student},
        vote::{BallotDescription, VoteRequest, VotedPositions},
    },
    db::{ballot::Ballot, user::User},
    mongodb::Coll,
};
use crate::notifier::Notifier;
use crate::throttle::RateLimit;
use crate::voting::cast_vote;

pub fn routes() -> Vec<Route> {
    routes![vote, voted_positions]
}

#[post("/votes", data = "<request>", format = "json")]
async fn vote(
    _limit: RateLimit,
    token: AuthToken<Student>,
    request: Json<VoteRequest>,
    users: Coll<User>,
    db_client: &State<Client>,
    db: &State<Database>,
    notifier: &State<Arc<dyn Notifier>>,
) -> Result<Json<BallotDescription>> {
    let voter = token.user(&users).await?;
    let ballot = cast_vote(
        db_client,
        db,
        notifier.inner().as_ref(),
        &voter,
        *request.candidate_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(ballot.into()))
}

#[get("/student/votes")]
async fn voted_positions(
    _limit: RateLimit,
    token: AuthToken<Student>,
    ballots: Coll<Ballot>,
) -> Result<Json<VotedPositions>> {
    let positions = ballots
        .distinct("position_id", doc! { "voter_id": token.id }, None)
        .await?
        .into_iter()
        .filter_map(|position| position.as_str().map(str::to_string))
        .collect();
    Ok(Json(VotedPositions { positions }))
}
