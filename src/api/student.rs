use mongodb::bson::{doc, to_document};
use rocket::{http::Status, serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{AuthToken, Student},
        user::{ProfileUpdate, UserDescription},
    },
    db::user::{NewUser, User},
    mongodb::Coll,
};
use crate::throttle::RateLimit;

pub fn routes() -> Vec<Route> {
    routes![profile, update_profile]
}

#[get("/student/profile")]
async fn profile(
    _limit: RateLimit,
    token: AuthToken<Student>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    let student = token.user(&users).await?;
    Ok(Json(student.into()))
}

/// Fill in or correct the student's own details.
#[put("/student/profile", data = "<update>", format = "json")]
async fn update_profile(
    _limit: RateLimit,
    token: AuthToken<Student>,
    update: Json<ProfileUpdate>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<Json<UserDescription>> {
    let mut student = token.user(&users).await?;
    update.0.apply_to(&mut student.user)?;

    let fields = to_document(&student.user).map_err(|e| {
        Error::Status(Status::InternalServerError, format!("Bad profile: {e}"))
    })?;
    new_users
        .update_one(student.id.as_doc(), doc! { "$set": fields }, None)
        .await?;
    info!("Student {} updated their profile", student.id);

    Ok(Json(student.into()))
}
