use rocket::{
    serde::json::{serde_json::json, Json, Value},
    Catcher, Request, Route,
};

mod admin;
pub(crate) mod auth;
mod public;
mod student;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(auth::routes());
    routes.extend(voting::routes());
    routes.extend(student::routes());
    routes.extend(admin::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        too_many_requests,
        internal_error,
    ]
}

fn error_body(message: &str) -> Json<Value> {
    Json(json!({ "error": message }))
}

#[catch(400)]
fn bad_request() -> Json<Value> {
    error_body("Bad request")
}

#[catch(401)]
fn unauthorized() -> Json<Value> {
    error_body("Unauthorized")
}

#[catch(403)]
fn forbidden() -> Json<Value> {
    error_body("Forbidden")
}

#[catch(404)]
fn not_found(req: &Request) -> Json<Value> {
    error_body(&format!("No route for {} {}", req.method(), req.uri()))
}

#[catch(422)]
fn unprocessable() -> Json<Value> {
    error_body("Malformed request body")
}

#[catch(429)]
fn too_many_requests() -> Json<Value> {
    error_body("Too many requests, please try again later")
}

#[catch(500)]
fn internal_error() -> Json<Value> {
    error_body("Internal server error")
}
