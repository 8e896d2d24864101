use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status::Custom, Responder},
    serde::json::{serde_json::json, Json},
    Request,
};
use thiserror::Error;

use crate::logging::RequestId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: String) -> Self {
        Self::Status(Status::NotFound, format!("{what} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    /// Authentication failures all look the same from outside.
    pub fn unauthorized() -> Self {
        Self::Status(Status::Unauthorized, "Unauthorized".to_string())
    }

    /// The status this error will be reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Status(status, _) => *status,
            Self::Jwt(_) => Status::Unauthorized,
            Self::Db(_) | Self::Argon2(_) | Self::Http(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let id = req.local_cache(RequestId::next);
        let status = self.status();
        let message = match self {
            Self::Status(_, message) => message,
            Self::Jwt(err) => match err.into_kind() {
                JwtErrorKind::ExpiredSignature => "Token has expired".to_string(),
                _ => "Invalid token".to_string(),
            },
            other => {
                // Internal details stay in the log.
                error!("req{id} failed: {other}");
                "Internal server error".to_string()
            }
        };
        Custom(status, Json(json!({ "error": message }))).respond_to(req)
    }
}
