use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use mongodb::{bson::doc, Database};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::user::User,
    mongodb::{Coll, Id},
};

use super::user::{AuthRole, Rights};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<R> {
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<R>,
}

impl<R> AuthToken<R> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<R> AuthToken<R>
where
    R: AuthRole,
{
    /// Create a new [`AuthToken`] for the given user. The caller has checked the user's role.
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            rights: R::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(time::Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<R>>| claims.claims.token)?;
        Ok(token)
    }

    /// Fetch the user this token was issued to.
    pub async fn user(&self, users: &Coll<User>) -> Result<User> {
        users
            .find_one(doc! { "_id": self.id, "role": R::ROLE }, None)
            .await?
            .ok_or_else(Error::unauthorized)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<R> {
    #[serde(flatten, bound = "")]
    token: AuthToken<R>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, R> FromRequest<'r> for AuthToken<R>
where
    R: AuthRole + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie, and check that it has the correct rights and that
    /// its user still exists with the matching role. Every rejection looks the same.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (config, db) = match (
            req.guard::<&State<Config>>().await,
            req.guard::<&State<Database>>().await,
        ) {
            (Outcome::Success(config), Outcome::Success(db)) => (config, db),
            _ => {
                return Outcome::Failure((
                    Status::InternalServerError,
                    Error::Status(Status::InternalServerError, "Missing state".to_string()),
                ))
            }
        };

        let unauthorized = || Outcome::Failure((Status::Unauthorized, Error::unauthorized()));

        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return unauthorized();
        };
        let Ok(token) = Self::from_cookie(cookie, config) else {
            return unauthorized();
        };
        if !token.permits(R::RIGHTS) {
            return unauthorized();
        }

        // Check the user actually exists and still holds the role.
        let filter = doc! { "_id": token.id, "role": R::ROLE };
        match Coll::<User>::from_db(db).count_documents(filter, None).await {
            Ok(1) => Outcome::Success(token),
            Ok(_) => unauthorized(),
            Err(e) => Outcome::Failure((Status::InternalServerError, e.into())),
        }
    }
}
