use chrono::{serde::ts_seconds, DateTime, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::Config;
use crate::error::Result;
use crate::model::{db::user::User, mongodb::Id};

pub type HmacSha256 = Hmac<Sha256>;

/// A signed password reset grant for one user.
///
/// The token is bound to the user's password hash at issue time, so it stops
/// working as soon as the password changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetToken {
    #[serde(rename = "uid")]
    pub user_id: Id,
    #[serde(rename = "fp")]
    fingerprint: String,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl ResetToken {
    /// Issue a token for the given user.
    pub fn issue(user: &User, config: &Config) -> Result<String> {
        let claims = Self {
            user_id: user.id,
            fingerprint: fingerprint(user, config),
            expire_at: Utc::now() + config.reset_ttl(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Decode a token, checking its signature and expiry.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let claims = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Self>| data.claims)?;
        Ok(claims)
    }

    /// Was this token issued against the user's current password?
    pub fn matches(&self, user: &User, config: &Config) -> bool {
        self.user_id == user.id
            && !self.fingerprint.is_empty()
            && self.fingerprint == fingerprint(user, config)
    }
}

/// Hex HMAC of the user's current password hash.
fn fingerprint(user: &User, config: &Config) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(config.hmac_secret()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(user.id.to_hex().as_bytes());
    mac.update(user.password_hash.as_deref().unwrap_or_default().as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
