use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::sms::Sms,
    common::user::{Gender, Role},
    mongodb::{Coll, Id},
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Core user data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub email: String,
    /// Institution student number; admins have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub name: String,
    /// Argon2 encoded hash; absent for accounts created through Google sign-in.
    #[serde(default)]
    pub password_hash: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub year_of_study: Option<u8>,
    /// Number used for two-factor codes and vote confirmations.
    #[serde(default)]
    pub phone: Option<Sms>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// Check whether the given password is correct.
    /// Accounts without a password never match.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        self.password_hash
            .as_deref()
            .map(|hash| argon2::verify_encoded(hash, password.as_ref()).unwrap_or(false))
            .unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Hash a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    let hash = argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default())?;
    Ok(hash)
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}

/// Ensure at least one admin exists, creating one from the given credentials if not.
pub async fn ensure_admin_exists(users: &Coll<NewUser>, email: &str, password: &str) -> Result<()> {
    let admins = doc! { "role": Role::Admin };
    if users.count_documents(admins, None).await? == 0 {
        warn!("No admin account found, creating default admin {email}");
        let admin = NewUser {
            email: email.to_string(),
            student_id: None,
            name: "Administrator".to_string(),
            password_hash: Some(hash_password(password)?),
            role: Role::Admin,
            department: None,
            gender: None,
            year_of_study: None,
            phone: None,
            email_verified: true,
            created_at: Utc::now(),
        };
        users.insert_one(admin, None).await?;
    }
    Ok(())
}


#[cfg(test)]
pub use examples::EXAMPLE_PASSWORD;
