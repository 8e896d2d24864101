use serde::{Deserialize, Deserializer};

use crate::config::Config;
use crate::error::{Error, Result};

const TOKEN_INFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// The identity asserted by a Google ID token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
pub struct GoogleIdentity {
    /// The OAuth client the token was issued for.
    pub aud: String,
    pub email: String,
    #[serde(deserialize_with = "bool_or_string")]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

impl GoogleIdentity {
    /// Resolve an ID token to the identity it asserts.
    #[cfg(not(test))]
    pub async fn fetch(id_token: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let response = client.execute(token_info_request(&client, id_token)?).await?;
        if !response.status().is_success() {
            return Err(Error::unauthorized());
        }
        Ok(response.json::<GoogleIdentity>().await?)
    }

    /// In test mode the "token" is the identity itself, as JSON.
    #[cfg(test)]
    pub async fn fetch(id_token: &str) -> Result<Self> {
        rocket::serde::json::serde_json::from_str(id_token).map_err(|_| Error::unauthorized())
    }

    /// Check the token was meant for us and belongs to the institution.
    pub fn check(&self, config: &Config) -> Result<()> {
        if self.aud != config.google_client_id() || !self.email_verified {
            return Err(Error::unauthorized());
        }
        if !email_in_domain(&self.email, config.allowed_email_domain()) {
            return Err(Error::Status(
                rocket::http::Status::Unauthorized,
                format!(
                    "Only @{} email addresses may sign in",
                    config.allowed_email_domain()
                ),
            ));
        }
        Ok(())
    }
}

/// The token info lookup, with the token form-encoded into the query.
fn token_info_request(
    client: &reqwest::Client,
    id_token: &str,
) -> reqwest::Result<reqwest::Request> {
    client
        .get(TOKEN_INFO_URL)
        .query(&[("id_token", id_token)])
        .build()
}

/// Does the email belong to exactly the given domain?
pub fn email_in_domain(email: &str, domain: &str) -> bool {
    email
        .rsplit_once('@')
        .map_or(false, |(local, host)| {
            !local.is_empty() && host.eq_ignore_ascii_case(domain)
        })
}

/// Google reports `email_verified` as either a JSON bool or the string `"true"`.
fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Str(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Str(s) => s.eq_ignore_ascii_case("true"),
    })
}
