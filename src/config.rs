use std::sync::Arc;
use std::time::Duration as StdDuration;

use aws_credential_types::Credentials;
use aws_sdk_sns::{Client as SnsClient, Region};
use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    db::user::ensure_admin_exists,
    mongodb::{ensure_indexes_exist, Coll},
};
use crate::notifier::{LogNotifier, Notifier, SnsNotifier};
use crate::throttle::RequestThrottle;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    otp_ttl: u32,
    auth_ttl: u32,
    reset_ttl: u32,
    google_client_id: String,
    allowed_email_domain: String,
    throttle_window_secs: u64,
    throttle_max_requests: usize,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// Valid lifetime of OTP in seconds.
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl.into())
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Valid lifetime of password reset tokens in seconds.
    pub fn reset_ttl(&self) -> Duration {
        Duration::seconds(self.reset_ttl.into())
    }

    /// OAuth client ID that Google ID tokens must be issued for.
    pub fn google_client_id(&self) -> &str {
        &self.google_client_id
    }

    /// Only emails in this domain may sign in with Google.
    pub fn allowed_email_domain(&self) -> &str {
        &self.allowed_email_domain
    }

    /// Length of the request throttle's sliding window.
    pub fn throttle_window(&self) -> StdDuration {
        StdDuration::from_secs(self.throttle_window_secs)
    }

    /// Requests allowed per client within one throttle window.
    pub fn throttle_max_requests(&self) -> usize {
        self.throttle_max_requests
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state,
/// together with the request throttle it configures.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if config.throttle_max_requests == 0 || config.throttle_window_secs == 0 {
            error!("Throttle window and request limit must both be positive");
            return Err(rocket);
        }

        // One throttle shared by every route.
        let throttle =
            RequestThrottle::new(config.throttle_window(), config.throttle_max_requests());
        info!(
            "Throttling clients to {} requests per {}s",
            config.throttle_max_requests, config.throttle_window_secs
        );

        // Manage the state.
        rocket = rocket.manage(config).manage(throttle);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    default_admin_email: String,
    // secrets
    db_uri: String,
    default_admin_password: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }

        // Ensure there is at least one admin user.
        let users = Coll::from_db(&db);
        if let Err(e) = ensure_admin_exists(
            &users,
            &config.default_admin_email,
            &config.default_admin_password,
        )
        .await
        {
            error!("Failed to ensure an admin exists: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
fn get_database_name() -> String {
    "council_votes".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for outgoing SMS.
#[derive(Deserialize)]
struct NotifierConfig {
    // non-secrets
    #[serde(default)]
    sms_enabled: bool,
    aws_region: Option<String>,
    aws_access_key_id: Option<String>,
    // secrets
    aws_secret_access_key: Option<String>,
}

/// A fairing that loads the SMS config and places an `Arc<dyn Notifier>`
/// into managed state. Without SMS enabled, messages are only logged.
pub struct NotifierFairing;

#[rocket::async_trait]
impl Fairing for NotifierFairing {
    fn info(&self) -> Info {
        Info {
            name: "Notifier",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<NotifierConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load notifier config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let notifier: Arc<dyn Notifier> = if config.sms_enabled {
            let (Some(region), Some(key_id), Some(secret)) = (
                config.aws_region,
                config.aws_access_key_id,
                config.aws_secret_access_key,
            ) else {
                error!("SMS is enabled but the AWS region or credentials are missing");
                return Err(rocket);
            };
            // Construct the connection.
            let aws_config = aws_config::from_env()
                .region(Region::new(region))
                .credentials_provider(Credentials::new(key_id, secret, None, None, "rocket config"))
                .load()
                .await;
            info!("Loaded Amazon SNS config");
            Arc::new(SnsNotifier::new(SnsClient::new(&aws_config)))
        } else {
            warn!("SMS disabled, notifications will only be logged");
            Arc::new(LogNotifier)
        };

        // Manage the state.
        rocket = rocket.manage(notifier);
        Ok(rocket)
    }
}
