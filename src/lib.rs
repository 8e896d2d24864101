#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, NotifierFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notifier;
pub mod throttle;
pub mod voting;

/// Assemble the server: config, database, SMS, routes and JSON error catchers.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(NotifierFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// The server as [`build`] assembles it, but sending SMS through the given notifier.
#[cfg(test)]
pub(crate) fn rocket_for_notifier(
    notifier: std::sync::Arc<dyn notifier::Notifier>,
) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .manage(notifier)
        .mount("/", api::routes())
        .register("/", api::catchers())
}
