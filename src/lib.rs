#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

/// The complete server, connecting to the configured database on ignition.
pub fn build() -> Rocket<Build> {
    rocket_base(rocket::build()).attach(DatabaseFairing)
}

/// Everything except the database connection.
fn rocket_base(rocket: Rocket<Build>) -> Rocket<Build> {
    let rocket = rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .manage(reqwest::Client::new());
    api::mount(rocket)
}

#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let uri = std::env::var("ROCKET_DB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    mongodb::Client::with_uri_str(uri).await.unwrap()
}

/// A fresh database name, so tests can run in parallel.
#[cfg(test)]
pub(crate) fn database() -> String {
    use rand::{distributions::Alphanumeric, Rng};

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("test_{}", suffix.to_lowercase())
}

/// A server using the given database, with uploads in a temporary directory
/// and Kakao sign-in configured.
#[cfg(test)]
pub(crate) async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let uploads_dir = std::env::temp_dir().join(format!("survey-uploads-{db_name}"));
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test-secret"))
        .merge(("uploads_dir", uploads_dir))
        .merge(("kakao_client_id", "test-kakao-client"));

    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    rocket_base(rocket::custom(figment)).manage(client).manage(db)
}
