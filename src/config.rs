use std::path::{Path, PathBuf};

use chrono::Duration;
use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::error::Result;
use crate::model::{
    auth::hash_password,
    db::user::{normalize_email, Level, NewUser, User, UserType},
    mongodb::{ensure_indexes_exist, Coll},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_auth_ttl")]
    auth_ttl: u32,
    #[serde(default = "default_admin_level")]
    admin_level: Level,
    #[serde(default = "default_uploads_dir")]
    uploads_dir: PathBuf,
    #[serde(default = "default_public_url")]
    public_url: String,
    kakao_client_id: Option<String>,
    naver_client_id: Option<String>,
    google_client_id: Option<String>,
    bootstrap_admin_email: Option<String>,
    // secrets
    jwt_secret: String,
    kakao_client_secret: Option<String>,
    naver_client_secret: Option<String>,
    google_client_secret: Option<String>,
    bootstrap_admin_password: Option<String>,
}

fn default_auth_ttl() -> u32 {
    3600
}

fn default_admin_level() -> Level {
    // Unwrap safe because 10 is within the level bounds.
    Level::try_from(10).unwrap()
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OauthClient<'a> {
    pub id: &'a str,
    pub secret: Option<&'a str>,
}

impl Config {
    /// Valid lifetime of bearer tokens in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Users at or above this level may perform administrative operations.
    pub fn admin_level(&self) -> Level {
        self.admin_level
    }

    /// Root directory for uploaded files.
    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// The externally visible base URL, used to build OAuth callback URIs.
    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    pub fn kakao(&self) -> Option<OauthClient<'_>> {
        Self::oauth_client(&self.kakao_client_id, &self.kakao_client_secret)
    }

    pub fn naver(&self) -> Option<OauthClient<'_>> {
        Self::oauth_client(&self.naver_client_id, &self.naver_client_secret)
    }

    pub fn google(&self) -> Option<OauthClient<'_>> {
        Self::oauth_client(&self.google_client_id, &self.google_client_secret)
    }

    fn oauth_client<'a>(
        id: &'a Option<String>,
        secret: &'a Option<String>,
    ) -> Option<OauthClient<'a>> {
        id.as_deref().map(|id| OauthClient {
            id,
            secret: secret.as_deref(),
        })
    }

    /// Credentials of the administrator to create on first launch, if configured.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        self.bootstrap_admin_email
            .as_deref()
            .zip(self.bootstrap_admin_password.as_deref())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
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
        for (provider, client) in [
            ("Kakao", config.kakao()),
            ("Naver", config.naver()),
            ("Google", config.google()),
        ] {
            if client.is_none() {
                warn!("{provider} sign-in is not configured");
            }
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "survey".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
///
/// Must be attached after [`ConfigFairing`].
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
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to set up database indexes: {e}");
            return Err(rocket);
        }

        // Ensure the configured administrator exists.
        let Some(app_config) = rocket.state::<Config>() else {
            error!("The database fairing requires the application config");
            return Err(rocket);
        };
        let users = Coll::from_db(&db);
        let new_users = Coll::from_db(&db);
        let bootstrapped = ensure_admin_exists(&users, &new_users, app_config).await;
        if let Err(e) = bootstrapped {
            error!("Failed to create the bootstrap administrator: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Create the configured bootstrap administrator unless a user with that
/// email already exists.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(
    users: &Coll<User>,
    new_users: &Coll<NewUser>,
    config: &Config,
) -> Result<()> {
    let Some((email, password)) = config.bootstrap_admin() else {
        return Ok(());
    };
    let email = normalize_email(email);
    if User::find_by_email(users, &email).await?.is_some() {
        return Ok(());
    }

    let mut admin = NewUser::new(email.clone(), UserType::Local);
    admin.password_hash = Some(hash_password(password)?);
    admin.is_admin = true;
    admin.level = Level::MAX;
    new_users.insert_one(&admin, None).await?;
    warn!("Created bootstrap administrator {email}; change its password");
    Ok(())
}

/// Example config for tests that do not need a running server.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                auth_ttl: default_auth_ttl(),
                admin_level: default_admin_level(),
                uploads_dir: std::env::temp_dir().join("survey-backend-test-uploads"),
                public_url: "http://localhost:8000/".to_string(),
                kakao_client_id: Some("kakao-rest-key".to_string()),
                naver_client_id: Some("naver-id".to_string()),
                google_client_id: None,
                bootstrap_admin_email: None,
                jwt_secret: "test-secret".to_string(),
                kakao_client_secret: None,
                naver_client_secret: Some("naver-secret".to_string()),
                google_client_secret: None,
                bootstrap_admin_password: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::json,
    };

    use super::*;
    use crate::model::api::user::SignInResponse;

    #[test]
    fn public_url_has_no_trailing_slash() {
        assert_eq!(Config::example().public_url(), "http://localhost:8000");
    }

    #[test]
    fn oauth_clients_require_an_id() {
        let config = Config::example();
        assert_eq!(
            config.kakao(),
            Some(OauthClient {
                id: "kakao-rest-key",
                secret: None
            })
        );
        assert_eq!(config.naver().unwrap().secret, Some("naver-secret"));
        assert!(config.google().is_none());
    }

    #[test]
    fn bootstrap_admin_needs_both_fields() {
        let mut config = Config::example();
        assert!(config.bootstrap_admin().is_none());
        config.bootstrap_admin_email = Some("root@example.com".to_string());
        assert!(config.bootstrap_admin().is_none());
        config.bootstrap_admin_password = Some("changeme!".to_string());
        assert_eq!(
            config.bootstrap_admin(),
            Some(("root@example.com", "changeme!"))
        );
    }

    #[backend_test]
    async fn bootstrap_admin_signs_in_with_any_case(
        client: Client,
        users: Coll<User>,
        new_users: Coll<NewUser>,
    ) {
        let mut config = Config::example();
        config.bootstrap_admin_email = Some(" Root@Example.com".to_string());
        config.bootstrap_admin_password = Some("changeme-please".to_string());
        ensure_admin_exists(&users, &new_users, &config).await.unwrap();
        // A second launch finds the same account.
        ensure_admin_exists(&users, &new_users, &config).await.unwrap();

        let stored = users
            .count_documents(doc! { "email": "root@example.com" }, None)
            .await
            .unwrap();
        assert_eq!(stored, 1);

        let response = client
            .post("/api/auth/signin/local")
            .header(ContentType::JSON)
            .body(json!({ "email": "ROOT@example.com", "password": "changeme-please" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let signed_in: SignInResponse = response.into_json().await.unwrap();
        assert!(signed_in.success);
    }
}
