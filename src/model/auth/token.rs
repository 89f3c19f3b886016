use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::user::{Level, User},
    mongodb::Id,
};

/// Prefix of the `Authorization` header value, and of the tokens handed out at sign-in.
pub const BEARER_PREFIX: &str = "Bearer ";

/// An authentication token representing a specific user.
///
/// The level is informational only; authorization decisions use the level
/// stored on the user at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "uid")]
    pub user_id: Id,
    #[serde(rename = "lvl")]
    pub level: Level,
}

impl AuthToken {
    pub fn new(user: &User) -> Self {
        Self {
            user_id: user.object_id,
            level: user.level,
        }
    }

    /// Sign this token into a JWT that expires after the configured lifetime.
    pub fn encode(self, config: &Config) -> Result<String> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Sign this token and format it the way clients send it back.
    pub fn into_bearer(self, config: &Config) -> Result<String> {
        Ok(format!("{BEARER_PREFIX}{}", self.encode(config)?))
    }

    /// Verify the signature and expiry of a JWT and extract the token.
    pub fn decode(token: &str, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }

    /// Extract the token from an `Authorization` header value.
    pub fn from_header(header: &str, config: &Config) -> Result<Self> {
        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or_else(|| Error::unauthorized("Authorization is not a bearer token"))?;
        Self::decode(token.trim(), config)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn example_token() -> AuthToken {
        AuthToken {
            user_id: Id::new(),
            level: Level::try_from(5).unwrap(),
        }
    }

    #[test]
    fn bearer_round_trip() {
        let config = Config::example();
        let token = example_token();
        let header = token.clone().into_bearer(&config).unwrap();
        assert!(header.starts_with(BEARER_PREFIX));
        assert_eq!(AuthToken::from_header(&header, &config).unwrap(), token);
    }

    #[test]
    fn header_must_be_bearer() {
        let config = Config::example();
        let jwt = example_token().encode(&config).unwrap();
        assert!(matches!(
            AuthToken::from_header(&format!("Basic {jwt}"), &config),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = Config::example();
        let claims = Claims {
            token: example_token(),
            expire_at: Utc::now() - Duration::hours(1),
        };
        let jwt = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        assert!(matches!(AuthToken::decode(&jwt, &config), Err(Error::Jwt(_))));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = Config::example();
        let claims = Claims {
            token: example_token(),
            expire_at: Utc::now() + Duration::hours(1),
        };
        let jwt = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"someone else's secret"),
        )
        .unwrap();
        assert!(AuthToken::decode(&jwt, &config).is_err());
    }
}
