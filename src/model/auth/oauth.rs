//! The OAuth 2.0 authorization-code flow against the supported social
//! sign-in providers.

use std::fmt::{Display, Formatter};

use chrono::{serde::ts_seconds, DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use log::debug;
use reqwest::Url;
use rocket::{request::FromParam, serde::json::Value};
use serde::{Deserialize, Serialize};

use crate::config::{Config, OauthClient};
use crate::error::{Error, Result};
use crate::model::db::user::UserType;

/// How long a sign-in attempt may take between redirect and callback.
const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Kakao,
    Naver,
    Google,
}

/// Endpoints of one provider.
struct Endpoints {
    authorize: &'static str,
    token: &'static str,
    profile: &'static str,
    scope: Option<&'static str>,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Self::Kakao => "kakao",
            Self::Naver => "naver",
            Self::Google => "google",
        }
    }

    pub fn user_type(self) -> UserType {
        match self {
            Self::Kakao => UserType::Kakao,
            Self::Naver => UserType::Naver,
            Self::Google => UserType::Google,
        }
    }

    fn endpoints(self) -> Endpoints {
        match self {
            Self::Kakao => Endpoints {
                authorize: "https://kauth.kakao.com/oauth/authorize",
                token: "https://kauth.kakao.com/oauth/token",
                profile: "https://kapi.kakao.com/v2/user/me",
                scope: None,
            },
            Self::Naver => Endpoints {
                authorize: "https://nid.naver.com/oauth2.0/authorize",
                token: "https://nid.naver.com/oauth2.0/token",
                profile: "https://openapi.naver.com/v1/nid/me",
                scope: None,
            },
            Self::Google => Endpoints {
                authorize: "https://accounts.google.com/o/oauth2/v2/auth",
                token: "https://oauth2.googleapis.com/token",
                profile: "https://openidconnect.googleapis.com/v1/userinfo",
                scope: Some("openid email profile"),
            },
        }
    }

    /// The configured client credentials, failing if this provider is not set up.
    pub fn client(self, config: &Config) -> Result<OauthClient<'_>> {
        let client = match self {
            Self::Kakao => config.kakao(),
            Self::Naver => config.naver(),
            Self::Google => config.google(),
        };
        client.ok_or_else(|| Error::invalid_input(format!("{self} sign-in is not configured")))
    }

    /// Where the provider sends the user back to after they approve.
    pub fn callback_uri(self, config: &Config) -> String {
        format!(
            "{}/api/auth/signup/{}/callback",
            config.public_url(),
            self.name()
        )
    }

    /// The provider URL that starts a sign-in attempt.
    pub fn authorize_url(self, config: &Config) -> Result<Url> {
        let client = self.client(config)?;
        let state = OauthState::new(self).encode(config)?;
        let callback = self.callback_uri(config);
        let endpoints = self.endpoints();

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", client.id),
            ("redirect_uri", callback.as_str()),
            ("state", state.as_str()),
        ];
        if let Some(scope) = endpoints.scope {
            params.push(("scope", scope));
        }
        Url::parse_with_params(endpoints.authorize, &params)
            .map_err(|e| Error::Internal(format!("Bad {self} authorize URL: {e}")))
    }

    /// Trade an authorization code for an access token.
    pub async fn exchange_code(
        self,
        http: &reqwest::Client,
        config: &Config,
        code: &str,
        state: &str,
    ) -> Result<String> {
        let client = self.client(config)?;
        let callback = self.callback_uri(config);
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", client.id),
            ("redirect_uri", callback.as_str()),
            ("code", code),
            ("state", state),
        ];
        if let Some(secret) = client.secret {
            form.push(("client_secret", secret));
        }

        let response: TokenResponse = http
            .post(self.endpoints().token)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.access_token.ok_or_else(|| {
            Error::Internal(format!(
                "{self} token exchange failed: {}",
                response.error.as_deref().unwrap_or("no access token")
            ))
        })
    }

    /// Fetch and parse the signed-in user's profile.
    pub async fn fetch_profile(self, http: &reqwest::Client, access_token: &str) -> Result<OauthProfile> {
        let profile: Value = http
            .get(self.endpoints().profile)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Fetched {self} profile");
        self.parse_profile(&profile)
    }

    /// Extract the fields we keep from a provider's profile response.
    pub fn parse_profile(self, profile: &Value) -> Result<OauthProfile> {
        let text = |value: &Value| value.as_str().map(str::to_string);
        let parsed = match self {
            Self::Kakao => {
                let account = &profile["kakao_account"];
                OauthProfile {
                    email: text(&account["email"]).unwrap_or_default(),
                    name: text(&account["profile"]["nickname"]),
                    is_man: match account["gender"].as_str() {
                        Some("male") => Some(true),
                        Some("female") => Some(false),
                        _ => None,
                    },
                    profile_pic: text(&account["profile"]["profile_image_url"]),
                    phone_num: text(&account["phone_number"]),
                    birthday: None,
                }
            }
            Self::Naver => {
                let response = &profile["response"];
                let birthday = match (response["birthyear"].as_str(), response["birthday"].as_str()) {
                    (Some(year), Some(day)) => {
                        NaiveDate::parse_from_str(&format!("{year}-{day}"), "%Y-%m-%d").ok()
                    }
                    _ => None,
                };
                OauthProfile {
                    email: text(&response["email"]).unwrap_or_default(),
                    name: text(&response["name"]).or_else(|| text(&response["nickname"])),
                    is_man: match response["gender"].as_str() {
                        Some("M") => Some(true),
                        Some("F") => Some(false),
                        _ => None,
                    },
                    profile_pic: text(&response["profile_image"]),
                    phone_num: text(&response["mobile"]),
                    birthday,
                }
            }
            Self::Google => OauthProfile {
                email: text(&profile["email"]).unwrap_or_default(),
                name: text(&profile["name"]),
                is_man: None,
                profile_pic: text(&profile["picture"]),
                phone_num: None,
                birthday: None,
            },
        };
        if parsed.email.is_empty() {
            return Err(Error::invalid_input(format!(
                "{self} account has no email address; allow email access and try again"
            )));
        }
        Ok(parsed)
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Kakao => "Kakao",
            Self::Naver => "Naver",
            Self::Google => "Google",
        };
        write!(f, "{name}")
    }
}

impl<'a> FromParam<'a> for Provider {
    type Error = Error;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        match param {
            "kakao" => Ok(Self::Kakao),
            "naver" => Ok(Self::Naver),
            "google" => Ok(Self::Google),
            other => Err(Error::not_found(format!("Sign-in provider '{other}'"))),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

/// What we learn about a user from their provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OauthProfile {
    pub email: String,
    pub name: Option<String>,
    pub is_man: Option<bool>,
    pub profile_pic: Option<String>,
    pub phone_num: Option<String>,
    pub birthday: Option<NaiveDate>,
}

/// The `state` parameter of a sign-in attempt: a short-lived JWT naming the
/// provider, so the callback needs no server-side session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OauthState {
    #[serde(rename = "prv")]
    pub provider: Provider,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

impl OauthState {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            expire_at: Utc::now() + Duration::minutes(STATE_TTL_MINUTES),
        }
    }

    pub fn encode(&self, config: &Config) -> Result<String> {
        let state = jsonwebtoken::encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(state)
    }

    /// Check that `state` was issued by us, is unexpired, and belongs to `provider`.
    pub fn verify(state: &str, provider: Provider, config: &Config) -> Result<Self> {
        let state = jsonwebtoken::decode(
            state,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|data: TokenData<Self>| data.claims)
        .map_err(|e| Error::unauthorized(format!("Invalid sign-in state: {e}")))?;
        if state.provider != provider {
            return Err(Error::unauthorized(format!(
                "Sign-in state was issued for {}",
                state.provider
            )));
        }
        Ok(state)
    }
}
