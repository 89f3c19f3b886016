use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{Coll, Id};

/// An authorization level between [`Level::MIN`] and [`Level::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: Level = Level(1);
    pub const MAX: Level = Level(30);
}

impl Default for Level {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(format!(
                "level must be between {} and {}, got {level}",
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a user signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Local,
    Kakao,
    Naver,
    Google,
}

/// Core user data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCore {
    /// Unique across all users.
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Argon2 encoded hash; only local users have one.
    #[serde(default)]
    pub password_hash: Option<String>,
    pub user_type: UserType,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub is_man: Option<bool>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub phone_num: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UserCore {
    /// A fresh, unprivileged user.
    pub fn new(email: String, user_type: UserType) -> Self {
        Self {
            email,
            username: None,
            password_hash: None,
            user_type,
            is_blocked: false,
            is_admin: false,
            level: Level::default(),
            is_man: None,
            birthday: None,
            phone_num: None,
            profile_pic: None,
            created_at: Utc::now(),
        }
    }

    /// Check whether the given password is correct. Users without a local
    /// password never match.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        match &self.password_hash {
            Some(hash) => argon2::verify_encoded(hash, password.as_ref()).unwrap_or(false),
            None => false,
        }
    }

    /// Whether this user may perform administrative operations, given the
    /// level from which users count as administrators.
    pub fn is_admin_at(&self, admin_level: Level) -> bool {
        self.is_admin || self.level >= admin_level
    }
}

/// A user without an object ID.
pub type NewUser = UserCore;

/// A user from the database, with its object ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub object_id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

/// The form every email address is stored and looked up in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl User {
    pub async fn find_by_email(users: &Coll<User>, email: &str) -> Result<Option<User>> {
        Ok(users.find_one(doc! { "email": email }, None).await?)
    }

    /// Fail with a conflict if any user already uses `email`.
    pub async fn ensure_email_free(users: &Coll<User>, email: &str) -> Result<()> {
        if Self::find_by_email(users, email).await?.is_some() {
            return Err(Error::conflict(format!("Account for {email}")));
        }
        Ok(())
    }
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
