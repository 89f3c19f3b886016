use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    auth::{hash_password, MIN_PASSWORD_LENGTH},
    db::user::{normalize_email, Level, NewUser, User, UserType},
};

/// Local account sign-up details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSignUp {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_man: Option<bool>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    #[serde(default)]
    pub phone_num: Option<String>,
}

impl LocalSignUp {
    /// The normalised email address, rejecting anything without an `@`.
    pub fn email(&self) -> Result<String> {
        let email = normalize_email(&self.email);
        if email.is_empty() || !email.contains('@') {
            return Err(Error::invalid_input("a valid email address is required"));
        }
        Ok(email)
    }
}

impl TryFrom<LocalSignUp> for NewUser {
    type Error = Error;

    /// Validate the details and hash the password.
    fn try_from(sign_up: LocalSignUp) -> Result<Self> {
        let email = sign_up.email()?;
        if sign_up.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::invalid_input(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let mut user = NewUser::new(email, UserType::Local);
        user.password_hash = Some(hash_password(&sign_up.password)?);
        user.username = sign_up.username;
        user.is_man = sign_up.is_man;
        user.birthday = sign_up.birthday;
        user.phone_num = sign_up.phone_num;
        Ok(user)
    }
}

/// Local account sign-in credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSignIn {
    pub email: String,
    pub password: String,
}

/// Response to a successful sign-in, local or social.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResponse {
    pub success: bool,
    /// Value for the `Authorization` header of subsequent requests.
    pub token: String,
}

impl SignInResponse {
    pub fn new(token: String) -> Self {
        Self {
            success: true,
            token,
        }
    }
}

/// A user as shown to themselves and to administrators; never includes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDescription {
    pub id: ApiId,
    pub email: String,
    pub username: Option<String>,
    pub user_type: UserType,
    pub is_blocked: bool,
    pub is_admin: bool,
    pub level: Level,
    pub is_man: Option<bool>,
    pub birthday: Option<NaiveDate>,
    pub phone_num: Option<String>,
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDescription {
    fn from(user: User) -> Self {
        let User { object_id, user } = user;
        Self {
            id: object_id.into(),
            email: user.email,
            username: user.username,
            user_type: user.user_type,
            is_blocked: user.is_blocked,
            is_admin: user.is_admin,
            level: user.level,
            is_man: user.is_man,
            birthday: user.birthday,
            phone_num: user.phone_num,
            profile_pic: user.profile_pic,
            created_at: user.created_at,
        }
    }
}

/// Administrative changes to a user; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub level: Option<Level>,
    pub is_blocked: Option<bool>,
    pub is_admin: Option<bool>,
}
