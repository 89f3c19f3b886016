use log::debug;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    db::user::User,
    mongodb::{Coll, Id},
};

use super::token::AuthToken;

/// The identity behind a request: a signed-in user, or nobody.
///
/// Extracting a viewer never rejects a request. A missing, malformed or
/// expired token, a token for a user that no longer exists, and a token for
/// a blocked user all yield an anonymous viewer. Handlers that need more
/// call [`Viewer::require_user`] or [`Viewer::require_admin`].
#[derive(Debug, Clone)]
pub struct Viewer(Option<User>);

impl Viewer {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }

    /// Object ID of the signed-in user, if any.
    pub fn user_id(&self) -> Option<Id> {
        self.0.as_ref().map(|user| user.object_id)
    }

    pub fn require_user(&self) -> Result<&User> {
        self.user()
            .ok_or_else(|| Error::unauthorized("You must be signed in"))
    }

    pub fn require_admin(&self, config: &Config) -> Result<&User> {
        let user = self.require_user()?;
        if user.is_admin_at(config.admin_level()) {
            Ok(user)
        } else {
            Err(Error::forbidden("Administrator rights are required"))
        }
    }

    async fn resolve(header: Option<&str>, config: &Config, users: &Coll<User>) -> Result<Self> {
        let Some(header) = header else {
            return Ok(Self::anonymous());
        };
        let token = match AuthToken::from_header(header, config) {
            Ok(token) => token,
            Err(e) => {
                debug!("Ignoring authorization header: {e}");
                return Ok(Self::anonymous());
            }
        };
        let user = users.find_one(token.user_id.as_doc(), None).await?;
        Ok(Self(user.filter(|user| !user.is_blocked)))
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Viewer {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();
        let users = req.guard::<Coll<User>>().await.unwrap();

        let header = req.headers().get_one("Authorization");
        match Self::resolve(header, config, &users).await {
            Ok(viewer) => Outcome::Success(viewer),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;
    use crate::model::{
        db::user::{Level, NewUser},
        mongodb::inserted_id,
    };

    #[test]
    fn anonymous_viewer_is_rejected() {
        let config = Config::example();
        let viewer = Viewer::anonymous();
        assert!(matches!(viewer.require_user(), Err(Error::Unauthorized(_))));
        assert!(matches!(
            viewer.require_admin(&config),
            Err(Error::Unauthorized(_))
        ));
    }

    #[backend_test]
    async fn token_resolves_to_user(users: Coll<User>, new_users: Coll<NewUser>) {
        let config = Config::example();
        let result = new_users.insert_one(NewUser::example(), None).await.unwrap();
        let id = inserted_id(&result).unwrap();
        let user = users.find_one(id.as_doc(), None).await.unwrap().unwrap();
        let header = AuthToken::new(&user).into_bearer(&config).unwrap();

        let viewer = Viewer::resolve(Some(&header), &config, &users).await.unwrap();
        assert_eq!(viewer.user_id(), Some(id));
        assert!(matches!(
            viewer.require_admin(&config),
            Err(Error::Forbidden(_))
        ));

        // Levels at the threshold count as administrators.
        users
            .update_one(id.as_doc(), doc! { "$set": { "level": 10 } }, None)
            .await
            .unwrap();
        let viewer = Viewer::resolve(Some(&header), &config, &users).await.unwrap();
        assert_eq!(viewer.require_admin(&config).unwrap().level, Level::try_from(10).unwrap());

        // Blocked users are anonymous.
        users
            .update_one(id.as_doc(), doc! { "$set": { "isBlocked": true } }, None)
            .await
            .unwrap();
        let viewer = Viewer::resolve(Some(&header), &config, &users).await.unwrap();
        assert!(viewer.user().is_none());
    }

    #[backend_test]
    async fn bad_tokens_are_anonymous(users: Coll<User>) {
        let config = Config::example();
        for header in [None, Some("Bearer not-a-jwt"), Some("Token abc")] {
            let viewer = Viewer::resolve(header, &config, &users).await.unwrap();
            assert!(viewer.user().is_none());
        }

        // A well-formed token for a user that does not exist.
        let token = AuthToken {
            user_id: Id::new(),
            level: Level::MAX,
        };
        let header = token.into_bearer(&config).unwrap();
        let viewer = Viewer::resolve(Some(&header), &config, &users).await.unwrap();
        assert!(viewer.user().is_none());
    }
}
