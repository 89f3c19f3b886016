use log::{info, warn};
use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
};
use rocket::{
    futures::TryStreamExt,
    response::{status::Created, Redirect},
    serde::json::Json,
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::user::{LocalSignIn, LocalSignUp, SignInResponse, UserDescription, UserPatch},
    auth::{AuthToken, OauthProfile, OauthState, Provider, Viewer},
    db::user::{normalize_email, NewUser, User},
    lifecycle::return_updated,
    mongodb::{inserted_id, Coll, Id},
};

pub fn routes() -> Vec<Route> {
    routes![
        sign_up_local,
        sign_in_local,
        sign_in_oauth,
        oauth_callback,
        me,
        list_users,
        update_user,
    ]
}

#[post("/signup/local", data = "<sign_up>", format = "json")]
async fn sign_up_local(
    sign_up: Json<LocalSignUp>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<Created<Json<UserDescription>>> {
    let user = NewUser::try_from(sign_up.into_inner())?;
    User::ensure_email_free(&users, &user.email).await?;

    let object_id = inserted_id(&new_users.insert_one(&user, None).await?)?;
    info!("Signed up {}", user.email);
    let user = User { object_id, user };
    Ok(Created::new(format!("/api/auth/users/{object_id}")).body(Json(user.into())))
}

#[post("/signin/local", data = "<credentials>", format = "json")]
async fn sign_in_local(
    credentials: Json<LocalSignIn>,
    config: &State<Config>,
    users: Coll<User>,
) -> Result<Json<SignInResponse>> {
    let email = normalize_email(&credentials.email);
    let user = User::find_by_email(&users, &email)
        .await?
        .filter(|user| user.verify_password(&credentials.password))
        .ok_or_else(|| Error::unauthorized("Incorrect email or password"))?;
    sign_in(user, config)
}

/// Issue a bearer token for `user`, unless they are blocked.
fn sign_in(user: User, config: &Config) -> Result<Json<SignInResponse>> {
    if user.is_blocked {
        warn!("Blocked user {} tried to sign in", user.email);
        return Err(Error::forbidden("This account has been blocked"));
    }
    info!("Signed in {}", user.email);
    let token = AuthToken::new(&user).into_bearer(config)?;
    Ok(Json(SignInResponse::new(token)))
}

#[get("/signup/<provider>")]
async fn sign_in_oauth(
    provider: std::result::Result<Provider, Error>,
    config: &State<Config>,
) -> Result<Redirect> {
    let url = provider?.authorize_url(config)?;
    Ok(Redirect::to(url.to_string()))
}

#[get("/signup/<provider>/callback?<code>&<state>&<error>")]
#[allow(clippy::too_many_arguments)]
async fn oauth_callback(
    provider: std::result::Result<Provider, Error>,
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    config: &State<Config>,
    http: &State<reqwest::Client>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
) -> Result<Json<SignInResponse>> {
    let provider = provider?;
    if let Some(error) = error {
        return Err(Error::unauthorized(format!("{provider} sign-in was refused: {error}")));
    }
    let state = state.ok_or_else(|| Error::invalid_input("state must be provided"))?;
    let code = code.ok_or_else(|| Error::invalid_input("code must be provided"))?;
    OauthState::verify(&state, provider, config)?;

    let access_token = provider.exchange_code(http, config, &code, &state).await?;
    let profile = provider.fetch_profile(http, &access_token).await?;
    let user = find_or_create(provider, profile, &users, &new_users).await?;
    sign_in(user, config)
}

/// The user with the profile's email, created from the profile if there is none.
async fn find_or_create(
    provider: Provider,
    profile: OauthProfile,
    users: &Coll<User>,
    new_users: &Coll<NewUser>,
) -> Result<User> {
    let email = normalize_email(&profile.email);
    if let Some(user) = User::find_by_email(users, &email).await? {
        return Ok(user);
    }

    let mut user = NewUser::new(email, provider.user_type());
    user.username = profile.name;
    user.is_man = profile.is_man;
    user.profile_pic = profile.profile_pic;
    user.phone_num = profile.phone_num;
    user.birthday = profile.birthday;
    let object_id = inserted_id(&new_users.insert_one(&user, None).await?)?;
    info!("Signed up {} via {provider}", user.email);
    Ok(User { object_id, user })
}

#[get("/me")]
async fn me(viewer: Viewer) -> Result<Json<UserDescription>> {
    let user = viewer.require_user()?.clone();
    Ok(Json(user.into()))
}

#[get("/users")]
async fn list_users(
    viewer: Viewer,
    config: &State<Config>,
    users: Coll<User>,
) -> Result<Json<Vec<UserDescription>>> {
    viewer.require_admin(config)?;
    let options = FindOptions::builder().sort(doc! { "email": 1 }).build();
    let found: Vec<User> = users.find(None, options).await?.try_collect().await?;
    Ok(Json(found.into_iter().map(UserDescription::from).collect()))
}

#[put("/users/<id>", data = "<patch>", format = "json")]
async fn update_user(
    viewer: Viewer,
    config: &State<Config>,
    id: Id,
    patch: Json<UserPatch>,
    users: Coll<User>,
) -> Result<Json<UserDescription>> {
    viewer.require_admin(config)?;
    let fields = patch_fields(&patch)?;
    let user = users
        .find_one_and_update(id.as_doc(), doc! { "$set": fields }, return_updated())
        .await?
        .ok_or_else(|| Error::not_found(format!("User {id}")))?;
    info!("Updated user {}", user.email);
    Ok(Json(user.into()))
}

/// The fields a patch sets, failing if it sets none.
fn patch_fields(patch: &UserPatch) -> Result<Document> {
    let mut fields = Document::new();
    if let Some(level) = patch.level {
        fields.insert("level", i32::from(u8::from(level)));
    }
    if let Some(is_blocked) = patch.is_blocked {
        fields.insert("isBlocked", is_blocked);
    }
    if let Some(is_admin) = patch.is_admin {
        fields.insert("isAdmin", is_admin);
    }
    if fields.is_empty() {
        return Err(Error::invalid_input("nothing to update"));
    }
    Ok(fields)
}
