use rocket::{http::Status, serde::json::Json, Build, Catcher, Request, Rocket};

use crate::error::{ErrorBody, UNKNOWN_ERROR};

mod auth;
mod catalog;
mod common;
mod problem;
mod survey;

/// Mount every route and the JSON catchers.
pub fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/survey", survey::routes())
        .mount("/api/survey/problem", problem::routes())
        .mount("/api/auth", auth::routes())
        .mount("/api", catalog::routes())
        .register("/", catchers())
}

fn catchers() -> Vec<Catcher> {
    catchers![not_found, unprocessable, fallback]
}

#[catch(404)]
fn not_found(req: &Request) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: format!("{} not found", req.uri().path()),
    })
}

/// Request bodies that parse but do not fit the expected shape are invalid input.
#[catch(422)]
fn unprocessable() -> (Status, Json<ErrorBody>) {
    (
        Status::BadRequest,
        Json(ErrorBody {
            error: "Invalid input: malformed request body".to_string(),
        }),
    )
}

#[catch(default)]
fn fallback(status: Status, _req: &Request) -> (Status, Json<ErrorBody>) {
    let error = if status.code >= 500 {
        UNKNOWN_ERROR.to_string()
    } else {
        status.reason_lossy().to_string()
    };
    (status, Json(ErrorBody { error }))
}
