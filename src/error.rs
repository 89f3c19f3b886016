use std::fmt::Display;

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::RequestId;
use crate::model::mongodb::is_duplicate_key;

pub type Result<T> = std::result::Result<T, Error>;

/// Message shown to clients in place of internal failure details.
pub const UNKNOWN_ERROR: &str = "An unknown error occurred.";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl Error {
    pub fn invalid_input(message: impl Display) -> Self {
        Self::InvalidInput(message.to_string())
    }

    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict(what: impl Display) -> Self {
        Self::Conflict(what.to_string())
    }

    pub fn unauthorized(message: impl Display) -> Self {
        Self::Unauthorized(message.to_string())
    }

    pub fn forbidden(message: impl Display) -> Self {
        Self::Forbidden(message.to_string())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidInput(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
            Self::Conflict(_) | Self::Unauthorized(_) | Self::Forbidden(_) => Status::Forbidden,
            Self::Db(_)
            | Self::Jwt(_)
            | Self::Argon2(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Internal(_) => Status::InternalServerError,
        }
    }
}

impl From<DbError> for Error {
    /// Duplicate key violations of the uniqueness indexes are conflicts, not failures.
    fn from(err: DbError) -> Self {
        if is_duplicate_key(&err) {
            Self::Conflict("An entity with the same key".to_string())
        } else {
            Self::Db(err)
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let id = RequestId::of(req);
        let message = if status == Status::InternalServerError {
            error!("req{id}: {self}");
            UNKNOWN_ERROR.to_string()
        } else {
            warn!("req{id}: {self}");
            self.to_string()
        };
        (status, Json(ErrorBody { error: message })).respond_to(req)
    }
}
