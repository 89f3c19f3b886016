//! Authentication: password hashing, bearer tokens, the request identity
//! guard and the OAuth provider glue.

mod oauth;
mod token;
mod viewer;

use rand::Rng;

use crate::error::Result;

pub use oauth::{OauthProfile, OauthState, Provider};
pub use token::{AuthToken, BEARER_PREFIX};
pub use viewer::Viewer;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a plaintext password into an argon2 encoded string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    // 16 bytes is recommended for password hashing:
    //  https://en.wikipedia.org/wiki/Argon2
    let mut salt = [0_u8; 16];
    rand::thread_rng().fill(&mut salt);
    let hash = argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())?;
    Ok(hash)
}
