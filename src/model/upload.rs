//! Storage of uploaded images under the configured upload directory.
//!
//! Each resource type has its own sub-directory, and stored files get a
//! random name so clients never choose paths.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use rocket::{
    fs::{NamedFile, TempFile},
    http::ContentType,
    tokio::fs,
};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Sub-directory holding choice images.
pub const CHOICE_DIR: &str = "choice";

/// Location of a stored file.
pub fn stored_path(uploads_dir: &Path, resource: &str, file_name: &str) -> PathBuf {
    uploads_dir.join(resource).join(file_name)
}

/// Check that an upload's content type is an image type, returning the file
/// extension to store it with.
pub fn image_extension(content_type: Option<&ContentType>) -> Result<String> {
    let content_type =
        content_type.ok_or_else(|| Error::invalid_input("attachment has no content type"))?;
    if content_type.top() != "image" {
        return Err(Error::invalid_input(format!(
            "attachment must be an image, got {content_type}"
        )));
    }
    let extension = match content_type.extension() {
        Some(extension) => extension.to_string(),
        None => content_type
            .sub()
            .as_str()
            .split('+')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect(),
    };
    if extension.is_empty() {
        return Err(Error::invalid_input(format!(
            "unsupported image type {content_type}"
        )));
    }
    Ok(extension.to_lowercase())
}

/// Move an uploaded image into the resource's directory, returning its new file name.
pub async fn store_image(file: &mut TempFile<'_>, uploads_dir: &Path, resource: &str) -> Result<String> {
    let extension = image_extension(file.content_type())?;
    let file_name = format!("{}.{extension}", Uuid::new_v4());
    let dir = uploads_dir.join(resource);
    fs::create_dir_all(&dir).await?;
    file.move_copy_to(dir.join(&file_name)).await?;
    debug!("Stored upload {resource}/{file_name}");
    Ok(file_name)
}

/// Remove a stored file. Failures are logged and otherwise ignored, since the
/// database no longer refers to the file.
pub async fn discard(uploads_dir: &Path, resource: &str, file_name: &str) {
    let path = stored_path(uploads_dir, resource, file_name);
    match fs::remove_file(&path).await {
        Ok(()) => debug!("Removed upload {resource}/{file_name}"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", path.display()),
    }
}

/// Open a stored file for download.
pub async fn open(uploads_dir: &Path, resource: &str, file_name: &str) -> Result<NamedFile> {
    let path = stored_path(uploads_dir, resource, file_name);
    match NamedFile::open(&path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(Error::not_found(format!("Image {resource}/{file_name}")))
        }
        Err(e) => Err(e.into()),
    }
}
