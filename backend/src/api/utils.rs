//! API utility functions
//!
//! Contains helper functions used by API handlers for validation,
//! credentials and uploaded images.

use crate::chat::{ChatDb, User};
use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Maximum question length in characters
pub const MAX_QUESTION_LENGTH: usize = 10_000;

/// Lifetime of a session token in seconds (30 days)
pub const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Validate question string
///
/// # Arguments
/// * `question` - Question to validate
///
/// # Returns
/// * `Ok(())` - Question is valid
/// * `Err(AppError)` - Question is invalid (empty or too long)
pub fn validate_question(question: &str) -> Result<(), AppError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest(
            "Question cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_QUESTION_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "Question exceeds maximum length of {} characters",
            MAX_QUESTION_LENGTH
        )));
    }
    Ok(())
}

/// Validate a non-empty credential field
pub fn require_field(name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(format!("{} cannot be empty", name)));
    }
    Ok(())
}

/// Look up a user by name
///
/// # Returns
/// * `Err(AppError::UserNotFound)` if no such user exists
pub async fn require_user(db: &ChatDb, username: &str) -> Result<User, AppError> {
    db.get_user_by_username(username)
        .await?
        .ok_or_else(|| AppError::UserNotFound(username.to_string()))
}

/// Hex-encoded SHA-256 of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Fresh random session token (64 hex characters)
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Decode a base64 image, with or without a `data:` URL prefix
pub fn decode_image(image_base64: &str) -> Result<Vec<u8>, AppError> {
    let payload = match image_base64.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image_base64,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid image data: {}", e)))
}

/// Reject file names that carry path components
fn plain_file_name(file_name: &str) -> Result<&str, AppError> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(file_name),
        _ => Err(AppError::InvalidRequest(format!(
            "Invalid image file name: {}",
            file_name
        ))),
    }
}

/// Save an uploaded image under `<uploads_dir>/<user_id>/<dialog_id>/`
///
/// # Returns
/// * `Ok(String)` - Path of the file relative to `uploads_dir`
/// * `Err(AppError)` - Bad name, bad data, or the write failed
pub async fn save_image_file(
    uploads_dir: &Path,
    user_id: i64,
    dialog_id: i64,
    file_name: &str,
    image_base64: &str,
) -> Result<String, AppError> {
    let file_name = plain_file_name(file_name)?;
    let bytes = decode_image(image_base64)?;

    let relative: PathBuf = [user_id.to_string(), dialog_id.to_string(), file_name.to_string()]
        .iter()
        .collect();
    let target = uploads_dir.join(&relative);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create upload directory: {}", e))
        })?;
    }
    tokio::fs::write(&target, bytes)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to save image: {}", e)))?;

    Ok(format!("{}/{}/{}", user_id, dialog_id, file_name))
}

/// Delete an upload previously written by [`save_image_file`]
///
/// `media_ref` is the relative path `save_image_file` returned. A file that is
/// already gone is not an error.
pub async fn remove_image_file(uploads_dir: &Path, media_ref: &str) -> Result<(), AppError> {
    let relative = Path::new(media_ref);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(AppError::InvalidRequest(format!(
            "Invalid media reference: {}",
            media_ref
        )));
    }
    match tokio::fs::remove_file(uploads_dir.join(relative)).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!(
            "Failed to remove image: {}",
            e
        ))),
    }
}
