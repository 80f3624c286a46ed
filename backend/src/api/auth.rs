//! Account API endpoints
//!
//! Registration, login and session tokens.

use crate::api::utils::{generate_token, hash_password, require_field, require_user, TOKEN_TTL_SECS};
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Username and password
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    /// Login name
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Username and session token
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Login name
    pub username: String,
    /// Session token issued at login
    pub token: String,
}

/// Request to change a password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    /// Login name
    pub username: String,
    /// Current password
    pub old_password: String,
    /// Replacement password
    pub new_password: String,
}

/// Issued session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Human-readable result
    pub message: String,
    /// Account id
    pub user_id: i64,
    /// New session token
    pub token: String,
}

/// Token check result
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    /// Whether the token is current
    pub valid: bool,
    /// Human-readable result
    pub message: String,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable result
    pub message: String,
}

/// Password change result
#[derive(Debug, Serialize)]
pub struct ChangePasswordResponse {
    /// Human-readable result
    pub message: String,
    /// Whether the password was changed
    pub success: bool,
}

async fn issue_token(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let token = generate_token();
    let expiry = chrono::Utc::now().timestamp() + TOKEN_TTL_SECS;
    state.db.set_user_token(user_id, &token, expiry).await?;
    Ok(token)
}

/// POST /register - Create an account and log it in
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    require_field("username", &request.username)?;
    require_field("password", &request.password)?;

    let user = state
        .db
        .create_user(&request.username, &hash_password(&request.password))
        .await?;
    let token = issue_token(&state, user.user_id).await?;

    info!(user_id = user.user_id, username = %user.username, "User registered");
    Ok(Json(SessionResponse {
        message: "Registration successful".to_string(),
        user_id: user.user_id,
        token,
    }))
}

/// POST /login - Check credentials and issue a new token
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state
        .db
        .get_user_by_username(&request.username)
        .await?
        .filter(|user| user.password_hash == hash_password(&request.password))
        .ok_or(AppError::InvalidCredentials)?;

    let token = issue_token(&state, user.user_id).await?;

    info!(user_id = user.user_id, "User logged in");
    Ok(Json(SessionResponse {
        message: "Login successful".to_string(),
        user_id: user.user_id,
        token,
    }))
}

/// POST /verify_token - Check whether a session token is current
pub async fn verify_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let now = chrono::Utc::now().timestamp();
    let valid = state
        .db
        .get_user_by_username(&request.username)
        .await?
        .is_some_and(|user| user.has_valid_token(&request.token, now));

    Ok(Json(VerifyResponse {
        valid,
        message: if valid {
            "Token is valid".to_string()
        } else {
            "Token is invalid or expired".to_string()
        },
    }))
}

/// POST /logout - Invalidate the user's session token
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .db
        .get_user_by_username(&request.username)
        .await?
        .ok_or_else(|| AppError::InvalidRequest(format!("Unknown user: {}", request.username)))?;

    state.db.clear_user_token(user.user_id).await?;

    info!(user_id = user.user_id, "User logged out");
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// POST /change_password - Replace the password after checking the old one
pub async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<ChangePasswordResponse>, AppError> {
    require_field("new_password", &request.new_password)?;
    let user = require_user(&state.db, &request.username).await?;

    if user.password_hash != hash_password(&request.old_password) {
        return Err(AppError::InvalidCredentials);
    }

    state
        .db
        .update_password_hash(user.user_id, &hash_password(&request.new_password))
        .await?;

    info!(user_id = user.user_id, "Password changed");
    Ok(Json(ChangePasswordResponse {
        message: "Password changed".to_string(),
        success: true,
    }))
}
