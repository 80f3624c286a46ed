//! Dialog API endpoints
//!
//! Create, rename, delete and list a user's dialogs.

use crate::api::utils::require_user;
use crate::chat::ChatRecord;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Title used when a dialog is created without one
pub const DEFAULT_DIALOG_TITLE: &str = "New Dialog";

/// Request to create a dialog
#[derive(Debug, Deserialize)]
pub struct NewDialogRequest {
    /// Owner of the new dialog
    pub username: String,
    /// Optional title
    pub conversation_title: Option<String>,
}

/// Request to rename a dialog
#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    /// New title
    pub title: String,
    /// Owner of the dialog
    pub username: String,
}

/// Query string naming the acting user
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    /// Login name
    pub username: String,
}

/// Created dialog
#[derive(Debug, Serialize)]
pub struct NewDialogResponse {
    /// Id of the new dialog
    pub dialog_id: i64,
}

/// Renamed dialog
#[derive(Debug, Serialize)]
pub struct UpdateTitleResponse {
    /// Human-readable result
    pub message: String,
    /// Dialog id
    pub dialog_id: i64,
    /// Title now stored
    pub title: String,
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Human-readable result
    pub message: String,
}

/// One stored turn as sent to the client
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    /// Record id
    pub record_id: i64,
    /// Text of the turn
    pub content: String,
    /// `1` for the user, `0` for the assistant
    pub role: i64,
    /// Unix timestamp
    pub created_at: i64,
    /// Relative path of an attached image
    pub media_url: Option<String>,
    /// Reasoning trace of an assistant turn
    pub reasoning_content: Option<String>,
}

impl From<ChatRecord> for RecordResponse {
    fn from(record: ChatRecord) -> Self {
        Self {
            record_id: record.record_id,
            content: record.content,
            role: record.role,
            created_at: record.created_at,
            media_url: record.media_url,
            reasoning_content: record.reasoning_content,
        }
    }
}

/// One dialog with its records
#[derive(Debug, Serialize)]
pub struct DialogResponse {
    /// Dialog id
    pub dialog_id: i64,
    /// Title
    pub title: String,
    /// Records in the order they were written
    pub chat_records: Vec<RecordResponse>,
}

/// All dialogs of a user
#[derive(Debug, Serialize)]
pub struct DialogListResponse {
    /// Most recently used first
    pub conversations: Vec<DialogResponse>,
}

/// POST /new_dialog - Create an empty dialog
pub async fn new_dialog(
    State(state): State<AppState>,
    Json(request): Json<NewDialogRequest>,
) -> Result<Json<NewDialogResponse>, AppError> {
    let user = require_user(&state.db, &request.username).await?;
    let title = request
        .conversation_title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIALOG_TITLE.to_string());

    let dialog = state.db.create_dialog(user.user_id, &title).await?;

    info!(user_id = user.user_id, dialog_id = dialog.dialog_id, "Dialog created");
    Ok(Json(NewDialogResponse {
        dialog_id: dialog.dialog_id,
    }))
}

/// DELETE /dialog/:dialog_id?username= - Delete a dialog and its records
pub async fn delete_dialog(
    State(state): State<AppState>,
    Path(dialog_id): Path<i64>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    let user = require_user(&state.db, &query.username).await?;
    state
        .db
        .get_dialog(dialog_id, user.user_id)
        .await?
        .ok_or(AppError::DialogNotFound(dialog_id))?;

    state.db.delete_dialog(dialog_id).await?;

    info!(user_id = user.user_id, dialog_id, "Dialog deleted");
    Ok(Json(DeleteResponse {
        message: "Dialog deleted".to_string(),
    }))
}

/// PUT /dialog/:dialog_id - Rename a dialog
pub async fn update_dialog(
    State(state): State<AppState>,
    Path(dialog_id): Path<i64>,
    Json(request): Json<UpdateTitleRequest>,
) -> Result<Json<UpdateTitleResponse>, AppError> {
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::InvalidRequest("Title cannot be empty".to_string()));
    }

    let user = require_user(&state.db, &request.username).await?;
    state
        .db
        .get_dialog(dialog_id, user.user_id)
        .await?
        .ok_or(AppError::DialogNotFound(dialog_id))?;

    state.db.update_dialog_title(dialog_id, &title).await?;

    Ok(Json(UpdateTitleResponse {
        message: "Title updated".to_string(),
        dialog_id,
        title,
    }))
}

/// GET /dialogs?username= - List dialogs with their records
pub async fn list_dialogs(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DialogListResponse>, AppError> {
    let user = require_user(&state.db, &query.username).await?;
    let dialogs = state.db.list_dialogs(user.user_id).await?;

    let mut conversations = Vec::with_capacity(dialogs.len());
    for dialog in dialogs {
        let records = state.db.get_chat_history(dialog.dialog_id).await?;
        conversations.push(DialogResponse {
            dialog_id: dialog.dialog_id,
            title: dialog.title,
            chat_records: records.into_iter().map(RecordResponse::from).collect(),
        });
    }

    Ok(Json(DialogListResponse { conversations }))
}
