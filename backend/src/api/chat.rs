//! Chat API endpoints
//!
//! Asking a question, stopping an answer, and following or fetching the
//! reasoning of a dialog.

use crate::api::streaming::{reasoning_response, stream_response, EncodingMode, ResponseEncoder};
use crate::api::utils::{remove_image_file, require_user, save_image_file, validate_question};
use crate::chat::{ChatRecord, ConversationContext, MessageRole, StreamRequest};
use crate::error::AppError;
use crate::provider::ChatMessage;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::{Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Model used when an ask names none
pub const DEFAULT_MODEL: &str = "model1";

/// Request to ask a question in a dialog
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// Who is asking
    pub username: String,
    /// Dialog to continue; required
    #[serde(default)]
    pub dialog_id: Option<i64>,
    /// The question
    pub question: String,
    /// Model selector (`model1`..`model6`) or upstream model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Attached image as base64, with or without a data URL prefix
    #[serde(default)]
    pub image_base64: Option<String>,
    /// Client-side file name of the attached image
    #[serde(default)]
    pub image_path: Option<String>,
    /// Encoding of the response body
    #[serde(default)]
    pub stream_format: Option<EncodingMode>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Request to stop a streaming answer
#[derive(Debug, Deserialize)]
pub struct StopRequest {
    /// Dialog whose answer should stop
    pub dialog_id: i64,
    /// Who is asking
    #[serde(default)]
    pub username: Option<String>,
}

/// Stop acknowledgement
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Human-readable result
    pub message: String,
    /// Whether an active stream was found
    pub active: bool,
}

/// Reasoning of the latest answer
#[derive(Debug, Serialize)]
pub struct ReasoningResponse {
    /// Stored reasoning trace, empty when the model produced none
    pub reasoning_content: String,
}

/// Provider input for an ask: system prompt, prior turns, then the question
///
/// Prior turns with empty text (for example an answer that failed before its
/// first delta) are skipped.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatRecord],
    question: &str,
    image_url: Option<String>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));

    for record in history.iter().filter(|record| !record.content.is_empty()) {
        messages.push(match record.role_enum() {
            MessageRole::User => ChatMessage::user(record.content.clone()),
            MessageRole::Assistant => ChatMessage::assistant(record.content.clone()),
        });
    }

    messages.push(match image_url {
        Some(url) => ChatMessage::user_with_image(question, url),
        None => ChatMessage::user(question),
    });
    messages
}

/// Data URL for an uploaded image, as sent to the provider
pub fn image_data_url(image_base64: &str, file_name: &str) -> String {
    if image_base64.starts_with("data:") {
        return image_base64.to_string();
    }
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let mime = match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    format!("data:{};base64,{}", mime, image_base64)
}

/// POST /ask - Stream an answer to a question
///
/// Every input is validated before the stream starts; failures are plain
/// JSON errors. Once streaming, the exchange is persisted exactly once.
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, AppError> {
    let dialog_id = request.dialog_id.ok_or(AppError::MissingDialogId)?;
    validate_question(&request.question)?;

    let user = require_user(&state.db, &request.username).await?;
    state
        .db
        .get_dialog(dialog_id, user.user_id)
        .await?
        .ok_or(AppError::DialogNotFound(dialog_id))?;
    let model = state
        .providers
        .resolve(&request.model)
        .ok_or_else(|| AppError::UnknownModel(request.model.clone()))?;

    if state.cancellations.is_active(dialog_id) {
        return Err(AppError::StreamAlreadyActive(dialog_id));
    }

    let history = state.db.get_chat_history(dialog_id).await?;

    let (media_ref, image_url) = match (&request.image_base64, &request.image_path) {
        (Some(image), Some(file_name)) if !image.is_empty() => {
            let media_ref =
                save_image_file(&state.uploads_dir(), user.user_id, dialog_id, file_name, image)
                    .await?;
            debug!(dialog_id, media_ref = %media_ref, "Saved uploaded image");
            (Some(media_ref), Some(image_data_url(image, file_name)))
        }
        _ => (None, None),
    };

    let messages = build_messages(
        &state.config.streaming.system_prompt,
        &history,
        &request.question,
        image_url,
    );
    let encoder = ResponseEncoder::new(request.stream_format.unwrap_or_default());

    info!(
        dialog_id,
        user_id = user.user_id,
        model = %model.spec.selector,
        mode = ?encoder.mode(),
        "Ask accepted"
    );

    let started = state.bridge.start(
        StreamRequest {
            context: ConversationContext {
                dialog_id,
                user_id: user.user_id,
                model: model.spec.selector.clone(),
            },
            messages,
            question: request.question,
            media_ref: media_ref.clone(),
        },
        model.provider.clone(),
    );
    let bridge = match started {
        Ok(bridge) => bridge,
        Err(_) => {
            // Lost the race to a concurrent ask; nothing will reference the upload
            if let Some(media_ref) = &media_ref {
                if let Err(e) = remove_image_file(&state.uploads_dir(), media_ref).await {
                    warn!(dialog_id, media_ref = %media_ref, error = %e, "Failed to remove orphaned upload");
                }
            }
            return Err(AppError::StreamAlreadyActive(dialog_id));
        }
    };

    stream_response(bridge, encoder, &model.spec.selector, model.spec.reasoning)
}

/// POST /stop - Ask the active stream of a dialog to stop
///
/// Idempotent; stopping an idle dialog succeeds and changes nothing.
pub async fn stop(
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> Json<StopResponse> {
    debug!(
        dialog_id = request.dialog_id,
        username = request.username.as_deref().unwrap_or(""),
        "Stop received"
    );
    let active = state.bridge.stop(request.dialog_id);

    Json(StopResponse {
        message: if active {
            "Stop requested".to_string()
        } else {
            "No active stream".to_string()
        },
        active,
    })
}

/// GET /reasoning/:dialog_id - Reasoning of the latest stored answer
pub async fn latest_reasoning(
    State(state): State<AppState>,
    Path(dialog_id): Path<i64>,
) -> Result<Json<ReasoningResponse>, AppError> {
    let record = state
        .db
        .latest_assistant_record(dialog_id)
        .await?
        .ok_or_else(|| AppError::RecordNotFound(format!("no answer in dialog {}", dialog_id)))?;

    Ok(Json(ReasoningResponse {
        reasoning_content: record.reasoning_content.unwrap_or_default(),
    }))
}

/// GET /reasoning/stream/:dialog_id - Follow the reasoning of the active stream
pub async fn reasoning_stream(
    State(state): State<AppState>,
    Path(dialog_id): Path<i64>,
) -> Result<Response, AppError> {
    debug!(dialog_id, open = state.reasoning.is_open(dialog_id), "Reasoning subscriber");
    reasoning_response(state.reasoning.subscribe(dialog_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(role: MessageRole, content: &str) -> ChatRecord {
        ChatRecord {
            record_id: 0,
            dialog_id: 1,
            user_id: 1,
            content: content.to_string(),
            role: role.code(),
            media_url: None,
            media_type: None,
            reasoning_content: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_build_messages_order() {
        let history = vec![
            record(MessageRole::User, "hi"),
            record(MessageRole::Assistant, "hello"),
            record(MessageRole::User, "broken"),
            record(MessageRole::Assistant, ""),
        ];
        let messages = build_messages("be terse", &history, "2+2?", None);

        let texts: Vec<&str> = messages.iter().map(|m| m.content.text()).collect();
        assert_eq!(texts, vec!["be terse", "hi", "hello", "broken", "2+2?"]);
        assert_eq!(messages[0], ChatMessage::system("be terse"));
        assert_eq!(messages[2], ChatMessage::assistant("hello"));
        assert_eq!(messages[4], ChatMessage::user("2+2?"));
    }

    #[test]
    fn test_build_messages_with_image() {
        let messages = build_messages("sys", &[], "what is this?", Some("data:image/png;base64,aGk=".to_string()));
        assert_eq!(
            messages[1],
            ChatMessage::user_with_image("what is this?", "data:image/png;base64,aGk=")
        );
    }

    #[test]
    fn test_ask_without_model_uses_default() {
        let request: AskRequest =
            serde_json::from_str(r#"{"username":"a","dialog_id":1,"question":"q"}"#).unwrap();
        assert_eq!(request.model, DEFAULT_MODEL);
        assert_eq!(request.model, "model1");
        assert_eq!(request.stream_format, None);

        let request: AskRequest = serde_json::from_str(
            r#"{"username":"a","dialog_id":1,"question":"q","model":"model4","stream_format":"sse"}"#,
        )
        .unwrap();
        assert_eq!(request.model, "model4");
        assert_eq!(request.stream_format, Some(EncodingMode::Structured));
    }

    #[test]
    fn test_image_data_url() {
        assert_eq!(image_data_url("aGk=", "a.JPG"), "data:image/jpeg;base64,aGk=");
        assert_eq!(image_data_url("aGk=", "a.bin"), "data:image/png;base64,aGk=");
        assert_eq!(
            image_data_url("data:image/webp;base64,aGk=", "a.png"),
            "data:image/webp;base64,aGk="
        );
    }
}
