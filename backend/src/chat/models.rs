//! Chat data models
//!
//! Defines structures for users, dialogs and chat records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role of a chat record author
///
/// Stored as a small integer: `1` for the user, `0` for the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user
    User,
    /// Message from the assistant/AI
    Assistant,
}

impl MessageRole {
    /// Convert the role to its stored code
    pub fn code(&self) -> i64 {
        match self {
            MessageRole::User => 1,
            MessageRole::Assistant => 0,
        }
    }

    /// Convert a stored code back to a role
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        }
    }
}

/// A registered account
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Unique identifier
    pub user_id: i64,
    /// Login name (unique)
    pub username: String,
    /// Hex-encoded password hash
    pub password_hash: String,
    /// Current session token, if logged in
    pub token: Option<String>,
    /// When the session token expires (Unix timestamp)
    pub token_expiry: Option<i64>,
    /// When the account was created (Unix timestamp)
    pub created_at: i64,
}

impl User {
    /// Whether `token` is this user's current, unexpired token
    pub fn has_valid_token(&self, token: &str, now: i64) -> bool {
        match (&self.token, self.token_expiry) {
            (Some(current), expiry) if current == token => expiry.map_or(true, |e| e >= now),
            _ => false,
        }
    }
}

/// A dialog (conversation thread) owned by one user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Dialog {
    /// Unique identifier for the dialog
    pub dialog_id: i64,
    /// Owner of the dialog
    pub user_id: i64,
    /// Title shown in the dialog list
    pub title: String,
    /// When the dialog was created (Unix timestamp)
    pub created_at: i64,
}

/// A single stored turn of a dialog
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatRecord {
    /// Unique identifier; also the insertion order
    pub record_id: i64,
    /// Dialog this record belongs to
    pub dialog_id: i64,
    /// Owner of the dialog
    pub user_id: i64,
    /// Text of the turn
    pub content: String,
    /// Role code, see [`MessageRole`]
    pub role: i64,
    /// Relative path of an attached file
    pub media_url: Option<String>,
    /// Kind of attached file (`image`)
    pub media_type: Option<String>,
    /// Reasoning trace of an assistant turn
    pub reasoning_content: Option<String>,
    /// When the record was created (Unix timestamp)
    pub created_at: i64,
}

impl ChatRecord {
    /// Get the record role as enum
    pub fn role_enum(&self) -> MessageRole {
        MessageRole::from_code(self.role)
    }
}

/// The two halves of one finished exchange, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRecord {
    /// Dialog the exchange belongs to
    pub dialog_id: i64,
    /// User who asked
    pub user_id: i64,
    /// The question as sent
    pub question: String,
    /// Everything the provider answered before the stream ended
    pub answer: String,
    /// Reasoning trace; empty when the provider produced none
    pub reasoning: String,
    /// Relative path of an uploaded image attached to the question
    pub media_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_codes_round_trip() {
        assert_eq!(MessageRole::User.code(), 1);
        assert_eq!(MessageRole::Assistant.code(), 0);
        assert_eq!(MessageRole::from_code(1), MessageRole::User);
        assert_eq!(MessageRole::from_code(0), MessageRole::Assistant);
    }

    #[test]
    fn test_token_validity() {
        let user = User {
            user_id: 1,
            username: "alice".to_string(),
            password_hash: String::new(),
            token: Some("abc".to_string()),
            token_expiry: Some(100),
            created_at: 0,
        };
        assert!(user.has_valid_token("abc", 50));
        assert!(!user.has_valid_token("abc", 101));
        assert!(!user.has_valid_token("xyz", 50));

        let logged_out = User { token: None, ..user };
        assert!(!logged_out.has_valid_token("abc", 50));
    }
}
