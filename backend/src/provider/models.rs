//! Provider data models
//!
//! Messages sent to a provider and the deltas it streams back.

use serde::Serialize;

/// Role of a message in a provider request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions placed before the dialog
    System,
    /// Message from the user
    User,
    /// Message from the assistant/AI
    Assistant,
}

/// Content of a message: plain text, or text with an attached image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text
    Text(String),
    /// Text plus an image reference (URL or `data:` URL)
    TextWithImage {
        /// Text part
        text: String,
        /// Image URL handed to the provider
        image_url: String,
    },
}

impl MessageContent {
    /// The text part of the content
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::TextWithImage { text, .. } => text,
        }
    }
}

/// A single message of the history sent to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: ChatRole,
    /// What was written
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a plain-text user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message carrying an image
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::TextWithImage {
                text: text.into(),
                image_url: image_url.into(),
            },
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// One incremental unit of generated text
///
/// Either part may be empty; providers without a reasoning channel always leave
/// `reasoning` empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Next piece of the answer
    pub answer: String,
    /// Next piece of the reasoning trace
    pub reasoning: String,
}

impl Delta {
    /// Create a delta from its two parts
    pub fn new(answer: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            reasoning: reasoning.into(),
        }
    }

    /// True when neither part carries text
    pub fn is_empty(&self) -> bool {
        self.answer.is_empty() && self.reasoning.is_empty()
    }
}
