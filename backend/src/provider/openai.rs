//! OpenAI-compatible streaming client
//!
//! Speaks the chat-completions streaming protocol used by DeepSeek, Qianfan,
//! DashScope and Hunyuan: a POST with `stream: true` answered by Server-Sent
//! Events whose `data:` lines carry JSON chunks, terminated by `data: [DONE]`.
//!
//! The client is blocking and must be driven from a worker thread of the
//! stream bridge, which relays deltas to the async side.

use crate::provider::error::ProviderError;
use crate::provider::models::{ChatMessage, ChatRole, Delta, MessageContent};
use crate::provider::{ChatProvider, DeltaStream};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::io::BufReader;
use std::time::Duration;
use tracing::{debug, error, warn};

const DONE_MARKER: &str = "[DONE]";

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: ChatRole,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let content = match &message.content {
            MessageContent::Text(text) => WireContent::Text(text),
            MessageContent::TextWithImage { text, image_url } => WireContent::Parts(vec![
                WirePart::Text { text },
                WirePart::ImageUrl {
                    image_url: WireImageUrl { url: image_url },
                },
            ]),
        };
        Self {
            role: message.role,
            content,
        }
    }
}

/// Streaming chunk structure
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

/// Choice in streaming chunk
#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

/// Delta content in streaming chunk
#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Provider for one model served by an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: String,
    model: String,
    connect_timeout: Duration,
}

impl OpenAiCompatibleProvider {
    /// Create a provider for `model` served at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        connect_timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl ChatProvider for OpenAiCompatibleProvider {
    fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError> {
        // No overall timeout: a completion may legitimately stream for minutes.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None)
            .build()?;

        let request = CompletionRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: true,
        };

        debug!(
            model = %self.model,
            message_count = messages.len(),
            "Starting streaming completion"
        );

        let mut http_request = client.post(self.completions_url()).json(&request);
        if !self.api_key.is_empty() {
            http_request = http_request.bearer_auth(&self.api_key);
        }
        let response = http_request.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            error!(
                model = %self.model,
                status_code = status.as_u16(),
                error_body = %body,
                "Provider returned error status"
            );
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::new(SseDeltaReader::new(BufReader::new(response))))
    }
}

/// Iterator turning an SSE byte stream into deltas
///
/// Ends at `data: [DONE]`, at end of input, or after yielding the first error.
pub struct SseDeltaReader<R> {
    reader: R,
    line: String,
    finished: bool,
}

impl<R: BufRead> SseDeltaReader<R> {
    /// Wrap a buffered reader positioned at the start of the event stream
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            finished: false,
        }
    }

    fn fail(&mut self, err: ProviderError) -> Option<Result<Delta, ProviderError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for SseDeltaReader<R> {
    type Item = Result<Delta, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => return self.fail(ProviderError::Io(e)),
            }

            let line = self.line.trim();
            // Blank separators, comments/keepalives and `event:`/`id:` fields
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();

            if payload == DONE_MARKER {
                self.finished = true;
                return None;
            }

            let chunk: StreamChunk = match serde_json::from_str(payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "Failed to parse stream chunk");
                    let message = format!("{}: {}", e, payload.chars().take(200).collect::<String>());
                    return self.fail(ProviderError::Protocol(message));
                }
            };

            // Usage-only chunks carry no choices
            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };

            return Some(Ok(Delta {
                answer: choice.delta.content.unwrap_or_default(),
                reasoning: choice.delta.reasoning_content.unwrap_or_default(),
            }));
        }
        None
    }
}
