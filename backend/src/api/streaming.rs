//! Response encoding for streamed answers
//!
//! Turns bridge events into the wire format the client asked for: plain
//! incremental text, or Server-Sent Events records with a `type` discriminator.
//! Also formats the reasoning side-channel.

use crate::chat::{BridgeEvent, BridgeStream, ReasoningEvent, StreamOutcome};
use crate::error::AppError;
use crate::provider::Delta;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures_util::{stream::Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

/// Prefix of the line appended to a plain-text body when the provider fails
pub const PLAIN_ERROR_PREFIX: &str = "[ERROR]";

/// Response header carrying the dialog id of an ask
pub const DIALOG_ID_HEADER: &str = "x-dialog-id";

/// Response header telling the client whether to open the reasoning side-channel
pub const HAS_REASONING_HEADER: &str = "x-has-reasoning";

/// Wire format of the main answer channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Answer text only, no framing
    #[default]
    #[serde(alias = "text")]
    Plain,
    /// SSE records tagged `init`, `reasoning`, `answer`, `error`, `complete`
    #[serde(alias = "sse")]
    Structured,
}

impl EncodingMode {
    /// Content type of a response body in this mode
    pub fn content_type(&self) -> &'static str {
        match self {
            EncodingMode::Plain => "text/plain; charset=utf-8",
            EncodingMode::Structured => "text/event-stream",
        }
    }
}

/// Stateless encoder for one response
#[derive(Debug, Clone, Copy)]
pub struct ResponseEncoder {
    mode: EncodingMode,
}

impl ResponseEncoder {
    /// Create an encoder for `mode`
    pub fn new(mode: EncodingMode) -> Self {
        Self { mode }
    }

    /// Mode this encoder writes
    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// Opening record, emitted before any delta (structured mode only)
    pub fn init(&self, dialog_id: i64, model: &str, has_reasoning: bool) -> Option<String> {
        match self.mode {
            EncodingMode::Plain => None,
            EncodingMode::Structured => Some(sse_record(&json!({
                "type": "init",
                "dialog_id": dialog_id,
                "model": model,
                "has_reasoning": has_reasoning,
            }))),
        }
    }

    /// Encode one delta; `None` when nothing should be written
    ///
    /// Plain mode writes only the answer part. Structured mode writes one
    /// record per non-empty part, reasoning first.
    pub fn delta(&self, delta: &Delta) -> Option<String> {
        match self.mode {
            EncodingMode::Plain => {
                (!delta.answer.is_empty()).then(|| delta.answer.clone())
            }
            EncodingMode::Structured => {
                let mut out = String::new();
                if !delta.reasoning.is_empty() {
                    out.push_str(&sse_record(&json!({
                        "type": "reasoning",
                        "content": delta.reasoning,
                    })));
                }
                if !delta.answer.is_empty() {
                    out.push_str(&sse_record(&json!({
                        "type": "answer",
                        "content": delta.answer,
                    })));
                }
                (!out.is_empty()).then_some(out)
            }
        }
    }

    /// Closing output for a finished stream
    pub fn finish(&self, outcome: &StreamOutcome) -> Option<String> {
        match self.mode {
            EncodingMode::Plain => outcome.error.as_ref().map(|message| {
                if outcome.answer.is_empty() {
                    format!("{} {}", PLAIN_ERROR_PREFIX, message)
                } else {
                    format!("\n{} {}", PLAIN_ERROR_PREFIX, message)
                }
            }),
            EncodingMode::Structured => {
                let mut out = String::new();
                if let Some(message) = &outcome.error {
                    out.push_str(&sse_record(&json!({
                        "type": "error",
                        "message": message,
                    })));
                }
                out.push_str(&sse_record(&json!({
                    "type": "complete",
                    "state": outcome.state,
                    "answer": outcome.answer,
                    "reasoning": outcome.reasoning,
                })));
                Some(out)
            }
        }
    }
}

fn sse_record(value: &serde_json::Value) -> String {
    format!("data: {}\n\n", value)
}

/// Encode a bridge stream into response body chunks
///
/// Dropping the returned stream drops the bridge stream, which latches the
/// stop flag and persists in the background.
pub fn encode_bridge(
    mut bridge: BridgeStream,
    encoder: ResponseEncoder,
    init: Option<String>,
) -> impl Stream<Item = Result<String, std::io::Error>> + Send + 'static {
    use async_stream::stream;

    stream! {
        if let Some(init) = init {
            yield Ok(init);
        }
        while let Some(event) = bridge.next().await {
            let chunk = match event {
                BridgeEvent::Delta(delta) => encoder.delta(&delta),
                BridgeEvent::Finished(outcome) => encoder.finish(&outcome),
            };
            if let Some(chunk) = chunk {
                yield Ok(chunk);
            }
        }
    }
}

/// Build the streamed ask response
///
/// # Arguments
/// * `bridge` - Started bridge stream
/// * `encoder` - Encoder for the requested mode
/// * `model` - Model selector, echoed in the `init` record
/// * `has_reasoning` - Whether the model exposes reasoning
///
/// # Returns
/// * `Result<Response, AppError>` - Streaming HTTP response or error
pub fn stream_response(
    bridge: BridgeStream,
    encoder: ResponseEncoder,
    model: &str,
    has_reasoning: bool,
) -> Result<Response, AppError> {
    let dialog_id = bridge.dialog_id();
    let init = encoder.init(dialog_id, model, has_reasoning);
    let body = Body::from_stream(encode_bridge(bridge, encoder, init));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, encoder.mode().content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .header(DIALOG_ID_HEADER, HeaderValue::from(dialog_id))
        .header(
            HAS_REASONING_HEADER,
            HeaderValue::from_static(if has_reasoning { "true" } else { "false" }),
        );
    if encoder.mode() == EncodingMode::Structured {
        builder = builder.header(header::CONNECTION, "keep-alive");
    }

    builder
        .body(body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build stream response: {}", e)))
}

/// Format one reasoning side-channel event as SSE
///
/// Chunks become `event: message` records, one `data:` line per text line;
/// the end of the stream is `event: complete`.
pub fn reasoning_event(event: &ReasoningEvent) -> String {
    match event {
        ReasoningEvent::Chunk(chunk) => {
            let mut out = String::from("event: message\n");
            for line in chunk.split('\n') {
                out.push_str("data: ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
            out
        }
        ReasoningEvent::Complete => "event: complete\ndata: complete\n\n".to_string(),
    }
}

/// Build the SSE response of the reasoning side-channel
pub fn reasoning_response(
    events: impl Stream<Item = ReasoningEvent> + Send + 'static,
) -> Result<Response, AppError> {
    let sse_stream = events.map(|event| Ok::<_, std::io::Error>(reasoning_event(&event)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(sse_stream))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}
