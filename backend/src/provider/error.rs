//! Provider-specific error types
//!
//! Errors raised while talking to an upstream LLM endpoint (transport failures,
//! non-success status codes, malformed stream chunks).

use thiserror::Error;

/// Errors that can occur while streaming a completion from a provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP request could not be sent or the connection broke
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status code
    #[error("Provider returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// A stream chunk could not be understood
    #[error("Malformed stream chunk: {0}")]
    Protocol(String),

    /// Reading the response stream failed midway
    #[error("Stream read error: {0}")]
    Io(#[from] std::io::Error),
}
