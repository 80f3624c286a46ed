//! LLM provider module
//!
//! Normalizes the supported upstream LLM endpoints behind a single blocking
//! call that yields `(answer, reasoning)` deltas until the upstream stream ends.

pub mod error;
pub mod models;
pub mod openai;
pub mod registry;

pub use error::ProviderError;
pub use models::{ChatMessage, ChatRole, Delta, MessageContent};
pub use openai::OpenAiCompatibleProvider;
pub use registry::{ModelSpec, ProviderRegistry, ResolvedModel};

/// Sequence of deltas produced by one provider call
///
/// Iterating is blocking: every `next()` may wait on the network. The sequence
/// ends with `None` when the upstream stream is exhausted; an `Err` item means
/// the stream broke and no further items should be pulled.
pub type DeltaStream = Box<dyn Iterator<Item = Result<Delta, ProviderError>> + Send>;

/// A network-backed LLM that streams a completion for a message history
///
/// Implementations are blocking and must only be driven from a dedicated
/// worker thread, never from the async runtime.
pub trait ChatProvider: Send + Sync {
    /// Start a streaming completion for `messages`
    ///
    /// # Returns
    /// * `Ok(DeltaStream)` - Iterator over incremental deltas
    /// * `Err(ProviderError)` - The request could not be started
    fn stream_chat(&self, messages: &[ChatMessage]) -> Result<DeltaStream, ProviderError>;
}
