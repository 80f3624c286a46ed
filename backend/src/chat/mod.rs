//! Chat module
//!
//! Dialog storage plus the machinery that streams one exchange: the stop-flag
//! registry, the reasoning side-channel and the blocking-to-async bridge.

pub mod cancellation;
pub mod db;
pub mod models;
pub mod persistence;
pub mod reasoning_hub;
pub mod stream_bridge;

pub use cancellation::{AlreadyActive, CancellationFlag, CancellationRegistry};
pub use db::ChatDb;
pub use models::{ChatRecord, Dialog, ExchangeRecord, MessageRole, User};
pub use persistence::PersistenceSink;
pub use reasoning_hub::{ReasoningEvent, ReasoningHub};
pub use stream_bridge::{
    BridgeEvent, BridgeStream, ConversationContext, StreamBridge, StreamOutcome, StreamRequest,
    TerminalState,
};
