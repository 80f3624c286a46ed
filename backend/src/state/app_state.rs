//! Shared application state
//!
//! One value cloned into every handler. The stop handler and the stream
//! bridge see the same cancellation registry; the bridge and the reasoning
//! endpoint see the same reasoning hub.

use crate::chat::{CancellationRegistry, ChatDb, ReasoningHub, StreamBridge};
use crate::config::Config;
use crate::provider::ProviderRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Handles shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Dialog and account storage
    pub db: Arc<ChatDb>,
    /// Selectable models
    pub providers: Arc<ProviderRegistry>,
    /// Starts and stops answer streams
    pub bridge: Arc<StreamBridge>,
    /// Stop flags of active streams
    pub cancellations: Arc<CancellationRegistry>,
    /// Reasoning side-channels of active streams
    pub reasoning: Arc<ReasoningHub>,
    /// Loaded configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the state together around an opened database
    pub fn new(config: Config, db: ChatDb, providers: ProviderRegistry) -> Self {
        let db = Arc::new(db);
        let cancellations = Arc::new(CancellationRegistry::new());
        let reasoning = Arc::new(ReasoningHub::new());
        let bridge = Arc::new(StreamBridge::new(
            cancellations.clone(),
            reasoning.clone(),
            db.clone(),
            config.streaming.handoff_capacity,
        ));

        Self {
            db,
            providers: Arc::new(providers),
            bridge,
            cancellations,
            reasoning,
            config: Arc::new(config),
        }
    }

    /// Directory uploaded images are stored under
    pub fn uploads_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.persistence.uploads_dir)
    }
}
