//! Reasoning side-channel
//!
//! A registry of subscribable reasoning streams keyed by dialog id. The bridge
//! worker publishes reasoning deltas as they arrive; clients follow them through
//! `GET /reasoning/stream/:dialog_id`. A channel exists only while its dialog
//! streams and is torn down when the stream ends.

use async_stream::stream;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Buffered reasoning events per dialog before slow subscribers start lagging
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// One item of a reasoning stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningEvent {
    /// A reasoning delta
    Chunk(String),
    /// The main stream has ended
    Complete,
}

/// Registry of per-dialog reasoning broadcasts
pub struct ReasoningHub {
    channels: Mutex<HashMap<i64, broadcast::Sender<ReasoningEvent>>>,
    capacity: usize,
}

impl Default for ReasoningHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty hub whose channels buffer `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Create the channel for a dialog whose stream is starting
    ///
    /// Subscribers that connect before the first reasoning delta see every delta.
    pub fn open(&self, dialog_id: i64) {
        let mut channels = self.lock();
        channels
            .entry(dialog_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        debug!(dialog_id, "Opened reasoning channel");
    }

    /// Publish a reasoning delta, creating the channel on first use
    ///
    /// Safe to call from a blocking worker thread.
    pub fn publish(&self, dialog_id: i64, chunk: &str) {
        let mut channels = self.lock();
        let sender = channels
            .entry(dialog_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        // No subscribers is fine: nobody is watching the reasoning
        let _ = sender.send(ReasoningEvent::Chunk(chunk.to_string()));
    }

    /// Signal completion to subscribers and tear the channel down
    pub fn complete(&self, dialog_id: i64) {
        if let Some(sender) = self.lock().remove(&dialog_id) {
            let _ = sender.send(ReasoningEvent::Complete);
            debug!(dialog_id, "Closed reasoning channel");
        }
    }

    /// Whether a channel exists for the dialog
    pub fn is_open(&self, dialog_id: i64) -> bool {
        self.lock().contains_key(&dialog_id)
    }

    /// Follow the reasoning of a dialog
    ///
    /// Yields chunks until the stream ends, then exactly one
    /// [`ReasoningEvent::Complete`]. Without an active channel the stream
    /// completes immediately.
    pub fn subscribe(&self, dialog_id: i64) -> impl Stream<Item = ReasoningEvent> + Send + 'static {
        let receiver = self.lock().get(&dialog_id).map(|sender| sender.subscribe());

        stream! {
            if let Some(mut rx) = receiver {
                loop {
                    match rx.recv().await {
                        Ok(ReasoningEvent::Chunk(chunk)) => yield ReasoningEvent::Chunk(chunk),
                        Ok(ReasoningEvent::Complete) | Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(dialog_id, skipped, "Reasoning subscriber lagged behind");
                        }
                    }
                }
            }
            yield ReasoningEvent::Complete;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, broadcast::Sender<ReasoningEvent>>> {
        self.channels.lock().unwrap_or_else(|poisoned| {
            warn!("Reasoning hub lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_subscribe_without_stream_completes_immediately() {
        let hub = ReasoningHub::new();
        let events: Vec<ReasoningEvent> = hub.subscribe(5).collect().await;
        assert_eq!(events, vec![ReasoningEvent::Complete]);
        assert!(!hub.is_open(5));
    }

    #[tokio::test]
    async fn test_subscriber_sees_chunks_then_complete() {
        let hub = ReasoningHub::new();
        hub.open(1);
        let subscription = hub.subscribe(1);

        hub.publish(1, "first");
        hub.publish(1, "second");
        hub.complete(1);

        let events: Vec<ReasoningEvent> = subscription.collect().await;
        assert_eq!(
            events,
            vec![
                ReasoningEvent::Chunk("first".to_string()),
                ReasoningEvent::Chunk("second".to_string()),
                ReasoningEvent::Complete,
            ]
        );
        assert!(!hub.is_open(1));
    }

    #[tokio::test]
    async fn test_publish_creates_channel() {
        let hub = ReasoningHub::new();
        hub.publish(3, "orphan");
        assert!(hub.is_open(3));
        hub.complete(3);
        assert!(!hub.is_open(3));
    }

    #[tokio::test]
    async fn test_channels_are_per_dialog() {
        let hub = ReasoningHub::new();
        hub.open(1);
        hub.open(2);
        let subscription = hub.subscribe(1);

        hub.publish(2, "other");
        hub.publish(1, "mine");
        hub.complete(1);

        let events: Vec<ReasoningEvent> = subscription.collect().await;
        assert_eq!(
            events,
            vec![ReasoningEvent::Chunk("mine".to_string()), ReasoningEvent::Complete]
        );
        assert!(hub.is_open(2));
    }
}
