//! Stream bridge
//!
//! Runs a blocking provider call on a dedicated worker thread and hands its
//! deltas to the async side through a bounded channel. The worker owns the
//! accumulated answer and reasoning, polls the dialog's stop flag between
//! deltas, publishes reasoning to the side-channel and always ends with a
//! terminal [`BridgeEvent::Finished`]. The consumer side persists the exchange
//! exactly once, whether the stream completed, was stopped, failed, or the
//! client went away.

use crate::chat::cancellation::{AlreadyActive, CancellationFlag, CancellationRegistry};
use crate::chat::models::ExchangeRecord;
use crate::chat::persistence::PersistenceSink;
use crate::chat::reasoning_hub::ReasoningHub;
use crate::provider::{ChatMessage, ChatProvider, Delta, DeltaStream};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalState {
    /// The provider exhausted its stream
    Completed,
    /// The stop flag was observed, or the consumer went away
    Cancelled,
    /// The provider raised an error
    Failed,
}

/// Final result of a stream, carried by the terminal sentinel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// How the stream ended
    pub state: TerminalState,
    /// Concatenation of every answer delta accepted before the end
    pub answer: String,
    /// Concatenation of every reasoning delta accepted before the end
    pub reasoning: String,
    /// Provider error message for [`TerminalState::Failed`]
    pub error: Option<String>,
}

impl StreamOutcome {
    fn worker_lost() -> Self {
        Self {
            state: TerminalState::Failed,
            answer: String::new(),
            reasoning: String::new(),
            error: Some("Stream worker stopped without a result".to_string()),
        }
    }
}

/// Item passed from the worker to the consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// One provider delta, possibly empty
    Delta(Delta),
    /// Terminal sentinel; nothing follows it
    Finished(StreamOutcome),
}

/// Identity of the exchange being streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    /// Dialog the question belongs to
    pub dialog_id: i64,
    /// Owner of the dialog
    pub user_id: i64,
    /// Model selector the client asked for
    pub model: String,
}

/// Everything needed to start one stream
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Who is asking, and in which dialog
    pub context: ConversationContext,
    /// Provider input: system prompt, prior turns, then the question
    pub messages: Vec<ChatMessage>,
    /// The question as it will be stored
    pub question: String,
    /// Relative path of an uploaded image attached to the question
    pub media_ref: Option<String>,
}

#[derive(Debug, Default)]
struct Accumulator {
    answer: String,
    reasoning: String,
}

impl Accumulator {
    fn push(&mut self, delta: &Delta) {
        self.answer.push_str(&delta.answer);
        self.reasoning.push_str(&delta.reasoning);
    }

    fn finish(self, state: TerminalState, error: Option<String>) -> StreamOutcome {
        StreamOutcome {
            state,
            answer: self.answer,
            reasoning: self.reasoning,
            error,
        }
    }
}

/// Starts streams and wires them to cancellation, reasoning and persistence
pub struct StreamBridge {
    cancellations: Arc<CancellationRegistry>,
    reasoning: Arc<ReasoningHub>,
    sink: Arc<dyn PersistenceSink>,
    handoff_capacity: usize,
}

impl StreamBridge {
    /// Create a bridge
    ///
    /// # Arguments
    /// * `handoff_capacity` - Deltas buffered between worker and consumer
    pub fn new(
        cancellations: Arc<CancellationRegistry>,
        reasoning: Arc<ReasoningHub>,
        sink: Arc<dyn PersistenceSink>,
        handoff_capacity: usize,
    ) -> Self {
        Self {
            cancellations,
            reasoning,
            sink,
            handoff_capacity: handoff_capacity.max(1),
        }
    }

    /// Latch the stop flag of a dialog's active stream
    ///
    /// Returns whether a stream was active. Stopping an idle dialog is a no-op.
    pub fn stop(&self, dialog_id: i64) -> bool {
        let found = self.cancellations.set_flag(dialog_id);
        info!(dialog_id, active = found, "Stop requested");
        found
    }

    /// Start streaming a completion
    ///
    /// Registers a fresh stop flag, opens the reasoning channel and spawns the
    /// worker. Must be called from within a tokio runtime.
    ///
    /// # Returns
    /// * `Err(AlreadyActive)` if the dialog is already streaming
    pub fn start(
        &self,
        request: StreamRequest,
        provider: Arc<dyn ChatProvider>,
    ) -> Result<BridgeStream, AlreadyActive> {
        let StreamRequest {
            context,
            messages,
            question,
            media_ref,
        } = request;
        let dialog_id = context.dialog_id;

        let flag = self.cancellations.register(dialog_id)?;
        self.reasoning.open(dialog_id);

        let (tx, rx) = mpsc::channel(self.handoff_capacity);
        let worker = Worker {
            dialog_id,
            flag: flag.clone(),
            reasoning: self.reasoning.clone(),
            tx,
        };

        info!(
            dialog_id,
            user_id = context.user_id,
            model = %context.model,
            history_len = messages.len(),
            "Starting stream"
        );

        tokio::task::spawn_blocking(move || worker.run(provider, messages));

        Ok(BridgeStream {
            dialog_id,
            inner: Some((
                rx,
                Finalizer {
                    context,
                    question,
                    media_ref,
                    flag,
                    cancellations: self.cancellations.clone(),
                    reasoning: self.reasoning.clone(),
                    sink: self.sink.clone(),
                },
            )),
        })
    }
}

/// Blocking half of a stream; lives on a `spawn_blocking` thread
struct Worker {
    dialog_id: i64,
    flag: CancellationFlag,
    reasoning: Arc<ReasoningHub>,
    tx: mpsc::Sender<BridgeEvent>,
}

impl Worker {
    fn run(self, provider: Arc<dyn ChatProvider>, messages: Vec<ChatMessage>) {
        let mut acc = Accumulator::default();

        let pumped = panic::catch_unwind(AssertUnwindSafe(|| {
            match provider.stream_chat(&messages) {
                Ok(deltas) => self.pump(deltas, &mut acc),
                Err(e) => (TerminalState::Failed, Some(e.to_string())),
            }
        }));
        let (state, error) = pumped.unwrap_or_else(|_| {
            (
                TerminalState::Failed,
                Some("Provider panicked while streaming".to_string()),
            )
        });

        match &error {
            Some(message) => {
                error!(dialog_id = self.dialog_id, error = %message, "Provider stream failed")
            }
            None => debug!(dialog_id = self.dialog_id, ?state, "Provider stream ended"),
        }

        let outcome = acc.finish(state, error);
        if self.tx.blocking_send(BridgeEvent::Finished(outcome)).is_err() {
            warn!(dialog_id = self.dialog_id, "Consumer dropped before the terminal event");
        }
    }

    /// Pull deltas until the provider ends, errors or a stop is observed
    ///
    /// The stop flag is checked after each pull and before the delta is
    /// accepted, so a delta pulled after the stop is discarded.
    fn pump(&self, deltas: DeltaStream, acc: &mut Accumulator) -> (TerminalState, Option<String>) {
        for item in deltas {
            if self.flag.is_set() {
                info!(dialog_id = self.dialog_id, "Stop flag observed");
                return (TerminalState::Cancelled, None);
            }

            let delta = match item {
                Ok(delta) => delta,
                Err(e) => return (TerminalState::Failed, Some(e.to_string())),
            };

            acc.push(&delta);
            if !delta.reasoning.is_empty() {
                self.reasoning.publish(self.dialog_id, &delta.reasoning);
            }

            if self.tx.blocking_send(BridgeEvent::Delta(delta)).is_err() {
                debug!(dialog_id = self.dialog_id, "Consumer gone, stopping");
                return (TerminalState::Cancelled, None);
            }
        }
        (TerminalState::Completed, None)
    }
}

/// Async half of a stream
///
/// Yields every delta in order, then one [`BridgeEvent::Finished`]. The
/// exchange is persisted before `Finished` is returned. Dropping the stream
/// early latches the stop flag and leaves persistence to a background drain.
pub struct BridgeStream {
    dialog_id: i64,
    inner: Option<(mpsc::Receiver<BridgeEvent>, Finalizer)>,
}

impl BridgeStream {
    /// Dialog this stream belongs to
    pub fn dialog_id(&self) -> i64 {
        self.dialog_id
    }

    /// Receive the next event; `None` after `Finished` has been returned
    pub async fn next(&mut self) -> Option<BridgeEvent> {
        let (rx, _) = self.inner.as_mut()?;
        let outcome = match rx.recv().await {
            Some(BridgeEvent::Delta(delta)) => return Some(BridgeEvent::Delta(delta)),
            Some(BridgeEvent::Finished(outcome)) => outcome,
            None => {
                error!(dialog_id = self.dialog_id, "Stream worker vanished");
                StreamOutcome::worker_lost()
            }
        };

        let (_, finalizer) = self.inner.take()?;
        // Runs to completion even if this future is dropped mid-await
        let finishing = tokio::spawn(finalizer.finish(outcome.clone()));
        if let Err(e) = finishing.await {
            error!(dialog_id = self.dialog_id, error = %e, "Finalizer task failed");
        }
        Some(BridgeEvent::Finished(outcome))
    }
}

impl Drop for BridgeStream {
    fn drop(&mut self) {
        let Some((rx, finalizer)) = self.inner.take() else {
            return;
        };
        finalizer.flag.set();
        info!(dialog_id = self.dialog_id, "Stream dropped early, draining in background");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(drain(rx, finalizer));
            }
            Err(_) => error!(
                dialog_id = self.dialog_id,
                "No runtime to drain dropped stream, exchange not persisted"
            ),
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<BridgeEvent>, finalizer: Finalizer) {
    let outcome = loop {
        match rx.recv().await {
            Some(BridgeEvent::Delta(_)) => continue,
            Some(BridgeEvent::Finished(outcome)) => break outcome,
            None => break StreamOutcome::worker_lost(),
        }
    };
    finalizer.finish(outcome).await;
}

/// One-shot cleanup that runs after the terminal sentinel
struct Finalizer {
    context: ConversationContext,
    question: String,
    media_ref: Option<String>,
    flag: CancellationFlag,
    cancellations: Arc<CancellationRegistry>,
    reasoning: Arc<ReasoningHub>,
    sink: Arc<dyn PersistenceSink>,
}

impl Finalizer {
    async fn finish(self, outcome: StreamOutcome) {
        let dialog_id = self.context.dialog_id;
        self.reasoning.complete(dialog_id);

        let exchange = ExchangeRecord {
            dialog_id,
            user_id: self.context.user_id,
            question: self.question,
            answer: outcome.answer,
            reasoning: outcome.reasoning,
            media_ref: self.media_ref,
        };
        let answer_len = exchange.answer.len();

        match self.sink.persist(exchange).await {
            Ok(()) => info!(
                dialog_id,
                state = ?outcome.state,
                answer_len,
                "Exchange persisted"
            ),
            Err(e) => error!(
                dialog_id,
                state = ?outcome.state,
                error = %e,
                "Failed to persist exchange"
            ),
        }

        self.cancellations.clear(dialog_id, &self.flag);
    }
}
