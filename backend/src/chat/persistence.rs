//! Persistence sink
//!
//! Where the stream bridge hands a finished exchange for durable storage.

use crate::chat::db::ChatDb;
use crate::chat::models::ExchangeRecord;
use crate::error::AppError;
use async_trait::async_trait;

/// Durable storage for finished exchanges
///
/// The bridge calls `persist` exactly once per stream, after the terminal
/// sentinel. Failures are reported back but never retried.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store the user turn and the assistant turn of one exchange
    async fn persist(&self, exchange: ExchangeRecord) -> Result<(), AppError>;
}

#[async_trait]
impl PersistenceSink for ChatDb {
    async fn persist(&self, exchange: ExchangeRecord) -> Result<(), AppError> {
        self.save_exchange(&exchange).await
    }
}
