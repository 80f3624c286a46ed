//! Cancellation registry
//!
//! Tracks one stop flag per dialog with an active stream. The stop endpoint
//! latches the flag, the bridge worker polls it between deltas.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Handle to the stop flag of one active stream
///
/// Cloning shares the same latch. Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Request a stop
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_as(&self, other: &CancellationFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Returned when a dialog already has an active stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyActive;

/// Process-wide map from dialog id to stop flag
///
/// Shared between the stop handler and the stream bridge. Unknown ids read as
/// "not cancelled".
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    flags: RwLock<HashMap<i64, CancellationFlag>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh, unset flag for a dialog that is about to stream
    ///
    /// # Returns
    /// * `Err(AlreadyActive)` if a stream for this dialog is still registered
    pub fn register(&self, dialog_id: i64) -> Result<CancellationFlag, AlreadyActive> {
        let mut flags = self.write();
        if flags.contains_key(&dialog_id) {
            return Err(AlreadyActive);
        }
        let flag = CancellationFlag::default();
        flags.insert(dialog_id, flag.clone());
        debug!(dialog_id, "Registered cancellation flag");
        Ok(flag)
    }

    /// Latch the stop flag of a dialog
    ///
    /// Idempotent. Returns whether an active stream was found; a stop for an
    /// idle dialog changes nothing.
    pub fn set_flag(&self, dialog_id: i64) -> bool {
        match self.read().get(&dialog_id) {
            Some(flag) => {
                flag.set();
                true
            }
            None => false,
        }
    }

    /// Whether a stop was requested for the dialog's active stream
    pub fn is_flag_set(&self, dialog_id: i64) -> bool {
        self.read()
            .get(&dialog_id)
            .map(CancellationFlag::is_set)
            .unwrap_or(false)
    }

    /// Remove the flag of a finished stream
    ///
    /// Only removes the entry if it is still `flag`, so a late cleanup never
    /// drops a newer stream's flag.
    pub fn clear(&self, dialog_id: i64, flag: &CancellationFlag) {
        let mut flags = self.write();
        if flags.get(&dialog_id).is_some_and(|current| current.same_as(flag)) {
            flags.remove(&dialog_id);
            debug!(dialog_id, "Cleared cancellation flag");
        }
    }

    /// Whether a stream is registered for the dialog
    pub fn is_active(&self, dialog_id: i64) -> bool {
        self.read().contains_key(&dialog_id)
    }

    /// Latch every registered flag (for graceful shutdown)
    pub fn set_all(&self) {
        let flags = self.read();
        for flag in flags.values() {
            flag.set();
        }
        debug!(count = flags.len(), "Latched all cancellation flags");
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<i64, CancellationFlag>> {
        self.flags.read().unwrap_or_else(|poisoned| {
            warn!("Cancellation registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<i64, CancellationFlag>> {
        self.flags.write().unwrap_or_else(|poisoned| {
            warn!("Cancellation registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
