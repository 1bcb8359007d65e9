//! Per-record cancellation signals.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use uuid::Uuid;

/// Registry mapping in-flight record ids to cancellation flags.
#[derive(Default)]
pub struct CancelRegistry {
    inner: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record as in flight; the receiver flips to `true` on
    /// cancellation.
    pub fn register(&self, id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        rx
    }

    /// Signal cancellation; returns false when the record is not in flight.
    pub fn cancel(&self, id: Uuid) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get(&id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Drop the registration once processing finished.
    pub fn remove(&self, id: Uuid) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
