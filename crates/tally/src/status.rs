//! Status tracker.
//!
//! Merges partial updates into the persisted `SyncStatus`. The pending
//! count is never taken from the merged value: it is recounted from the
//! live queue on every read and write, so a crash between a queue
//! mutation and a status save cannot leave a stale count visible.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::emit;
use crate::metrics::events::PendingResults;
use crate::record::SyncStatus;
use crate::store::RecordStore;

/// A partial status change. Unset fields keep their persisted value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    is_syncing: Option<bool>,
    last_sync_attempt_at: Option<Option<DateTime<Utc>>>,
    last_error: Option<Option<String>>,
}

impl StatusUpdate {
    /// An update that only recounts pending records.
    pub fn recount() -> Self {
        Self::default()
    }

    pub fn syncing(mut self, is_syncing: bool) -> Self {
        self.is_syncing = Some(is_syncing);
        self
    }

    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_sync_attempt_at = Some(Some(at));
        self
    }

    /// Set (`Some`) or clear (`None`) the last error.
    pub fn error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    fn apply(self, status: &mut SyncStatus) {
        if let Some(is_syncing) = self.is_syncing {
            status.is_syncing = is_syncing;
        }
        if let Some(at) = self.last_sync_attempt_at {
            status.last_sync_attempt_at = at;
        }
        if let Some(error) = self.last_error {
            status.last_error = error;
        }
    }
}

/// Reads and writes a profile's `SyncStatus`.
///
/// Clones share one lock, so the queue and the engine can both update the
/// status without losing each other's fields.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    store: RecordStore,
    lock: Arc<Mutex<()>>,
}

impl StatusTracker {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The persisted status with a live pending count.
    pub async fn current(&self) -> SyncStatus {
        let mut status = self.store.load_status().await;
        status.pending_count = self.store.load().await.len();
        status
    }

    /// Merge `update`, recount pending records and persist.
    ///
    /// A failed save is logged; the returned status is still the merged
    /// view callers should render.
    pub async fn update(&self, update: StatusUpdate) -> SyncStatus {
        let _guard = self.lock.lock().await;

        let mut status = self.store.load_status().await;
        update.apply(&mut status);
        status.pending_count = self.store.load().await.len();

        if let Err(e) = self.store.save_status(&status).await {
            warn!(target = %self.store.profile(), error = %e, "Failed to save sync status");
        }

        emit!(PendingResults {
            profile: self.store.profile().to_string(),
            count: status.pending_count,
        });

        status
    }

    /// Clear an `is_syncing` flag persisted by a process that died mid-drain.
    ///
    /// Returns true if a stale flag was found.
    pub async fn clear_stale_syncing(&self) -> bool {
        if !self.store.load_status().await.is_syncing {
            return false;
        }
        warn!(
            target = %self.store.profile(),
            "Clearing stale syncing flag left by an interrupted drain"
        );
        self.update(StatusUpdate::recount().syncing(false)).await;
        true
    }
}
