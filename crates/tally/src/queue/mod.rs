//! Result queue.
//!
//! The primitive operations the delivery engine composes. Every mutation
//! is one read-modify-write of the pending entry, serialized by a mutex
//! shared between clones, followed by a status recount.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::emit;
use crate::error::StoreError;
use crate::metrics::events::{ResultEvicted, ResultQueued};
use crate::record::{EvictedResult, PendingResult, RecordId, ResultPayload};
use crate::status::{StatusTracker, StatusUpdate};
use crate::store::RecordStore;

/// Ordered set of pending submissions for one profile.
#[derive(Debug, Clone)]
pub struct ResultQueue {
    store: RecordStore,
    status: StatusTracker,
    lock: Arc<Mutex<()>>,
}

impl ResultQueue {
    pub fn new(store: RecordStore, status: StatusTracker) -> Self {
        Self {
            store,
            status,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    /// Append a payload, assigning its `clientResultId` if missing.
    ///
    /// Returns the local id of the new record.
    pub async fn enqueue(&self, payload: ResultPayload) -> Result<RecordId, StoreError> {
        let record = PendingResult::new(payload);
        let id = record.id.clone();

        {
            let _guard = self.lock.lock().await;
            let mut records = self.store.load().await;
            records.push(record);
            self.store.save(&records).await?;
        }

        info!(
            target = %self.store.profile(),
            id = %id,
            "Queued result for later delivery"
        );
        emit!(ResultQueued {
            profile: self.store.profile().to_string(),
        });
        self.status.update(StatusUpdate::recount()).await;

        Ok(id)
    }

    /// Remove a record. Unknown ids are a no-op and return false.
    pub async fn remove(&self, id: &RecordId) -> Result<bool, StoreError> {
        let removed = {
            let _guard = self.lock.lock().await;
            let mut records = self.store.load().await;
            let before = records.len();
            records.retain(|record| &record.id != id);
            let removed = records.len() != before;
            if removed {
                self.store.save(&records).await?;
            }
            removed
        };

        if removed {
            debug!(target = %self.store.profile(), id = %id, "Removed result from queue");
            self.status.update(StatusUpdate::recount()).await;
        }
        Ok(removed)
    }

    /// Count an attempt against a record before it is sent.
    ///
    /// Returns the updated record, or `None` if it is no longer queued.
    pub async fn record_attempt(&self, id: &RecordId) -> Result<Option<PendingResult>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.store.load().await;

        let Some(record) = records.iter_mut().find(|record| &record.id == id) else {
            return Ok(None);
        };
        record.mark_attempt(Utc::now());
        let updated = record.clone();

        self.store.save(&records).await?;
        Ok(Some(updated))
    }

    /// Remove a record that reached the retry ceiling and keep it in the
    /// dead-letter entry.
    pub async fn evict(
        &self,
        id: &RecordId,
        last_error: Option<String>,
    ) -> Result<Option<EvictedResult>, StoreError> {
        let evicted = {
            let _guard = self.lock.lock().await;
            let mut records = self.store.load().await;
            let Some(position) = records.iter().position(|record| &record.id == id) else {
                return Ok(None);
            };
            let record = records.remove(position);
            self.store.save(&records).await?;

            EvictedResult {
                record,
                evicted_at: Utc::now(),
                last_error,
            }
        };

        warn!(
            target = %self.store.profile(),
            id = %id,
            client_result_id = evicted.record.client_result_id(),
            attempts = evicted.record.attempts,
            error = evicted.last_error.as_deref().unwrap_or("unknown"),
            "Evicted result after reaching the retry ceiling"
        );
        emit!(ResultEvicted {
            profile: self.store.profile().to_string(),
        });

        if let Err(e) = self.store.record_evicted(evicted.clone()).await {
            warn!(
                target = %self.store.profile(),
                id = %id,
                error = %e,
                "Failed to write dead-letter entry"
            );
        }
        self.status.update(StatusUpdate::recount()).await;

        Ok(Some(evicted))
    }

    pub async fn has_pending(&self) -> bool {
        !self.store.load().await.is_empty()
    }

    /// Snapshot of the queue, oldest first.
    pub async fn pending(&self) -> Vec<PendingResult> {
        self.store.load().await
    }

    pub async fn len(&self) -> usize {
        self.store.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        !self.has_pending().await
    }
}
