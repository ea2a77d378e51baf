//! Durable record store.
//!
//! Persists a profile's pending results, its sync status summary and its
//! dead-letter list as JSON entries under the store root:
//!
//! - `{profile}/pending_results.json` - array of `PendingResult`, oldest first
//! - `{profile}/sync_status.json` - the cached `SyncStatus`
//! - `{profile}/evicted_results.json` - array of `EvictedResult`, newest last
//!
//! # Corruption tolerance
//!
//! Loads never fail. A missing entry, an unreadable backend or malformed
//! JSON all load as empty state with a log line; a bad file must not keep
//! the host from starting.
//!
//! # Atomic Writes
//!
//! Saves go through `StorageProvider::atomic_write`, so a crash mid-save
//! leaves the previous entry intact.

use object_store::path::Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, warn};

use tally_common::storage::{StorageProvider, StorageProviderRef};

use crate::config::ProfileKey;
use crate::error::{OpenSnafu, SerializeSnafu, StoreError, WriteSnafu};
use crate::record::{EvictedResult, PendingResult, SyncStatus};

/// Entry holding the pending-result queue.
pub const PENDING_ENTRY: &str = "pending_results.json";

/// Entry holding the sync status summary.
pub const STATUS_ENTRY: &str = "sync_status.json";

/// Entry holding records dropped at the retry ceiling.
pub const EVICTED_ENTRY: &str = "evicted_results.json";

/// Default number of dead-letter entries kept per profile.
pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;

/// Per-profile handle to the durable entries.
///
/// Cloning is cheap; clones share the underlying storage provider.
#[derive(Debug, Clone)]
pub struct RecordStore {
    storage: StorageProviderRef,
    profile: ProfileKey,
    dead_letter_limit: usize,
}

impl RecordStore {
    /// Create a store for `profile` on an existing storage provider.
    pub fn new(storage: StorageProviderRef, profile: ProfileKey) -> Self {
        Self {
            storage,
            profile,
            dead_letter_limit: DEFAULT_DEAD_LETTER_LIMIT,
        }
    }

    /// Open the storage at `url` (a local path, `file://` URL or
    /// `memory://label`) and scope it to `profile`.
    pub async fn open(url: &str, profile: ProfileKey) -> Result<Self, StoreError> {
        let storage = StorageProvider::for_url(url)
            .await
            .context(OpenSnafu { url })?;
        Ok(Self::new(Arc::new(storage), profile))
    }

    /// A store on a fresh in-memory backend.
    pub fn in_memory(profile: ProfileKey) -> Self {
        let storage = StorageProvider::in_memory(profile.path_segment());
        Self::new(Arc::new(storage), profile)
    }

    /// Set how many evicted records are retained.
    pub fn with_dead_letter_limit(mut self, limit: usize) -> Self {
        self.dead_letter_limit = limit;
        self
    }

    pub fn profile(&self) -> &ProfileKey {
        &self.profile
    }

    /// Canonical URL of the backing storage, for logging.
    pub fn url(&self) -> &str {
        self.storage.url()
    }

    /// Load the pending-result queue. Empty on any failure.
    pub async fn load(&self) -> Vec<PendingResult> {
        self.read_entry(PENDING_ENTRY).await.unwrap_or_default()
    }

    /// Replace the pending-result queue.
    pub async fn save(&self, records: &[PendingResult]) -> Result<(), StoreError> {
        self.write_entry(PENDING_ENTRY, records).await?;
        debug!(target = %self.profile, pending = records.len(), "Saved pending results");
        Ok(())
    }

    /// Load the cached status summary. Default on any failure.
    pub async fn load_status(&self) -> SyncStatus {
        self.read_entry(STATUS_ENTRY).await.unwrap_or_default()
    }

    pub async fn save_status(&self, status: &SyncStatus) -> Result<(), StoreError> {
        self.write_entry(STATUS_ENTRY, status).await
    }

    /// Load the dead-letter list. Empty on any failure.
    pub async fn load_evicted(&self) -> Vec<EvictedResult> {
        self.read_entry(EVICTED_ENTRY).await.unwrap_or_default()
    }

    /// Append an evicted record, dropping the oldest entries beyond the limit.
    pub async fn record_evicted(&self, entry: EvictedResult) -> Result<(), StoreError> {
        let mut evicted = self.load_evicted().await;
        evicted.push(entry);
        if evicted.len() > self.dead_letter_limit {
            let excess = evicted.len() - self.dead_letter_limit;
            evicted.drain(..excess);
        }
        self.write_entry(EVICTED_ENTRY, &evicted).await
    }

    fn entry_path(&self, entry: &str) -> Path {
        let segment = self.profile.path_segment();
        Path::from(format!("{segment}/{entry}"))
    }

    async fn read_entry<T: DeserializeOwned>(&self, entry: &'static str) -> Option<T> {
        let path = self.entry_path(entry);

        match self.storage.get(&path).await {
            Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(
                        target = %self.profile,
                        entry,
                        error = %e,
                        "Failed to parse stored entry, treating as empty"
                    );
                    None
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(target = %self.profile, entry, "No stored entry, starting empty");
                None
            }
            Err(e) => {
                warn!(
                    target = %self.profile,
                    entry,
                    error = %e,
                    "Failed to read stored entry, treating as empty"
                );
                None
            }
        }
    }

    async fn write_entry<T: Serialize + ?Sized>(
        &self,
        entry: &'static str,
        value: &T,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).context(SerializeSnafu { entry })?;
        let path = self.entry_path(entry);
        self.storage
            .atomic_write(&path, json)
            .await
            .context(WriteSnafu { entry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ResultPayload;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(score: i64) -> PendingResult {
        PendingResult::new(ResultPayload::default().with_field("score", score))
    }

    async fn local_store(dir: &TempDir) -> RecordStore {
        RecordStore::open(dir.path().to_str().unwrap(), ProfileKey::new("classroom"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_loads_defaults() {
        let store = RecordStore::in_memory(ProfileKey::new("classroom"));
        assert!(store.load().await.is_empty());
        assert_eq!(store.load_status().await, SyncStatus::default());
        assert!(store.load_evicted().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_preserves_order() {
        let store = RecordStore::in_memory(ProfileKey::new("classroom"));
        let records = vec![record(1), record(2), record(3)];
        store.save(&records).await.unwrap();

        assert_eq!(store.load().await, records);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let records = vec![record(1), record(2)];
        let status = SyncStatus {
            pending_count: 2,
            last_error: Some("offline".to_string()),
            ..Default::default()
        };

        {
            let store = local_store(&dir).await;
            store.save(&records).await.unwrap();
            store.save_status(&status).await.unwrap();
        }

        let store = local_store(&dir).await;
        assert_eq!(store.load().await, records);
        assert_eq!(store.load_status().await, status);
        assert!(dir.path().join("classroom").join(PENDING_ENTRY).exists());
        assert!(!dir.path().join("classroom").join("pending_results.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_entries_load_as_empty() {
        let dir = TempDir::new().unwrap();
        let profile_dir = dir.path().join("classroom");
        std::fs::create_dir_all(&profile_dir).unwrap();
        std::fs::write(profile_dir.join(PENDING_ENTRY), "{not json").unwrap();
        std::fs::write(profile_dir.join(STATUS_ENTRY), "[1, 2]").unwrap();
        std::fs::write(profile_dir.join(EVICTED_ENTRY), "null").unwrap();

        let store = local_store(&dir).await;
        assert!(store.load().await.is_empty());
        assert_eq!(store.load_status().await, SyncStatus::default());
        assert!(store.load_evicted().await.is_empty());

        // A corrupt entry is overwritten by the next save
        store.save(&[record(9)]).await.unwrap();
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_profiles_are_isolated() {
        let dir = TempDir::new().unwrap();
        let url = dir.path().to_str().unwrap();
        let first = RecordStore::open(url, ProfileKey::new("first")).await.unwrap();
        let second = RecordStore::open(url, ProfileKey::new("second")).await.unwrap();

        first.save(&[record(1)]).await.unwrap();
        assert_eq!(first.load().await.len(), 1);
        assert!(second.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_evicted_keeps_newest() {
        let store = RecordStore::in_memory(ProfileKey::new("classroom")).with_dead_letter_limit(2);
        for score in 0..3 {
            store
                .record_evicted(EvictedResult {
                    record: record(score),
                    evicted_at: Utc::now(),
                    last_error: Some(format!("failure {score}")),
                })
                .await
                .unwrap();
        }

        let evicted = store.load_evicted().await;
        let errors: Vec<_> = evicted
            .iter()
            .map(|e| e.last_error.as_deref().unwrap())
            .collect();
        assert_eq!(errors, vec!["failure 1", "failure 2"]);
    }

    #[tokio::test]
    async fn test_open_rejects_empty_url() {
        let err = RecordStore::open("", ProfileKey::new("classroom"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Open { .. }));
    }
}
