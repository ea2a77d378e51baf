//! Key/value storage abstraction.
//!
//! Wraps an `object_store` backend (local filesystem or in-memory) behind a
//! small API of whole-object reads and writes. Every request is counted and
//! timed through the metrics events.

mod url_parser;

pub use url_parser::BackendConfig;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::emit;
use crate::error::{IoSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL or path.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::Local(config) => Self::construct_local(config).await,
            BackendConfig::Memory { label } => Ok(Self::in_memory(label)),
        }
    }

    /// Create a fresh, empty in-memory provider.
    pub fn in_memory(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            canonical_url: format!("memory://{label}"),
            object_store: Arc::new(InMemory::new()),
        }
    }

    async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.path)
            .await
            .context(IoSnafu)?;

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?);

        Ok(Self {
            canonical_url: format!("file://{}", config.path),
            object_store,
        })
    }

    /// Canonical URL of the storage root, for logging.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = match self.object_store.get(path).await {
            Ok(found) => found.bytes().await,
            Err(e) => Err(e),
        };
        record(StorageOperation::Get, &result, start);
        result.context(ObjectStoreSnafu)
    }

    /// Write an object, replacing any existing content.
    pub async fn put(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self
            .object_store
            .put(path, PutPayload::from(Bytes::from(content)))
            .await;
        record(StorageOperation::Put, &result, start);
        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Atomically write content to a path using temp file + rename.
    ///
    /// 1. Write to `{path}.tmp`
    /// 2. Rename `{path}.tmp` to `{path}`
    ///
    /// If either step fails the previous content of `path` is unchanged.
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_path = Path::from(format!("{path}.tmp"));
        self.put(&temp_path, content).await?;
        self.rename(&temp_path, path).await
    }

    /// Rename (move) an object, replacing the destination.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let start = Instant::now();
        let result = self.object_store.rename(from, to).await;
        record(StorageOperation::Rename, &result, start);
        result.context(ObjectStoreSnafu)
    }
}

fn record<T>(operation: StorageOperation, result: &Result<T, object_store::Error>, start: Instant) {
    emit!(StorageRequest {
        operation,
        status: RequestStatus::of(result),
    });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}
