//! A configured profile: one store, queue, engine and trigger.
//!
//! Profiles are the long-running components of `tally run`; each one is
//! driven by its trigger until shutdown.

use snafu::prelude::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tally_common::Component;

use crate::config::{ProfileConfig, ProfileKey};
use crate::delivery::{DeliveryEngine, DeliveryPolicy, HttpSubmitter, Submitter};
use crate::error::{BuildSubmitterSnafu, OpenStoreSnafu, ProfileError};
use crate::queue::ResultQueue;
use crate::status::StatusTracker;
use crate::store::RecordStore;
use crate::trigger::SyncTrigger;

pub struct Profile {
    key: ProfileKey,
    trigger: SyncTrigger,
}

impl Profile {
    /// Open a profile that delivers over HTTP.
    pub async fn open(key: ProfileKey, config: &ProfileConfig) -> Result<Self, ProfileError> {
        let submitter = HttpSubmitter::new(&config.endpoint).context(BuildSubmitterSnafu {
            profile: key.id(),
        })?;
        Self::open_with_submitter(key, config, Arc::new(submitter)).await
    }

    /// Open a profile that delivers through `submitter`.
    pub async fn open_with_submitter(
        key: ProfileKey,
        config: &ProfileConfig,
        submitter: Arc<dyn Submitter>,
    ) -> Result<Self, ProfileError> {
        let store = RecordStore::open(&config.store.path, key.clone())
            .await
            .context(OpenStoreSnafu { profile: key.id() })?
            .with_dead_letter_limit(config.delivery.dead_letter_limit);

        info!(
            target = %key,
            store = store.url(),
            endpoint = %config.endpoint.url,
            "Opened profile"
        );

        let queue = ResultQueue::new(store.clone(), StatusTracker::new(store));
        let engine =
            DeliveryEngine::open(queue, submitter, DeliveryPolicy::from(&config.delivery)).await;

        Ok(Self {
            key,
            trigger: SyncTrigger::new(Arc::new(engine), &config.trigger),
        })
    }

    /// Add up to `secs` of random delay to each periodic drain.
    pub fn with_poll_jitter(mut self, secs: u64) -> Self {
        self.trigger = self.trigger.with_poll_jitter(secs);
        self
    }

    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        self.trigger.engine()
    }

    pub fn trigger(&self) -> &SyncTrigger {
        &self.trigger
    }
}

impl Component for Profile {
    type Key = ProfileKey;
    type Error = ProfileError;

    fn key(&self) -> &ProfileKey {
        &self.key
    }

    async fn run(self, shutdown: CancellationToken) -> Result<(), ProfileError> {
        self.trigger.run(shutdown).await;
        Ok(())
    }
}
