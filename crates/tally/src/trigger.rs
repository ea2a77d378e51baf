//! Sync trigger: the host-side scheduling around a delivery engine.
//!
//! The engine is passive between drains. This type decides when to call
//! it: once shortly after startup if anything is pending, whenever the
//! user asks for a retry, and optionally on a fixed interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tally_common::random_jitter;

use crate::config::TriggerConfig;
use crate::delivery::{DeliveryEngine, DrainReport};
use crate::notice::{NoticeKind, SyncNotices};

pub struct SyncTrigger {
    engine: Arc<DeliveryEngine>,
    settle_delay: Duration,
    poll_interval: Option<Duration>,
    poll_jitter_secs: u64,
    notices: Mutex<SyncNotices>,
}

impl SyncTrigger {
    pub fn new(engine: Arc<DeliveryEngine>, config: &TriggerConfig) -> Self {
        Self {
            engine,
            settle_delay: config.settle_delay(),
            poll_interval: config.poll_interval(),
            poll_jitter_secs: 0,
            notices: Mutex::new(SyncNotices::default()),
        }
    }

    /// Add up to `secs` of random delay to each periodic wait.
    pub fn with_poll_jitter(mut self, secs: u64) -> Self {
        self.poll_jitter_secs = secs;
        self
    }

    pub fn engine(&self) -> &Arc<DeliveryEngine> {
        &self.engine
    }

    /// Startup drain: if results are pending, let the host settle, then
    /// drain once.
    ///
    /// Returns `None` when nothing was pending, shutdown arrived during the
    /// settle delay, or a drain was already running.
    pub async fn trigger_initial_sync(&self, shutdown: &CancellationToken) -> Option<DrainReport> {
        let profile = self.engine.profile();
        if !self.engine.queue().has_pending().await {
            debug!(target = %profile, "Nothing pending at startup");
            return None;
        }

        info!(
            target = %profile,
            settle_ms = self.settle_delay.as_millis() as u64,
            "Results pending at startup, draining after settle delay"
        );
        if !self.settle_delay.is_zero()
            && shutdown
                .run_until_cancelled(tokio::time::sleep(self.settle_delay))
                .await
                .is_none()
        {
            info!(target = %profile, "Shutdown requested during settle delay");
            return None;
        }

        if self.engine.is_syncing() {
            debug!(target = %profile, "Drain already in progress, skipping startup drain");
            return None;
        }
        self.drain_with_notices().await
    }

    /// User-initiated retry. Does nothing while a drain is running.
    pub async fn retry_sync(&self) -> Option<DrainReport> {
        if self.engine.is_syncing() {
            debug!(target = %self.engine.profile(), "Drain already in progress, ignoring retry");
            return None;
        }
        self.drain_with_notices().await
    }

    /// Startup drain, then periodic drains until `shutdown` when a poll
    /// interval is configured.
    ///
    /// An in-flight drain always runs to the end of its snapshot; shutdown
    /// only interrupts waits.
    pub async fn run(&self, shutdown: CancellationToken) {
        let profile = self.engine.profile();
        self.trigger_initial_sync(&shutdown).await;

        let Some(poll_interval) = self.poll_interval else {
            debug!(target = %profile, "No poll interval configured, waiting for shutdown");
            shutdown.cancelled().await;
            return;
        };

        loop {
            let sleep_duration = poll_interval + random_jitter(self.poll_jitter_secs);
            if shutdown
                .run_until_cancelled(tokio::time::sleep(sleep_duration))
                .await
                .is_none()
            {
                info!(target = %profile, "Shutdown requested during poll wait");
                break;
            }

            if self.engine.queue().has_pending().await {
                self.retry_sync().await;
            } else {
                debug!(target = %profile, "No pending results, waiting for next poll");
            }
        }
    }

    /// Snapshot of the visible notices.
    pub async fn notices(&self) -> SyncNotices {
        self.notices.lock().await.clone()
    }

    pub async fn dismiss(&self, kind: NoticeKind) {
        self.notices.lock().await.dismiss(kind);
    }

    async fn drain_with_notices(&self) -> Option<DrainReport> {
        let pending = self.engine.queue().len().await;
        let previous = {
            let mut notices = self.notices.lock().await;
            let previous = notices.clone();
            notices.drain_started(pending);
            previous
        };

        match self.engine.drain().await {
            Ok(report) => {
                self.notices.lock().await.drain_finished(&report);
                Some(report)
            }
            Err(e) => {
                // The running drain owns the notices
                *self.notices.lock().await = previous;
                debug!(target = %self.engine.profile(), error = %e, "Drain did not run");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileKey;
    use crate::delivery::{DeliveryPolicy, Submitter};
    use crate::error::SubmitError;
    use crate::queue::ResultQueue;
    use crate::record::ResultPayload;
    use crate::status::StatusTracker;
    use crate::store::RecordStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingSubmitter {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Submitter for CountingSubmitter {
        async fn submit(&self, _payload: &ResultPayload) -> Result<(), SubmitError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SubmitError::Other {
                    message: "offline".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    /// Holds every submission open until released.
    #[derive(Default)]
    struct GatedSubmitter {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Submitter for GatedSubmitter {
        async fn submit(&self, _payload: &ResultPayload) -> Result<(), SubmitError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn trigger<S: Submitter + 'static>(submitter: Arc<S>, config: TriggerConfig) -> SyncTrigger {
        let store = RecordStore::in_memory(ProfileKey::new("classroom"));
        let queue = ResultQueue::new(store.clone(), StatusTracker::new(store));
        let policy = DeliveryPolicy {
            cooldown: Duration::ZERO,
            inter_record_delay: Duration::ZERO,
            ..Default::default()
        };
        SyncTrigger::new(
            Arc::new(DeliveryEngine::new(queue, submitter, policy)),
            &config,
        )
    }

    fn no_settle() -> TriggerConfig {
        TriggerConfig {
            settle_delay_ms: 0,
            poll_interval_secs: None,
        }
    }

    #[tokio::test]
    async fn test_initial_sync_skips_empty_queue() {
        let submitter = Arc::new(CountingSubmitter::default());
        let trigger = trigger(submitter.clone(), no_settle());

        assert!(
            trigger
                .trigger_initial_sync(&CancellationToken::new())
                .await
                .is_none()
        );
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
        assert!(trigger.notices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_sync_waits_for_settle_delay() {
        let submitter = Arc::new(CountingSubmitter::default());
        let trigger = trigger(submitter.clone(), TriggerConfig::default());
        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let report = trigger
            .trigger_initial_sync(&CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(report.synced, 1);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
        assert!(trigger.notices().await.get(NoticeKind::Success).is_some());
    }

    #[tokio::test]
    async fn test_shutdown_during_settle_skips_drain() {
        let submitter = Arc::new(CountingSubmitter::default());
        let trigger = trigger(submitter.clone(), TriggerConfig::default());
        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(trigger.trigger_initial_sync(&shutdown).await.is_none());
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);
        assert!(trigger.engine().queue().has_pending().await);
    }

    #[tokio::test]
    async fn test_failed_retry_shows_error_notice() {
        let submitter = Arc::new(CountingSubmitter {
            fail: true,
            ..Default::default()
        });
        let trigger = trigger(submitter.clone(), no_settle());
        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();

        let report = trigger.retry_sync().await.unwrap();
        assert_eq!(report.failed, 1);

        let notices = trigger.notices().await;
        assert!(notices.get(NoticeKind::Syncing).is_none());
        assert!(notices.get(NoticeKind::Error).unwrap().offers_retry());

        trigger.dismiss(NoticeKind::Error).await;
        assert!(trigger.notices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_shutdown() {
        let submitter = Arc::new(CountingSubmitter::default());
        let trigger = Arc::new(trigger(
            submitter.clone(),
            TriggerConfig {
                settle_delay_ms: 0,
                poll_interval_secs: Some(60),
            },
        ));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let trigger = trigger.clone();
            let shutdown = shutdown.clone();
            async move { trigger.run(shutdown).await }
        });

        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);
        assert!(!trigger.engine().queue().has_pending().await);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_during_drain_leaves_notices_alone() {
        let submitter = Arc::new(GatedSubmitter::default());
        let trigger = Arc::new(trigger(submitter.clone(), no_settle()));
        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();

        let running = tokio::spawn({
            let engine = trigger.engine().clone();
            async move { engine.drain().await }
        });
        submitter.entered.notified().await;

        let before = trigger.notices().await;
        assert!(trigger.retry_sync().await.is_none());
        assert!(
            trigger
                .trigger_initial_sync(&CancellationToken::new())
                .await
                .is_none()
        );
        assert_eq!(trigger.notices().await, before);

        submitter.release.notify_one();
        assert_eq!(running.await.unwrap().unwrap().synced, 1);
    }

    #[tokio::test]
    async fn test_lost_drain_race_restores_notices() {
        let submitter = Arc::new(GatedSubmitter::default());
        let trigger = Arc::new(trigger(submitter.clone(), no_settle()));
        trigger
            .engine()
            .queue()
            .enqueue(ResultPayload::default())
            .await
            .unwrap();

        let running = tokio::spawn({
            let engine = trigger.engine().clone();
            async move { engine.drain().await }
        });
        submitter.entered.notified().await;

        // Skips the syncing gate and hits the engine's own guard
        let before = trigger.notices().await;
        assert!(trigger.drain_with_notices().await.is_none());
        assert_eq!(trigger.notices().await, before);

        submitter.release.notify_one();
        running.await.unwrap().unwrap();
    }
}
