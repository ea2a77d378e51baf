//! The drain loop.
//!
//! One drain takes a snapshot of the queue and attempts each record at
//! most once. Records that fail stay queued for a later drain until they
//! reach the retry ceiling; records attempted within the cool-down are
//! skipped. A failing submission never aborts the pass.

use chrono::Utc;
use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProfileKey;
use crate::delivery::{DeliveryPolicy, DrainReport, SubmitOutcome, Submitter};
use crate::emit;
use crate::error::{AlreadyDrainingSnafu, DeliveryError, EnqueueSnafu, SubmitError};
use crate::metrics::events::{
    DeliveryAttempted, DeliverySkipped, DrainCompleted, RequestStatus, ResultDelivered,
};
use crate::queue::ResultQueue;
use crate::record::{PendingResult, ResultPayload, SyncStatus};
use crate::status::{StatusTracker, StatusUpdate};

/// Delivers a profile's queued results.
///
/// The engine owns no timers; callers decide when to drain.
pub struct DeliveryEngine {
    queue: ResultQueue,
    submitter: Arc<dyn Submitter>,
    policy: DeliveryPolicy,
    syncing: AtomicBool,
}

/// Clears the syncing flag when a drain ends, including by panic.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Attempt {
    Delivered,
    Failed,
    Evicted,
    Gone,
}

impl DeliveryEngine {
    pub fn new(queue: ResultQueue, submitter: Arc<dyn Submitter>, policy: DeliveryPolicy) -> Self {
        Self {
            queue,
            submitter,
            policy,
            syncing: AtomicBool::new(false),
        }
    }

    /// Create an engine and clear a syncing flag persisted by a process
    /// that exited mid-drain.
    pub async fn open(
        queue: ResultQueue,
        submitter: Arc<dyn Submitter>,
        policy: DeliveryPolicy,
    ) -> Self {
        queue.status().clear_stale_syncing().await;
        Self::new(queue, submitter, policy)
    }

    pub fn profile(&self) -> &ProfileKey {
        self.queue.store().profile()
    }

    pub fn queue(&self) -> &ResultQueue {
        &self.queue
    }

    pub fn status(&self) -> &StatusTracker {
        self.queue.status()
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Whether a drain is in flight in this process.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Current status with a live pending count.
    pub async fn current_status(&self) -> SyncStatus {
        let mut status = self.status().current().await;
        status.is_syncing = self.is_syncing();
        status
    }

    /// Attempt every queued record once.
    ///
    /// Fails only with `AlreadyDraining`; delivery and storage problems
    /// are reported through the returned counts and the status summary.
    pub async fn drain(&self) -> Result<DrainReport, DeliveryError> {
        ensure!(
            self.syncing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
            AlreadyDrainingSnafu
        );
        let _guard = SyncingGuard(&self.syncing);

        let start = Instant::now();
        let snapshot = self.queue.pending().await;
        // Cool-down is measured against the drain start for every record
        let started_at = Utc::now();
        let mut report = DrainReport::new(snapshot.len());

        self.status()
            .update(
                StatusUpdate::default()
                    .syncing(true)
                    .attempted_at(started_at)
                    .error(None),
            )
            .await;

        info!(target = %self.profile(), total = report.total, "Starting drain");

        let cooldown = self.policy.cooldown_delta();
        let mut last_error: Option<String> = None;
        let mut attempted_any = false;

        for record in &snapshot {
            if record.attempted_after(started_at) {
                debug!(
                    target = %self.profile(),
                    id = %record.id,
                    last_attempt_at = ?record.last_attempt_at,
                    "Last attempt is in the future, ignoring the cool-down"
                );
            }
            if record.in_cooldown(started_at, cooldown) {
                debug!(
                    target = %self.profile(),
                    id = %record.id,
                    attempts = record.attempts,
                    "Skipping result attempted within the cool-down"
                );
                emit!(DeliverySkipped {
                    profile: self.profile().to_string(),
                });
                report.failed += 1;
                continue;
            }

            if attempted_any && !self.policy.inter_record_delay.is_zero() {
                tokio::time::sleep(self.policy.inter_record_delay).await;
            }
            attempted_any = true;

            match self.attempt(record, &mut last_error, &mut report).await {
                Attempt::Delivered => report.synced += 1,
                Attempt::Failed | Attempt::Evicted => report.failed += 1,
                Attempt::Gone => {}
            }
        }

        let summary = (report.failed > 0).then(|| match &last_error {
            Some(error) => format!(
                "{} of {} results not delivered: {error}",
                report.failed, report.total
            ),
            None => format!(
                "{} of {} results waiting for retry cool-down",
                report.failed, report.total
            ),
        });
        let status = self
            .status()
            .update(StatusUpdate::default().syncing(false).error(summary))
            .await;

        emit!(DrainCompleted {
            profile: self.profile().to_string(),
            duration: start.elapsed(),
        });
        info!(
            target = %self.profile(),
            synced = report.synced,
            failed = report.failed,
            evicted = report.evicted.len(),
            total = report.total,
            pending = status.pending_count,
            "Drain finished"
        );

        Ok(report)
    }

    /// Deliver a freshly completed result, queueing it if delivery fails.
    ///
    /// The queued record carries the same `clientResultId` that was sent,
    /// so a request the server did receive is deduplicated on retry.
    pub async fn submit(&self, mut payload: ResultPayload) -> Result<SubmitOutcome, DeliveryError> {
        payload.ensure_client_result_id();

        match self.send(&payload).await {
            Ok(()) => {
                emit!(ResultDelivered {
                    profile: self.profile().to_string(),
                });
                Ok(SubmitOutcome::Delivered)
            }
            Err(e) => {
                warn!(
                    target = %self.profile(),
                    client_result_id = payload.client_result_id().unwrap_or_default(),
                    error = %e,
                    "Submission failed, queueing for retry"
                );
                let id = self.queue.enqueue(payload).await.context(EnqueueSnafu)?;
                Ok(SubmitOutcome::Queued(id))
            }
        }
    }

    async fn attempt(
        &self,
        record: &PendingResult,
        last_error: &mut Option<String>,
        report: &mut DrainReport,
    ) -> Attempt {
        // The attempt is counted before the request so a crash mid-send
        // still consumes one of the record's attempts.
        let record = match self.queue.record_attempt(&record.id).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                debug!(target = %self.profile(), id = %record.id, "Result left the queue mid-drain");
                return Attempt::Gone;
            }
            Err(e) => {
                warn!(
                    target = %self.profile(),
                    id = %record.id,
                    error = %e,
                    "Failed to record delivery attempt, not sending"
                );
                *last_error = Some(e.to_string());
                return Attempt::Failed;
            }
        };

        match self.send(&record.payload).await {
            Ok(()) => {
                emit!(ResultDelivered {
                    profile: self.profile().to_string(),
                });
                if let Err(e) = self.queue.remove(&record.id).await {
                    // Redelivery is deduplicated on clientResultId
                    warn!(
                        target = %self.profile(),
                        id = %record.id,
                        error = %e,
                        "Delivered result could not be removed from the queue"
                    );
                }
                debug!(target = %self.profile(), id = %record.id, "Delivered result");
                Attempt::Delivered
            }
            Err(e) => {
                let error = e.to_string();
                *last_error = Some(error.clone());

                if record.attempts < self.policy.max_attempts {
                    info!(
                        target = %self.profile(),
                        id = %record.id,
                        attempts = record.attempts,
                        max_attempts = self.policy.max_attempts,
                        error = %error,
                        "Delivery failed, keeping result queued"
                    );
                    return Attempt::Failed;
                }

                match self.queue.evict(&record.id, Some(error)).await {
                    Ok(Some(evicted)) => {
                        report.evicted.push(evicted);
                        Attempt::Evicted
                    }
                    Ok(None) => Attempt::Failed,
                    Err(e) => {
                        warn!(
                            target = %self.profile(),
                            id = %record.id,
                            error = %e,
                            "Failed to evict result at the retry ceiling"
                        );
                        Attempt::Failed
                    }
                }
            }
        }
    }

    async fn send(&self, payload: &ResultPayload) -> Result<(), SubmitError> {
        let start = Instant::now();
        let result = self.submitter.submit(payload).await;
        emit!(DeliveryAttempted {
            profile: self.profile().to_string(),
            status: RequestStatus::of(&result),
            duration: start.elapsed(),
        });
        result
    }
}
