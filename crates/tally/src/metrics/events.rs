//! Internal events for delivery metrics.
//!
//! Every metric carries a `profile` label so multi-profile hosts can be
//! observed per store namespace.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

pub use tally_common::metrics::events::{InternalEvent, RequestStatus};

// ============================================================================
// Queue events
// ============================================================================

/// Event emitted when a result is appended to the pending queue.
pub struct ResultQueued {
    pub profile: String,
}

impl InternalEvent for ResultQueued {
    fn emit(self) {
        trace!(profile = %self.profile, "Result queued");
        counter!("tally_results_queued_total", "profile" => self.profile).increment(1);
    }
}

/// Gauge of the live pending-queue length.
pub struct PendingResults {
    pub profile: String,
    pub count: usize,
}

impl InternalEvent for PendingResults {
    fn emit(self) {
        trace!(profile = %self.profile, count = self.count, "Pending results");
        gauge!("tally_pending_results", "profile" => self.profile).set(self.count as f64);
    }
}

// ============================================================================
// Delivery events
// ============================================================================

/// Event emitted after each submission to the endpoint.
pub struct DeliveryAttempted {
    pub profile: String,
    pub status: RequestStatus,
    pub duration: Duration,
}

impl InternalEvent for DeliveryAttempted {
    fn emit(self) {
        trace!(
            profile = %self.profile,
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Delivery attempted"
        );
        counter!(
            "tally_delivery_attempts_total",
            "profile" => self.profile.clone(),
            "status" => self.status.as_str()
        )
        .increment(1);
        histogram!("tally_delivery_duration_seconds", "profile" => self.profile)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the endpoint confirms a result.
pub struct ResultDelivered {
    pub profile: String,
}

impl InternalEvent for ResultDelivered {
    fn emit(self) {
        counter!("tally_results_delivered_total", "profile" => self.profile).increment(1);
    }
}

/// Event emitted when a result is dropped at the retry ceiling.
pub struct ResultEvicted {
    pub profile: String,
}

impl InternalEvent for ResultEvicted {
    fn emit(self) {
        counter!("tally_results_evicted_total", "profile" => self.profile).increment(1);
    }
}

/// Event emitted when a record is skipped because it is cooling down.
pub struct DeliverySkipped {
    pub profile: String,
}

impl InternalEvent for DeliverySkipped {
    fn emit(self) {
        counter!("tally_delivery_skipped_total", "profile" => self.profile).increment(1);
    }
}

/// Event emitted when a drain pass finishes.
pub struct DrainCompleted {
    pub profile: String,
    pub duration: Duration,
}

impl InternalEvent for DrainCompleted {
    fn emit(self) {
        trace!(
            profile = %self.profile,
            duration_ms = self.duration.as_millis(),
            "Drain completed"
        );
        counter!("tally_drains_total", "profile" => self.profile.clone()).increment(1);
        histogram!("tally_drain_duration_seconds", "profile" => self.profile)
            .record(self.duration.as_secs_f64());
    }
}
