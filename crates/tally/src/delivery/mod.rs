//! Delivery of queued results to the submission endpoint.
//!
//! - `submitter` - the `Submitter` seam over the remote endpoint
//! - `http` - `reqwest` implementation of that seam
//! - `engine` - the drain loop and its retry policy

mod engine;
pub mod http;
mod submitter;

pub use engine::DeliveryEngine;
pub use http::HttpSubmitter;
pub use submitter::Submitter;

use serde::Serialize;
use std::time::Duration;

use crate::config::DeliveryConfig;
use crate::record::{EvictedResult, RecordId};

/// Per-record retry rules applied by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPolicy {
    /// Attempts after which a failing record is evicted.
    pub max_attempts: u32,
    /// Records attempted more recently than this are skipped.
    pub cooldown: Duration,
    /// Pause between submissions within one drain.
    pub inter_record_delay: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for DeliveryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            cooldown: Duration::from_secs(config.cooldown_secs),
            inter_record_delay: Duration::from_millis(config.inter_record_delay_ms),
        }
    }
}

impl DeliveryPolicy {
    fn cooldown_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cooldown).unwrap_or(chrono::Duration::MAX)
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Records confirmed by the endpoint and removed.
    pub synced: usize,
    /// Records that failed or were skipped for cool-down.
    pub failed: usize,
    /// Size of the snapshot taken at drain start.
    pub total: usize,
    /// Records dropped at the retry ceiling during this pass.
    pub evicted: Vec<EvictedResult>,
}

impl DrainReport {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }
}

/// Result of handing a freshly completed result to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The endpoint accepted the result immediately.
    Delivered,
    /// Delivery failed; the result was queued under this local id.
    Queued(RecordId),
}
