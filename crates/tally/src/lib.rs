//! tally: durable offline delivery of graded activity results.
//!
//! A result that cannot be submitted right away is queued in a per-profile
//! store, retried with a cool-down and a retry ceiling, and deduplicated
//! server-side through its `clientResultId`.
//!
//! - `store` - corruption-tolerant persistence of the queue and status
//! - `queue` - enqueue / remove / attempt bookkeeping
//! - `delivery` - the drain loop and the HTTP submitter
//! - `status` - the cached sync summary
//! - `trigger` - startup, retry and periodic drains
//! - `notice` - user-facing syncing / success / error states

pub mod config;
pub mod delivery;
pub mod error;
pub mod metrics;
pub mod notice;
pub mod profile;
pub mod queue;
pub mod record;
pub mod status;
pub mod store;
pub mod trigger;

// Re-export commonly used items
pub use config::{Config, ProfileConfig, ProfileKey};
pub use delivery::{
    DeliveryEngine, DeliveryPolicy, DrainReport, HttpSubmitter, SubmitOutcome, Submitter,
};
pub use error::{CliError, DeliveryError, ProfileError, StoreError, SubmitError};
pub use notice::{Notice, NoticeKind, SyncNotices};
pub use profile::Profile;
pub use queue::ResultQueue;
pub use record::{EvictedResult, PendingResult, RecordId, ResultPayload, SyncStatus};
pub use status::{StatusTracker, StatusUpdate};
pub use store::RecordStore;
pub use trigger::SyncTrigger;

// Re-export from tally-common
pub use tally_common::{CliArgs, init_tracing, run_components};
