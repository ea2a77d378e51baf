//! Error types for the tally result delivery pipeline.

use snafu::prelude::*;

// Re-export common errors
pub use tally_common::error::{ConfigError, SetupError, StorageError};

/// Errors that can occur writing to the durable record store.
///
/// Reads never fail: corrupt or missing entries load as empty state.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Failed to serialize an entry.
    #[snafu(display("Failed to serialize {entry}: {source}"))]
    Serialize {
        entry: &'static str,
        source: serde_json::Error,
    },

    /// Failed to write an entry to storage.
    #[snafu(display("Failed to write {entry}: {source}"))]
    Write {
        entry: &'static str,
        source: StorageError,
    },

    /// Failed to open the storage backing a profile.
    #[snafu(display("Failed to open store at {url}: {source}"))]
    Open { url: String, source: StorageError },
}

/// Errors from a single submission to the remote endpoint.
///
/// The delivery engine treats every variant identically: the record stays
/// queued until it succeeds or reaches the retry ceiling.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubmitError {
    /// The request never produced a response (offline, DNS, timeout).
    #[snafu(display("Submission request failed: {source}"))]
    Transport { source: reqwest::Error },

    /// The endpoint answered with a non-success status.
    #[snafu(display("Submission rejected with HTTP {status}: {body}"))]
    Rejected { status: u16, body: String },

    /// The payload has no idempotency token and must not be sent.
    #[snafu(display("Payload is missing clientResultId"))]
    MissingClientResultId,

    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// Failure reported by a non-HTTP submitter.
    #[snafu(display("{message}"))]
    Other { message: String },
}

/// Errors from the delivery engine's public entry points.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DeliveryError {
    /// A drain is already in flight for this engine.
    #[snafu(display("A drain is already in progress"))]
    AlreadyDraining,

    /// A result could neither be delivered nor persisted for retry.
    #[snafu(display("Result could not be delivered or queued: {source}"))]
    Enqueue { source: StoreError },
}

/// Errors assembling a profile from its configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProfileError {
    /// The profile's store could not be opened.
    #[snafu(display("Profile '{profile}': {source}"))]
    OpenStore { profile: String, source: StoreError },

    /// The profile's HTTP client could not be built.
    #[snafu(display("Profile '{profile}': {source}"))]
    BuildSubmitter { profile: String, source: SubmitError },
}

/// Top-level errors surfaced by the CLI.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// A profile could not be opened.
    #[snafu(display("Failed to open profile: {source}"))]
    Profile { source: ProfileError },

    /// Delivery error.
    #[snafu(display("Delivery error: {source}"))]
    Delivery { source: DeliveryError },

    /// A result could not be written to the profile's queue.
    #[snafu(display("Failed to queue result for profile '{profile}': {source}"))]
    QueueResult { profile: String, source: StoreError },

    /// Long-running mode could not start.
    #[snafu(display("Setup error: {source}"))]
    Setup { source: SetupError },

    /// Payload file could not be read.
    #[snafu(display("Failed to read payload file {path}: {source}"))]
    ReadPayload {
        path: String,
        source: std::io::Error,
    },

    /// Payload file is not a JSON object.
    #[snafu(display("Invalid payload in {path}: {source}"))]
    ParsePayload {
        path: String,
        source: serde_json::Error,
    },

    /// Failed to render command output.
    #[snafu(display("Failed to render output: {source}"))]
    Render { source: serde_json::Error },
}
