//! Common error types shared across tally crates.
//!
//! This module defines error types for storage, configuration, metrics and
//! process setup. Delivery-specific errors live in the `tally` crate.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Storage URL could not be mapped to a backend.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage setup.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },
}

impl StorageError {
    /// Check if this error represents a missing key.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// No profiles were defined in any configuration source.
    #[snafu(display("No profiles configured"))]
    NoProfiles,

    /// Endpoint URL is empty for a profile.
    #[snafu(display("Profile '{profile}' has an empty endpoint url"))]
    EmptyEndpoint { profile: String },

    /// Store path is empty for a profile.
    #[snafu(display("Profile '{profile}' has an empty store path"))]
    EmptyStorePath { profile: String },

    /// Retry ceiling of zero would evict every record before it is attempted.
    #[snafu(display("Profile '{profile}' must allow at least one delivery attempt"))]
    ZeroMaxAttempts { profile: String },

    /// A profile was requested that does not exist.
    #[snafu(display("Unknown profile '{profile}'"))]
    UnknownProfile { profile: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// The same profile key was defined by more than one file.
    #[snafu(display("Duplicate profile keys: {}", keys.join(", ")))]
    DuplicateComponents { keys: Vec<String> },

    /// Unsupported config file format.
    #[snafu(display("Unsupported config format for {}: only .yaml/.yml supported", path.display()))]
    UnsupportedFormat { path: std::path::PathBuf },

    /// Failed to read configuration directory.
    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// Multiple configuration errors occurred.
    #[snafu(display("Multiple config errors:\n{}", errors.join("\n")))]
    MultipleErrors { errors: Vec<String> },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// Metrics server already initialized (double-init attempted).
    #[snafu(display("Metrics server already initialized"))]
    AlreadyInitialized,

    /// Metrics server not initialized (controller accessed before init).
    #[snafu(display("Metrics server not initialized"))]
    NotInitialized,
}

// ============ Setup Errors ============

/// Errors that can occur while wiring up long-running components.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SetupError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize metrics.
    #[snafu(display("Failed to initialize metrics: {source}"))]
    Metrics { source: MetricsError },
}
