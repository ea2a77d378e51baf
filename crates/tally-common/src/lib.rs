//! tally-common: Shared plumbing for the tally result delivery pipeline.
//!
//! This crate contains the functionality that is not specific to result
//! delivery itself:
//!
//! - `storage/` - Key/value storage abstraction over `object_store` (local, memory)
//! - `metrics/` - Prometheus metrics infrastructure
//! - `config/` - Multi-file YAML loading and environment variable interpolation
//! - `runner` - Orchestration for long-running per-component tasks
//! - `signal` - Signal handling for graceful shutdown
//! - `tracing` - Subscriber initialization
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod signal;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{CliArgs, ComponentKey, ConfigPath, GlobalConfig, MetricsConfig};
pub use error::{ConfigError, MetricsError, SetupError, StorageError};
pub use crate::metrics::{MetricsController, init_global as init_metrics, init_test as init_metrics_test};
pub use runner::{Component, ComponentRunner, random_jitter, run_components};
pub use signal::shutdown_signal;
pub use storage::{StorageProvider, StorageProviderRef};
pub use crate::tracing::init_tracing;
