//! Orchestration for long-running components.
//!
//! Each configured component (a delivery profile in `tally`) runs as its
//! own task. The runner staggers start times, propagates a shared shutdown
//! token, and logs each component's outcome.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use snafu::ResultExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::error::{AddressParseSnafu, MetricsSnafu, SetupError};
use crate::signal::shutdown_signal;

/// A self-contained unit that runs until shutdown.
pub trait Component: Send + 'static {
    /// The key type used to identify this component.
    type Key: Clone + Display + Send + 'static;

    /// The error type returned by this component.
    type Error: std::error::Error + Send + 'static;

    /// Get a reference to the component's key.
    fn key(&self) -> &Self::Key;

    /// Run this component until it finishes or `shutdown` is cancelled.
    fn run(self, shutdown: CancellationToken)
    -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Runs many components with shared shutdown handling.
pub struct ComponentRunner<C: Component> {
    components: Vec<C>,
    shutdown: CancellationToken,
    start_jitter_secs: u64,
    typetag: &'static str,
}

impl<C: Component> ComponentRunner<C> {
    pub fn new(
        components: Vec<C>,
        shutdown: CancellationToken,
        start_jitter_secs: u64,
        typetag: &'static str,
    ) -> Self {
        Self {
            components,
            shutdown,
            start_jitter_secs,
            typetag,
        }
    }

    /// Cancel the shared token when the process receives a shutdown signal.
    pub fn spawn_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    /// Run all components to completion.
    pub async fn run(self) {
        let mut handles: JoinSet<(C::Key, Result<(), C::Error>)> = JoinSet::new();
        let typetag = self.typetag;

        for component in self.components {
            let shutdown = self.shutdown.clone();
            let key = component.key().clone();
            let start_jitter = random_jitter(self.start_jitter_secs);

            handles.spawn(async move {
                if !start_jitter.is_zero() {
                    info!(
                        target = %key,
                        jitter_ms = start_jitter.as_millis() as u64,
                        "Delaying {} start for jitter", typetag
                    );
                    if shutdown
                        .run_until_cancelled(tokio::time::sleep(start_jitter))
                        .await
                        .is_none()
                    {
                        return (key, Ok(()));
                    }
                }

                let result = component.run(shutdown).await;
                (key, result)
            });
        }

        info!("Spawned {} {} tasks", handles.len(), typetag);

        while let Some(result) = handles.join_next().await {
            match result {
                Ok((key, Ok(()))) => info!(target = %key, "{} stopped", typetag),
                Ok((key, Err(e))) => error!(target = %key, error = %e, "{} failed", typetag),
                Err(e) => error!(error = %e, "{} task panicked", typetag),
            }
        }

        info!("All {}s stopped", typetag);
    }
}

/// Initialize metrics, then run components until a shutdown signal.
pub async fn run_components<C, F>(
    metrics_address: &str,
    global: &GlobalConfig,
    typetag: &'static str,
    create_components: F,
) -> Result<(), SetupError>
where
    C: Component,
    F: FnOnce() -> Vec<C>,
{
    let addr = metrics_address.parse().context(AddressParseSnafu)?;
    crate::init_metrics(addr).context(MetricsSnafu)?;

    let shutdown = CancellationToken::new();
    let runner = ComponentRunner::new(
        create_components(),
        shutdown,
        global.poll_jitter_secs,
        typetag,
    );
    runner.spawn_shutdown_handler();
    runner.run().await;

    Ok(())
}

/// Generate a random jitter duration up to the specified maximum seconds.
pub fn random_jitter(max_secs: u64) -> Duration {
    if max_secs > 0 {
        Duration::from_millis(rand::rng().random_range(0..max_secs * 1000))
    } else {
        Duration::ZERO
    }
}
