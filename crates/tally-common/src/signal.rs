//! Signal handling for graceful shutdown.

use tracing::{error, info};

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
///
/// If a handler cannot be installed, falls back to waiting for Ctrl-C.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let handlers = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    );

    let (Ok(mut sigint), Ok(mut sigterm), Ok(mut sigquit)) = handlers else {
        error!("Failed to install Unix signal handlers, falling back to Ctrl-C");
        ctrl_c().await;
        return;
    };

    tokio::select! {
        _ = sigint.recv() => info!(message = "Signal received.", signal = "SIGINT"),
        _ = sigterm.recv() => info!(message = "Signal received.", signal = "SIGTERM"),
        _ = sigquit.recv() => info!(message = "Signal received.", signal = "SIGQUIT"),
    }
}

/// Wait for Ctrl-C on non-Unix platforms.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(message = "Signal received.", signal = "CTRL_C"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
