//! Signal handling and coordinated graceful shutdown.

use futures_util::future::{join_all, BoxFuture};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// A named step run during shutdown.
pub type ShutdownTask = (&'static str, BoxFuture<'static, anyhow::Result<()>>);

/// Complete when the process is asked to stop.
///
/// Listens for Ctrl+C everywhere, plus SIGTERM and SIGQUIT on unix. A handler
/// that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let quit = unix_signal(signal::unix::SignalKind::quit(), "SIGQUIT");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let quit = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = quit => info!("Received SIGQUIT, initiating graceful shutdown"),
    }
}

#[cfg(unix)]
async fn unix_signal(kind: signal::unix::SignalKind, name: &'static str) {
    match signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Run every shutdown step concurrently, waiting at most `timeout`.
///
/// Returns `true` when all steps finished in time without error. Steps still
/// running at the deadline are abandoned.
pub async fn run_shutdown(tasks: Vec<ShutdownTask>, timeout: Duration) -> bool {
    info!(steps = tasks.len(), ?timeout, "Shutting down");

    let steps = join_all(tasks.into_iter().map(|(name, task)| async move {
        match task.await {
            Ok(()) => {
                info!(step = name, "Shutdown step finished");
                true
            }
            Err(e) => {
                error!(step = name, error = %e, "Shutdown step failed");
                false
            }
        }
    }));

    match tokio::time::timeout(timeout, steps).await {
        Ok(results) => {
            let clean = results.into_iter().all(|ok| ok);
            if clean {
                info!("Graceful shutdown complete");
            }
            clean
        }
        Err(_) => {
            warn!(?timeout, "Shutdown timed out, abandoning remaining steps");
            false
        }
    }
}
