/// Signal handling for graceful shutdown in headless mode.
///
/// SIGINT (Ctrl-C) and SIGTERM both request a stop. The monitor then
/// finishes its current step and exits; a disable already dispatched is
/// allowed to complete.
use tokio::signal;

/// Resolves when the process is asked to shut down.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C, stopping"),
        _ = terminate => tracing::info!("received SIGTERM, stopping"),
    }
}
