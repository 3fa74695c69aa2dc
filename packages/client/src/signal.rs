//! Process signal handling.

/// Resolve on Ctrl-C.
///
/// If the handler cannot be installed the future never resolves and the
/// client exits through the `quit` command instead.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(error) => {
            tracing::error!(%error, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
