//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the daemon process is asked to
//! stop, returning the name of the signal for the shutdown log line.
//!
//! - **Unix**: `SIGINT`, `SIGTERM` (systemd stop), `SIGQUIT`
//! - **Other platforms**: `Ctrl-C`

/// Waits for a termination signal.
///
/// Listeners are registered on each call. Fails if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
