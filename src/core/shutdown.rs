//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination signal so a
//! process can turn it into the stop token it hands to controllers.
//!
//! - Unix: `SIGINT`, `SIGTERM`, `SIGQUIT`
//! - elsewhere: Ctrl-C
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> std::io::Result<()> {
//! let stop = CancellationToken::new();
//! syncvisor::shutdown::wait_for_shutdown_signal().await?;
//! stop.cancel();
//! # Ok(())
//! # }
//! ```

/// Waits for a termination signal.
///
/// Returns `Err` if a signal listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = int.recv() => {},
        _ = term.recv() => {},
        _ = quit.recv() => {},
    }
    Ok(())
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
