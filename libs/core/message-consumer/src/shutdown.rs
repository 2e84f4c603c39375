//! Process shutdown signals
//!
//! Consumers take a `watch::Receiver<bool>` and stop once it turns true.
//! [`shutdown_channel`] ties that receiver to Ctrl+C and SIGTERM.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Wait for Ctrl+C or, on unix, SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}

/// Receiver that turns true on the first shutdown signal.
///
/// Spawns the signal listener, so it must be called inside a Tokio runtime.
/// If the signal handlers cannot be installed the error is logged and the
/// receiver never fires.
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                tx.send_replace(true);
            }
            Err(e) => {
                error!(error = %e, "Failed to install shutdown signal handlers");
                // Keep the sender alive so receivers see a live channel
                std::future::pending::<()>().await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_channel_starts_false() {
        let rx = shutdown_channel();
        assert!(!*rx.borrow());
    }
}
