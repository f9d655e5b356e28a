//! Reload signal plumbing.
//!
//! SIGUSR2 asks the server to reload scripts. The handler only flips a
//! watch channel; the server's update loop turns the notification into
//! `request_reload()` on every environment (rescanning the cache first),
//! and each environment reloads itself when it is safe to do so.

use tokio::sync::watch;
use tracing::info;

/// Reload notification (empty - receiving it is the signal).
#[derive(Debug, Clone)]
pub struct ReloadSignal;

/// Spawns the SIGUSR2 handler and returns the receiver the update loop
/// watches. Must be called from within the server's async runtime.
#[cfg(unix)]
pub fn setup_reload_signal() -> watch::Receiver<Option<ReloadSignal>> {
    let (reload_tx, reload_rx) = watch::channel(None);

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigusr2 = match signal(SignalKind::user_defined2()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(target: "scripting", "Failed to register SIGUSR2 handler: {err}");
                return;
            }
        };

        loop {
            if reload_tx.is_closed() {
                info!(target: "scripting", "Reload signal receiver dropped, shutting down SIGUSR2 handler");
                break;
            }

            sigusr2.recv().await;
            info!(target: "scripting", "Received SIGUSR2 - requesting script reload");

            if reload_tx.send(Some(ReloadSignal)).is_err() {
                break;
            }

            // Clear the notification once the loop has had a chance to
            // observe it.
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            let _ = reload_tx.send(None);
        }
    });

    reload_rx
}

/// Non-Unix platforms have no SIGUSR2; the receiver never fires.
#[cfg(not(unix))]
pub fn setup_reload_signal() -> watch::Receiver<Option<ReloadSignal>> {
    let (reload_tx, reload_rx) = watch::channel(None);
    tracing::warn!(target: "scripting", "SIGUSR2 reload not supported on this platform");
    std::mem::forget(reload_tx);
    reload_rx
}
