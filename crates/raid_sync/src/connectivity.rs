//! Connectivity-triggered replay
//!
//! The core does not probe the network itself; the host application
//! owns connectivity detection and publishes it on a watch channel.
//! Each transition to online kicks off a replay run.

use crate::coordinator::SyncCoordinator;
use std::sync::Arc;
use tokio::sync::watch;

/// Drive queue replay from an external connectivity signal.
///
/// Runs until the sender side of `signal` is dropped. Replay errors are
/// logged and swallowed; the queue state is preserved for the next
/// transition.
pub async fn watch_connectivity(
    coordinator: Arc<SyncCoordinator>,
    mut signal: watch::Receiver<bool>,
) {
    loop {
        if *signal.borrow_and_update() {
            if let Err(e) = coordinator.replay_pending().await {
                tracing::warn!(error = %e, "queue replay failed");
            }
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}
