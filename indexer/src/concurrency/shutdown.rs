//! Graceful shutdown signaling.
//!
//! [`ShutdownTx`] wraps a watch channel sender of unit values. Every [`ShutdownRx`] subscribed to it
//! observes a change once [`ShutdownTx::shutdown`] is called. The consume loop only checks the
//! receiver between events, so an event that is being applied always completes.

use tokio::sync::watch;

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Sender side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every subscribed receiver that shutdown was requested.
    ///
    /// Fails only when no receiver is alive, which callers may ignore.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver that has not seen any shutdown request yet.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Returns `true` if shutdown was requested since the receiver was created.
///
/// A closed channel counts as a shutdown request, since nobody is left to keep the indexer running.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    shutdown_rx.has_changed().unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let other_rx = shutdown_tx.subscribe();

        assert!(!is_shutdown_requested(&shutdown_rx));
        assert!(!is_shutdown_requested(&other_rx));

        shutdown_tx.shutdown().unwrap();

        assert!(is_shutdown_requested(&shutdown_rx));
        assert!(is_shutdown_requested(&other_rx));
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        drop(shutdown_tx);

        assert!(is_shutdown_requested(&shutdown_rx));
    }

    #[tokio::test]
    async fn changed_resolves_after_shutdown() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();

        let waiter = tokio::spawn(async move { shutdown_rx.changed().await.is_ok() });
        shutdown_tx.shutdown().unwrap();

        assert!(waiter.await.unwrap());
    }
}
