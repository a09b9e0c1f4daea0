//! Run-wide shutdown signal.
//!
//! A single [`ShutdownTx`] is owned by a pipeline run. The producer and every worker hold a
//! [`ShutdownRx`] and stop taking new pages once the signal fires. Work already started is
//! always finished, so shutdown never cuts a page transaction in half.

use std::sync::Arc;
use tokio::sync::watch;

/// Sending side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<bool>>);

impl ShutdownTx {
    /// Fires the signal. Calling it more than once has no further effect.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal has fired.
    ///
    /// Never resolves if every [`ShutdownTx`] is dropped without firing.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Creates a shutdown channel in the not-shut-down state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(Arc::new(tx)), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_receiver_observes_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut other = tx.subscribe();

        assert!(!rx.is_shutdown());
        tx.shutdown();
        tx.shutdown();

        rx.wait().await;
        other.wait().await;
        assert!(other.is_shutdown());
    }

    #[tokio::test]
    async fn wait_does_not_resolve_when_sender_is_dropped() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_millis(50), rx.wait()).await;
        assert!(waited.is_err());
    }
}
