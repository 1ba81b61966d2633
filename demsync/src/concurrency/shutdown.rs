//! Shutdown signaling for pipeline components.
//!
//! Abstracts a tokio watch channel into a shutdown signal that multiple
//! components can subscribe to. The signal carries no payload; receivers only
//! care that shutdown was requested.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    ///
    /// Returns an error when every receiver has already been dropped, which
    /// means there is nothing left to stop.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver subscribed to this shutdown signal.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
///
/// The initial watch value is unsignaled; receivers observe shutdown only
/// once [`ShutdownTx::shutdown`] is called.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
