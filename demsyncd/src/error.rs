use std::error::Error;

use demsync::error::SyncError;
use thiserror::Error;

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Error type for the synchronization daemon.
///
/// Wraps [`SyncError`] for pipeline errors and provides variants for
/// infrastructure errors around it.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Pipeline or synchronization error.
    #[error("synchronization error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(#[source] Box<dyn Error + Send + Sync>),

    /// I/O error, typically from building the runtime.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Creates a configuration error from any source.
    pub fn config<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        DaemonError::Config(Box::new(err))
    }
}
