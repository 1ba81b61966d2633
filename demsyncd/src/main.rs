//! Demand synchronization daemon.
//!
//! Loads configuration, initializes tracing, starts the async runtime, and
//! runs the synchronization pipeline until a termination signal arrives.

use demsync_config::shared::SyncConfig;

use crate::config::load_sync_config;
use crate::core::start_sync_with_config;
use crate::error::{DaemonError, DaemonResult};

mod config;
mod core;
mod error;

fn main() -> DaemonResult<()> {
    let sync_config = load_sync_config()?;

    demsync_telemetry::tracing::init_tracing("demsync=info,demsyncd=info")
        .map_err(DaemonError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(sync_config))?;

    Ok(())
}

async fn async_main(sync_config: SyncConfig) -> DaemonResult<()> {
    start_sync_with_config(sync_config).await
}
