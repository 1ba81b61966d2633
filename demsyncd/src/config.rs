use demsync_config::load_config;
use demsync_config::shared::SyncConfig;

use crate::error::{DaemonError, DaemonResult};

/// Loads and validates the daemon configuration.
///
/// Uses the layered loading mechanism from [`demsync_config`] and validates
/// the resulting [`SyncConfig`] before returning it.
pub fn load_sync_config() -> DaemonResult<SyncConfig> {
    let config = load_config::<SyncConfig>().map_err(DaemonError::config)?;
    config.validate().map_err(DaemonError::config)?;

    Ok(config)
}
