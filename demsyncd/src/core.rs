use demsync::destination::PgDestination;
use demsync::pipeline::SyncPipeline;
use demsync::source::PgSourceStore;
use demsync_config::shared::SyncConfig;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::error::DaemonResult;

/// Starts the synchronization service with the provided configuration.
///
/// Builds the Postgres source and destination stores, starts the pipeline,
/// and runs it until a termination signal arrives.
pub async fn start_sync_with_config(config: SyncConfig) -> DaemonResult<()> {
    info!(
        channel = %config.channel,
        reconciliation_interval_secs = config.reconciliation.interval_secs,
        reconciliation_window = config.reconciliation.window_size,
        failure_log = %config.failure_log_path,
        "starting synchronization service"
    );

    let source = PgSourceStore::new(&config.source);
    let destination = PgDestination::new(&config.destination);

    let mut pipeline = SyncPipeline::new(config, source.clone(), destination.clone());
    pipeline.start().await?;

    // Trigger shutdown on SIGINT or SIGTERM, the latter being what container
    // orchestrators send before a kill.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        if let Err(e) = shutdown_tx.shutdown() {
            warn!(error = ?e, "failed to send shutdown signal");
        }
    });

    // Wait for the pipeline to finish, either normally or via shutdown.
    let result = pipeline.wait().await;

    // If the pipeline finished before any signal, the signal task is still
    // pending and must not keep the process alive.
    shutdown_handle.abort();

    source.close().await;
    destination.close().await;

    result?;
    info!("synchronization service completed");

    Ok(())
}
