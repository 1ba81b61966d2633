//! Wiring of the synchronization pipeline.
//!
//! A [`SyncPipeline`] owns the two trigger components, the listener and the
//! reconciliation scheduler, and the shutdown channel they subscribe to.
//! Both triggers share one apply engine, one failure log, and one keyed
//! lock table.

use std::sync::Arc;
use std::time::Duration;

use demsync_config::shared::SyncConfig;
use tokio::task::JoinHandle;
use tracing::info;

use crate::apply::ApplyEngine;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::failures::FailureLog;
use crate::listener::NotificationListener;
use crate::mappers::DemandMapper;
use crate::reconcile::Reconciler;
use crate::scheduler::ReconciliationScheduler;
use crate::source::SourceStore;
use crate::sync_error;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        listener: JoinHandle<SyncResult<()>>,
        scheduler: ReconciliationScheduler,
    },
}

/// The full synchronization pipeline over a source and a destination store.
#[derive(Debug)]
pub struct SyncPipeline<S, D> {
    config: Arc<SyncConfig>,
    source: S,
    destination: D,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<S, D> SyncPipeline<S, D>
where
    S: SourceStore + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    pub fn new(config: SyncConfig, source: S, destination: D) -> Self {
        // The receiver is recreated from the sender via `subscribe` for each
        // component that needs one.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            source,
            destination,
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Starts the listener and the reconciliation scheduler.
    pub async fn start(&mut self) -> SyncResult<()> {
        info!(channel = %self.config.channel, "starting synchronization pipeline");

        let failure_log = FailureLog::load(&self.config.failure_log_path).await;
        let mapper = DemandMapper::new(self.config.default_grupo_ocorrencia_id);
        let engine = ApplyEngine::new(self.destination.clone(), failure_log);

        let mut listener = NotificationListener::new(
            self.source.clone(),
            engine.clone(),
            mapper,
            self.config.source.clone(),
            self.config.channel.clone(),
            Duration::from_millis(self.config.listener_retry_delay_ms),
            self.shutdown_tx.subscribe(),
        );
        let listener = tokio::spawn(async move { listener.run().await });

        let reconciler = Reconciler::new(
            self.source.clone(),
            engine,
            mapper,
            self.config.reconciliation.window_size,
        );
        let scheduler = ReconciliationScheduler::start(
            reconciler,
            Duration::from_secs(self.config.reconciliation.interval_secs),
            self.config.reconciliation.run_on_start,
            self.shutdown_tx.subscribe(),
        );

        self.state = PipelineState::Started {
            listener,
            scheduler,
        };

        Ok(())
    }

    /// Waits for the listener to finish, then stops the scheduler.
    pub async fn wait(self) -> SyncResult<()> {
        let PipelineState::Started {
            listener,
            mut scheduler,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");
            return Ok(());
        };

        let result = match listener.await {
            Ok(result) => result,
            Err(join_error) => Err(sync_error!(
                ErrorKind::InvalidState,
                "notification listener task failed",
                source: join_error
            )),
        };

        scheduler.stop().await;

        result
    }

    /// Signals shutdown to every component.
    pub fn shutdown(&self) {
        info!("shutting down synchronization pipeline");

        // An error means every receiver is already gone, so there is
        // nothing left to stop.
        let _ = self.shutdown_tx.shutdown();
    }

    pub async fn shutdown_and_wait(self) -> SyncResult<()> {
        self.shutdown();
        self.wait().await
    }
}

#[cfg(test)]
mod tests {
    use demsync_config::shared::PgConnectionConfig;
    use tempfile::tempdir;

    use super::*;
    use crate::destination::MemoryDestination;
    use crate::source::MemorySourceStore;

    fn unreachable_connection() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            name: "none".to_string(),
            username: "none".to_string(),
            password: None,
        }
    }

    fn test_config(failure_log_path: String) -> SyncConfig {
        SyncConfig {
            source: unreachable_connection(),
            destination: unreachable_connection(),
            channel: "sync_channel".to_string(),
            listener_retry_delay_ms: 50,
            reconciliation: Default::default(),
            failure_log_path,
            default_grupo_ocorrencia_id: 1,
        }
    }

    #[tokio::test]
    async fn shutdown_before_start_is_a_noop() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("failures.json").display().to_string());
        let pipeline = SyncPipeline::new(config, MemorySourceStore::new(), MemoryDestination::new());

        pipeline.shutdown_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn started_pipeline_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path().join("failures.json").display().to_string());
        let mut pipeline =
            SyncPipeline::new(config, MemorySourceStore::new(), MemoryDestination::new());

        pipeline.start().await.unwrap();
        // The listener cannot reach its channel with this configuration and
        // sits in its retry loop; shutdown must still stop it cleanly.
        pipeline.shutdown_and_wait().await.unwrap();
    }
}
