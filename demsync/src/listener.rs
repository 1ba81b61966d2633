//! LISTEN/NOTIFY subscription driving the live pipeline.
//!
//! The listener owns one long-lived Postgres connection subscribed to the
//! change channel. Each notification is deserialized into a change event and
//! processed on its own task, so events for distinct rows apply
//! concurrently; the apply engine's keyed lock serializes same-row applies.
//! On connection failure the listener waits a fixed delay and reconnects,
//! indefinitely.

use std::time::Duration;

use demsync_config::shared::{IntoConnectOptions, PgConnectionConfig};
use futures::{StreamExt, stream};
use pg_escape::quote_identifier;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_postgres::{AsyncMessage, NoTls};
use tracing::{debug, error, info, warn};

use crate::apply::ApplyEngine;
use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::destination::Destination;
use crate::error::{ErrorKind, SyncResult};
use crate::mappers::{DemandMapper, map_fiscal_demanda};
use crate::source::SourceStore;
use crate::types::{ChangeEvent, EntityKind, EventType};

/// Connection state of the listener. There is no terminal state; the
/// listener runs until shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerStatus {
    Disconnected,
    Connecting,
    Listening,
}

/// Maintains the change-channel subscription and dispatches events into the
/// apply engine.
pub struct NotificationListener<S, D> {
    source: S,
    engine: ApplyEngine<D>,
    mapper: DemandMapper,
    connection: PgConnectionConfig,
    channel: String,
    retry_delay: Duration,
    shutdown_rx: ShutdownRx,
    status: ListenerStatus,
}

impl<S, D> NotificationListener<S, D>
where
    S: SourceStore + Clone + Send + Sync + 'static,
    D: Destination + Clone + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        engine: ApplyEngine<D>,
        mapper: DemandMapper,
        connection: PgConnectionConfig,
        channel: String,
        retry_delay: Duration,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            source,
            engine,
            mapper,
            connection,
            channel,
            retry_delay,
            shutdown_rx,
            status: ListenerStatus::Disconnected,
        }
    }

    pub fn status(&self) -> ListenerStatus {
        self.status
    }

    /// Runs the subscription until shutdown.
    ///
    /// An explicit retry loop, unbounded: every connection failure
    /// transitions back to `Disconnected`, waits the configured delay, and
    /// reconnects. Only a shutdown signal ends the loop.
    pub async fn run(&mut self) -> SyncResult<()> {
        loop {
            self.set_status(ListenerStatus::Connecting);

            match self.listen_once().await {
                Ok(()) => {
                    info!("notification listener shutting down");
                    self.set_status(ListenerStatus::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    self.set_status(ListenerStatus::Disconnected);
                    warn!(
                        error = %e,
                        retry_delay_ms = self.retry_delay.as_millis() as u64,
                        "notification subscription lost, reconnecting"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("notification listener shutting down");
                    return Ok(());
                }
                _ = sleep(self.retry_delay) => {}
            }
        }
    }

    /// Connects, subscribes, and forwards notifications until the connection
    /// dies or shutdown is signaled. `Ok` means shutdown.
    async fn listen_once(&mut self) -> SyncResult<()> {
        let pg_config: tokio_postgres::Config = self.connection.with_db();
        let (client, mut connection) = pg_config.connect(NoTls).await?;

        // Notifications only arrive while the connection future is polled,
        // so it runs on its own task and forwards them through a channel.
        let (notification_tx, mut notification_rx) = mpsc::unbounded_channel();
        let connection_task = tokio::spawn(async move {
            let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(notification)) => {
                        if notification_tx.send(notification).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(error) => {
                        debug!(%error, "notification connection errored");
                        break;
                    }
                }
            }
        });

        client
            .batch_execute(&format!("listen {}", quote_identifier(&self.channel)))
            .await?;

        self.set_status(ListenerStatus::Listening);
        info!(channel = %self.channel, "listening for change notifications");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    connection_task.abort();
                    return Ok(());
                }
                maybe_notification = notification_rx.recv() => {
                    match maybe_notification {
                        Some(notification) => self.dispatch(notification.payload()),
                        None => bail!(
                            ErrorKind::SubscriptionLost,
                            "notification connection closed"
                        ),
                    }
                }
            }
        }
    }

    /// Deserializes a payload and spawns its apply. Malformed payloads are
    /// logged and dropped.
    fn dispatch(&self, payload: &str) {
        let event: ChangeEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, payload, "dropping malformed notification payload");
                return;
            }
        };

        debug!(
            id = event.id,
            table = %event.table,
            event_type = %event.event_type,
            "received change event"
        );

        let source = self.source.clone();
        let engine = self.engine.clone();
        let mapper = self.mapper;
        tokio::spawn(async move {
            if let Err(error) = process_event(&source, &engine, mapper, &event).await {
                error!(
                    %error,
                    id = event.id,
                    table = %event.table,
                    "failed to apply change event"
                );
            }
        });
    }

    fn set_status(&mut self, status: ListenerStatus) {
        if self.status != status {
            debug!(from = ?self.status, to = ?status, "listener status changed");
            self.status = status;
        }
    }
}

/// Runs one change event through fetch, map, and apply.
///
/// Shared by the listener tasks and the tests; all drop decisions (absent
/// source row, unsupported table) live here.
pub async fn process_event<S, D>(
    source: &S,
    engine: &ApplyEngine<D>,
    mapper: DemandMapper,
    event: &ChangeEvent,
) -> SyncResult<()>
where
    S: SourceStore,
    D: Destination,
{
    match event.entity() {
        EntityKind::Demand => match event.event_type {
            // The source row is already gone; the id alone is enough.
            EventType::Delete => engine.delete_demand(event.id).await,
            EventType::Insert | EventType::Update => {
                match source.fetch_demand(event.id).await? {
                    Some(row) => engine.apply_demand(event.event_type, &mapper.map(row)).await,
                    None => {
                        warn!(id = event.id, "demand row absent at source, dropping event");
                        Ok(())
                    }
                }
            }
        },
        EntityKind::FiscalDemanda => match event.event_type {
            EventType::Delete => {
                // The pair cannot be derived from a deleted source row;
                // reconciliation removes orphaned pairs instead.
                warn!(
                    id = event.id,
                    "assignment delete carries no pair information, leaving to reconciliation"
                );
                Ok(())
            }
            EventType::Insert | EventType::Update => {
                match source.fetch_fiscal_demanda(event.id).await? {
                    Some(row) => engine
                        .apply_assignment(event.event_type, &map_fiscal_demanda(row))
                        .await
                        .map(|_| ()),
                    None => {
                        warn!(id = event.id, "assignment row absent at source, dropping event");
                        Ok(())
                    }
                }
            }
        },
        EntityKind::Unsupported => {
            warn!(table = %event.table, "ignoring event for unsupported table");
            Ok(())
        }
    }
}
