//! Main server integration for botfetch

use crate::chat::{ChatClient, ConnectionManager, ConnectionState};
use crate::models::{ChatEvent, Configuration, EventPayload};
use crate::relay::{
    Classification, EventClassifier, ProgressTracker, RequestClass, RequestCorrelator,
    TransferRelay,
};
use crate::server::api::{create_api_routes, RelayContext};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{interval, sleep, Duration};

/// How often the correlator reaps orphaned pending entries.
const PURGE_INTERVAL_SECS: u64 = 5;
/// How often the retention sweep runs.
const SWEEP_INTERVAL_SECS: u64 = 300;

/// Main botfetch relay server
pub struct RelayServer {
    config: Configuration,
    client: Arc<dyn ChatClient>,
}

impl RelayServer {
    /// Create a new relay server over an established client.
    pub fn new(config: Configuration, client: Arc<dyn ChatClient>) -> Self {
        Self { config, client }
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        use std::net::SocketAddr;
        let address: SocketAddr = format!("{}:{}", self.config.server_host, self.config.server_port)
            .parse()
            .context("Invalid server address")?;

        tokio::fs::create_dir_all(&self.config.download_dir)
            .await
            .context("Failed to create download directory")?;

        let connection = ConnectionManager::new(
            Arc::clone(&self.client),
            Duration::from_secs(self.config.reconnect_backoff_seconds),
            Duration::from_secs(self.config.probe_interval_seconds),
        );
        let correlator = RequestCorrelator::new(
            Duration::from_secs(self.config.menu_timeout_seconds),
            Duration::from_secs(self.config.payload_timeout_seconds),
        );
        let progress = ProgressTracker::new(Duration::from_secs(self.config.progress_linger_seconds));
        let classifier = Arc::new(EventClassifier::new(self.config.allowed_bots.clone()));
        let transfer = Arc::new(TransferRelay::new(
            Arc::clone(&self.client),
            self.config.download_dir.clone(),
            self.config.transfer_workers,
        ));

        // Initial session. A transient failure schedules its own reconnect;
        // the server still comes up and reports degraded health.
        if let Err(e) = connection.connect().await {
            tracing::warn!(error = %e, "initial gateway connection failed");
        }

        let probe_task = connection.spawn_probe_loop();

        let sweep_task = TransferRelay::spawn_retention_sweep(
            self.config.download_dir.clone(),
            Duration::from_secs(self.config.retention_seconds),
            Duration::from_secs(SWEEP_INTERVAL_SECS),
        );

        let purge_task = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                let mut tick = interval(Duration::from_secs(PURGE_INTERVAL_SECS));
                loop {
                    tick.tick().await;
                    correlator.purge_expired().await;
                }
            })
        };

        let pump_task = {
            let client = Arc::clone(&self.client);
            let connection = Arc::clone(&connection);
            let classifier = Arc::clone(&classifier);
            let correlator = correlator.clone();
            let progress = progress.clone();
            let transfer = Arc::clone(&transfer);
            tokio::spawn(async move {
                Self::run_event_pump(client, connection, classifier, correlator, progress, transfer)
                    .await;
            })
        };

        let ctx = RelayContext {
            connection: Arc::clone(&connection),
            correlator,
            progress,
            client: Arc::clone(&self.client),
            download_dir: self.config.download_dir.clone(),
        };
        let routes = create_api_routes(ctx);

        tracing::info!(address = %address, "botfetch server starting");

        tokio::select! {
            _ = warp::serve(routes).run(address) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
            }
        }

        // Cleanup
        pump_task.abort();
        probe_task.abort();
        sweep_task.abort();
        purge_task.abort();
        let _ = self.client.disconnect().await;

        Ok(())
    }

    /// Single event pump: classified events are processed one at a time in
    /// arrival order, which is what makes resolve-first-waiting safe against
    /// intra-process races.
    async fn run_event_pump(
        client: Arc<dyn ChatClient>,
        connection: Arc<ConnectionManager>,
        classifier: Arc<EventClassifier>,
        correlator: RequestCorrelator,
        progress: ProgressTracker,
        transfer: Arc<TransferRelay>,
    ) {
        loop {
            match connection.state().await {
                ConnectionState::Halted => {
                    tracing::error!("event pump stopped: gateway session halted");
                    return;
                }
                ConnectionState::Connected => {}
                _ => {
                    sleep(Duration::from_millis(500)).await;
                    continue;
                }
            }

            match client.next_event().await {
                Ok(Some(event)) => {
                    // One malformed event must never take down the listener.
                    Self::process_event(
                        event,
                        &client,
                        &classifier,
                        &correlator,
                        &progress,
                        &transfer,
                    )
                    .await;
                }
                Ok(None) => {}
                Err(e) => {
                    connection.handle_error(&e).await;
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Classify one inbound event and feed the correlator.
    async fn process_event(
        event: ChatEvent,
        client: &Arc<dyn ChatClient>,
        classifier: &EventClassifier,
        correlator: &RequestCorrelator,
        progress: &ProgressTracker,
        transfer: &TransferRelay,
    ) {
        // Edits carry only a reference; re-fetch the full message first.
        let event = match &event.payload {
            EventPayload::Edited { message_id } => match client.fetch_message(message_id).await {
                Ok(full) => full,
                Err(e) => {
                    tracing::debug!(message_id = %message_id, error = %e, "could not fetch edited message");
                    return;
                }
            },
            _ => event,
        };

        match classifier.classify(&event) {
            Classification::Menu(menu) => {
                tracing::debug!(message_id = %menu.message_id, formats = menu.formats.len(), "menu received");
                correlator.resolve_menu(menu).await;
            }
            Classification::Progress(percent) => {
                progress.apply_percent(percent);
            }
            Classification::Payload { media, kind } => {
                if !correlator.should_accept_payload(kind).await {
                    tracing::debug!(kind = kind.slug(), "payload discarded by priority policy");
                    return;
                }
                if !correlator.has_pending(RequestClass::Payload).await {
                    tracing::debug!(kind = kind.slug(), "payload ignored: no waiting request");
                    return;
                }
                // Persist before resolving; the HTTP layer serves from disk
                // the moment the caller gets the descriptor.
                match transfer.fetch_to_disk(&media, kind).await {
                    Ok(file) => {
                        correlator.resolve_payload(kind, file).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "payload transfer failed");
                        correlator
                            .fail_next(RequestClass::Payload, e.to_string())
                            .await;
                    }
                }
            }
            Classification::Irrelevant => {}
        }
    }
}
