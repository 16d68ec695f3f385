//! Gateway connection lifecycle: connect, probe, reconnect, halt.

use crate::chat::client::{ChatClient, ChatError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, Duration};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
    /// Terminal: duplicate-session conflict. Two processes share one gateway
    /// identity; reconnecting would only steal the session back and forth,
    /// so this state requires operator intervention.
    Halted,
}

/// Owns the single live gateway session and recovers it from drops.
pub struct ConnectionManager {
    client: Arc<dyn ChatClient>,
    state: Arc<RwLock<ConnectionState>>,
    /// Serializes reconnect sequences: overlapping timers must never spawn
    /// two concurrent reconnects.
    reconnect_in_flight: Arc<AtomicBool>,
    backoff: Duration,
    probe_interval: Duration,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<dyn ChatClient>,
        backoff: Duration,
        probe_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_in_flight: Arc::new(AtomicBool::new(false)),
            backoff,
            probe_interval,
        })
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Queried by every HTTP handler before outbound work. Handlers fail
    /// fast with 503 instead of queuing work while disconnected.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, ConnectionState::Connected)
    }

    /// Establish the initial session.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ChatError> {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Halted {
                return Err(ChatError::NotConnected);
            }
            *state = ConnectionState::Connecting;
        }
        match self.client.connect().await {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                tracing::info!("gateway session established");
                Ok(())
            }
            Err(e) => {
                self.handle_error(&e).await;
                Err(e)
            }
        }
    }

    /// React to a session-level error: halt on the fatal conflict class,
    /// otherwise schedule one reconnect after the fixed backoff.
    pub async fn handle_error(self: &Arc<Self>, error: &ChatError) {
        if error.is_fatal() {
            *self.state.write().await = ConnectionState::Halted;
            tracing::error!(error = %error, "gateway session halted; operator intervention required");
            return;
        }

        if self
            .reconnect_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A reconnect sequence is already scheduled or running.
            return;
        }

        *self.state.write().await = ConnectionState::ReconnectScheduled;
        tracing::warn!(error = %error, backoff_secs = self.backoff.as_secs(), "gateway error; reconnect scheduled");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                sleep(manager.backoff).await;
                if manager.run_reconnect().await {
                    break;
                }
                *manager.state.write().await = ConnectionState::ReconnectScheduled;
            }
            manager.reconnect_in_flight.store(false, Ordering::SeqCst);
        });
    }

    /// One reconnect attempt. Returns true when the sequence is finished
    /// (connected or halted), false to retry after another backoff.
    async fn run_reconnect(&self) -> bool {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Halted {
                return true;
            }
            *state = ConnectionState::Connecting;
        }
        match self.client.connect().await {
            Ok(()) => {
                *self.state.write().await = ConnectionState::Connected;
                tracing::info!("gateway session re-established");
                true
            }
            Err(e) if e.is_fatal() => {
                *self.state.write().await = ConnectionState::Halted;
                tracing::error!(error = %e, "gateway session halted during reconnect");
                true
            }
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                tracing::warn!(error = %e, "reconnect attempt failed");
                false
            }
        }
    }

    /// Periodic liveness probe. A failed probe proactively detects silent
    /// drops and enters the same reconnect path as an explicit error.
    pub fn spawn_probe_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut probe = interval(manager.probe_interval);
            probe.tick().await; // first tick is immediate
            loop {
                probe.tick().await;
                match *manager.state.read().await {
                    ConnectionState::Connected => {}
                    ConnectionState::Halted => return,
                    _ => continue,
                }
                if let Err(e) = manager.client.ping().await {
                    tracing::warn!(error = %e, "liveness probe failed");
                    manager.handle_error(&e).await;
                }
            }
        })
    }
}
