//! Connection manager for the live trace channel.
//!
//! One manager owns at most one live connection. Each `connect` bumps a
//! generation counter; events are only applied while their connection's
//! generation is still current, so late frames from a superseded socket
//! never reach the history.

use crate::config::ClientConfig;
use crate::transport::{Transport, TransportEvent, TransportEvents};
use crate::ClientError;
use futures::StreamExt;
use routescope_core::ConnectionState;
use routescope_monitor::TraceMonitor;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ActiveConnection {
    session_id: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active: Option<ActiveConnection>,
    last_session: Option<String>,
}

struct Shared {
    monitor: Arc<TraceMonitor>,
    slot: Mutex<Slot>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, Slot>, ClientError> {
        self.slot.lock().map_err(|_| ClientError::Lock)
    }

    /// Applies one transport event if `generation` is still current.
    /// Returns false for stale connections.
    fn apply(&self, generation: u64, event: TransportEvent) -> bool {
        let Ok(mut slot) = self.lock() else {
            warn!("Failed to acquire connection lock");
            return false;
        };
        if slot.generation != generation {
            return false;
        }

        match event {
            TransportEvent::Open => {
                if let Some(active) = slot.active.as_ref() {
                    info!(session_id = %active.session_id, "Trace channel connected");
                }
                self.monitor.set_connection_state(ConnectionState::Connected);
            }
            TransportEvent::Message(raw) => {
                self.monitor.ingest_raw(&raw);
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "Trace channel error");
                self.monitor
                    .set_connection_state(ConnectionState::Error(message));
            }
            TransportEvent::Close => {
                if let Some(active) = slot.active.take() {
                    info!(session_id = %active.session_id, "Trace channel closed");
                }
                self.monitor
                    .set_connection_state(ConnectionState::Disconnected);
            }
        }
        true
    }
}

async fn pump(shared: Arc<Shared>, generation: u64, mut events: TransportEvents) {
    while let Some(event) = events.next().await {
        let closed = matches!(event, TransportEvent::Close);
        if !shared.apply(generation, event) {
            debug!(generation, "Dropping events from superseded connection");
            return;
        }
        if closed {
            return;
        }
    }
    // Stream ended without an explicit close.
    shared.apply(generation, TransportEvent::Close);
}

/// Owns the trace channel for one monitor.
///
/// `connect` never blocks: it schedules the connection on the current Tokio
/// runtime and returns. Lifecycle changes show up on the monitor's
/// connection state. There is no automatic retry; use [`reconnect`].
///
/// [`reconnect`]: ConnectionManager::reconnect
pub struct ConnectionManager<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    shared: Arc<Shared>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: ClientConfig, transport: T, monitor: Arc<TraceMonitor>) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            shared: Arc::new(Shared {
                monitor,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    pub fn monitor(&self) -> &Arc<TraceMonitor> {
        &self.shared.monitor
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session of the live connection, if any.
    pub fn session_id(&self) -> Option<String> {
        let slot = self.shared.lock().ok()?;
        slot.active.as_ref().map(|a| a.session_id.clone())
    }

    /// Opens the trace channel for `session_id`, tearing down any existing
    /// connection first. Invalid arguments leave the current connection
    /// untouched.
    pub fn connect(&self, session_id: &str) -> Result<(), ClientError> {
        let url = self.config.endpoint_for(session_id)?;
        let handle = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut slot = self.shared.lock()?;
        if let Some(previous) = slot.active.take() {
            info!(session_id = %previous.session_id, "Superseding trace channel");
            previous.task.abort();
        }

        slot.generation += 1;
        let generation = slot.generation;
        slot.last_session = Some(session_id.to_string());
        self.shared
            .monitor
            .set_connection_state(ConnectionState::Connecting);

        info!(session_id = %session_id, url = %url, "Connecting trace channel");

        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        let task = handle.spawn(async move {
            let events = transport.open(&url);
            pump(shared, generation, events).await;
        });

        slot.active = Some(ActiveConnection {
            session_id: session_id.to_string(),
            task,
        });
        Ok(())
    }

    /// Closes the live connection. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let Ok(mut slot) = self.shared.lock() else {
            warn!("Failed to acquire connection lock");
            return;
        };

        slot.generation += 1;
        if let Some(active) = slot.active.take() {
            info!(session_id = %active.session_id, "Disconnecting trace channel");
            active.task.abort();
        }

        if self.shared.monitor.connection_state() != ConnectionState::Disconnected {
            self.shared
                .monitor
                .set_connection_state(ConnectionState::Disconnected);
        }
    }

    /// Connects again to the most recently requested session.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        let session_id = self
            .shared
            .lock()?
            .last_session
            .clone()
            .ok_or(ClientError::NoSession)?;
        self.connect(&session_id)
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shared.slot.lock() {
            slot.generation += 1;
            if let Some(active) = slot.active.take() {
                active.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Shared {
        Shared {
            monitor: Arc::new(TraceMonitor::default()),
            slot: Mutex::new(Slot::default()),
        }
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let shared = shared();
        shared.slot.lock().unwrap().generation = 2;

        let raw = r#"{"id":"t1","sessionId":"s1"}"#.to_string();
        assert!(!shared.apply(1, TransportEvent::Message(raw.clone())));
        assert!(!shared.apply(1, TransportEvent::Open));
        assert!(shared.monitor.history().is_empty());
        assert_eq!(shared.monitor.connection_state(), ConnectionState::Disconnected);

        assert!(shared.apply(2, TransportEvent::Message(raw)));
        assert_eq!(shared.monitor.history().len(), 1);
    }

    #[test]
    fn test_error_then_close_ends_disconnected() {
        let shared = shared();
        assert!(shared.apply(0, TransportEvent::Open));
        assert!(shared.monitor.connection_state().is_connected());

        assert!(shared.apply(0, TransportEvent::Error("reset by peer".into())));
        assert_eq!(
            shared.monitor.connection_state(),
            ConnectionState::Error("reset by peer".into())
        );

        assert!(shared.apply(0, TransportEvent::Close));
        assert_eq!(shared.monitor.connection_state(), ConnectionState::Disconnected);
        assert_eq!(shared.monitor.last_error().as_deref(), Some("reset by peer"));
    }

    #[test]
    fn test_malformed_messages_keep_connection() {
        let shared = shared();
        shared.apply(0, TransportEvent::Open);
        assert!(shared.apply(0, TransportEvent::Message("ping".into())));
        assert!(shared.apply(0, TransportEvent::Message(String::new())));
        assert!(shared.monitor.connection_state().is_connected());
        assert!(shared.monitor.history().is_empty());
    }

    #[test]
    fn test_connect_outside_runtime_fails_cleanly() {
        struct NeverTransport;
        impl Transport for NeverTransport {
            fn open(&self, _url: &url::Url) -> TransportEvents {
                Box::pin(futures::stream::empty())
            }
        }

        let manager = ConnectionManager::new(
            ClientConfig::default(),
            NeverTransport,
            Arc::new(TraceMonitor::default()),
        );
        assert!(matches!(manager.connect("s1"), Err(ClientError::NoRuntime)));
        assert_eq!(
            manager.monitor().connection_state(),
            ConnectionState::Disconnected
        );
    }
}
