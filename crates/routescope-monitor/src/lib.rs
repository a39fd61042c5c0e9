//! Live router-trace monitoring: bounded history, filters and statistics.
//!
//! [`TraceMonitor`] owns the trace history, the connection state reported
//! by the transport, and the view state a UI binds to. Every read returns an
//! owned snapshot taken under one lock, so readers never observe a
//! half-applied insert or eviction.

mod filter;
mod ingest;
mod settings;
mod stats;
mod store;

pub use filter::{apply_filters, FilterSpec, FilterUpdate};
pub use ingest::decode_trace;
pub use settings::{MonitorSettings, SettingsUpdate};
pub use stats::TraceStats;
pub use store::{HistoryStore, DEFAULT_MAX_TRACES};

use routescope_core::{ConnectionState, RouterTrace};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors from monitor commands.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Lock error")]
    Lock,
}

/// Change notifications published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    TraceAdded { trace_id: String },
    HistoryCleared,
    ActiveTraceChanged(Option<String>),
    ConnectionChanged(ConnectionState),
    FiltersChanged,
    SettingsChanged,
}

/// Consistent view of the monitor at one instant.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub connection: ConnectionState,
    pub last_error: Option<String>,
    pub history: Vec<RouterTrace>,
    pub filtered: Vec<RouterTrace>,
    pub active: Option<RouterTrace>,
    pub stats: TraceStats,
}

/// Selection state. The active trace is held by id and resolved on read,
/// since the trace may be evicted at any time.
#[derive(Debug, Default)]
struct ViewState {
    active_trace_id: Option<String>,
    panel_open: bool,
}

impl ViewState {
    /// Follows the newest arrival when auto-scroll is on and the panel is
    /// open. Returns true if the selection moved.
    fn on_trace_added(&mut self, trace_id: &str, settings: &MonitorSettings) -> bool {
        if !(settings.auto_scroll && self.panel_open) {
            return false;
        }
        self.active_trace_id = Some(trace_id.to_string());
        true
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    history: HistoryStore,
    settings: MonitorSettings,
    filters: FilterSpec,
    view: ViewState,
    connection: ConnectionState,
    last_error: Option<String>,
}

impl MonitorState {
    fn filtered(&self) -> Vec<RouterTrace> {
        apply_filters(self.history.iter(), &self.filters)
    }

    fn active(&self) -> Option<RouterTrace> {
        let id = self.view.active_trace_id.as_deref()?;
        self.history.get(id).cloned()
    }
}

/// Trace history plus the settings and view state around it.
pub struct TraceMonitor {
    state: Mutex<MonitorState>,
    events: broadcast::Sender<MonitorEvent>,
}

impl Default for TraceMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::default())
    }
}

impl TraceMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        let capacity = if settings.max_traces == 0 {
            tracing::warn!("maxTraces of 0 is not allowed, using 1");
            1
        } else {
            settings.max_traces
        };
        let settings = settings.with_max_traces(capacity);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Mutex::new(MonitorState {
                history: HistoryStore::new(capacity),
                settings,
                ..Default::default()
            }),
            events,
        }
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> Option<MutexGuard<'_, MonitorState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!("Failed to acquire monitor lock");
                None
            }
        }
    }

    fn read<R: Default>(&self, f: impl FnOnce(&MonitorState) -> R) -> R {
        self.lock().map(|guard| f(&guard)).unwrap_or_default()
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Decodes and ingests one raw channel message. Non-trace messages are
    /// dropped silently. Returns true if a trace was inserted.
    pub fn ingest_raw(&self, raw: &str) -> bool {
        match decode_trace(raw) {
            Some(trace) => self.ingest(trace),
            None => false,
        }
    }

    /// Inserts a decoded trace. Returns true if it was inserted.
    pub fn ingest(&self, trace: RouterTrace) -> bool {
        let Some(mut state) = self.lock() else {
            return false;
        };

        if !state.settings.live_updates_enabled {
            tracing::debug!(trace_id = %trace.id, "Live updates disabled, dropping trace");
            return false;
        }

        let trace_id = trace.id.clone();
        let evicted = state.history.insert(trace);
        let history_len = state.history.len();
        let MonitorState { settings, view, .. } = &mut *state;
        let followed = view.on_trace_added(&trace_id, settings);
        drop(state);

        tracing::debug!(
            trace_id = %trace_id,
            history_len,
            evicted,
            followed,
            "Ingested router trace"
        );

        self.publish(MonitorEvent::TraceAdded {
            trace_id: trace_id.clone(),
        });
        if followed {
            self.publish(MonitorEvent::ActiveTraceChanged(Some(trace_id)));
        }
        true
    }

    /// Empties the history and drops the active selection.
    pub fn clear_history(&self) {
        let Some(mut state) = self.lock() else { return };
        state.history.clear();
        state.view.active_trace_id = None;
        drop(state);

        tracing::info!("Cleared trace history");
        self.publish(MonitorEvent::HistoryCleared);
        self.publish(MonitorEvent::ActiveTraceChanged(None));
    }

    pub fn set_active_trace(&self, trace_id: Option<String>) {
        let Some(mut state) = self.lock() else { return };
        state.view.active_trace_id = trace_id.clone();
        drop(state);
        self.publish(MonitorEvent::ActiveTraceChanged(trace_id));
    }

    pub fn set_panel_open(&self, open: bool) {
        let Some(mut state) = self.lock() else { return };
        state.view.panel_open = open;
    }

    pub fn update_filters(&self, update: FilterUpdate) -> Result<(), MonitorError> {
        let mut state = self.lock().ok_or(MonitorError::Lock)?;
        state.filters.apply(update)?;
        tracing::debug!(filters = ?state.filters, "Updated filters");
        drop(state);
        self.publish(MonitorEvent::FiltersChanged);
        Ok(())
    }

    /// Merges a settings update. A new `maxTraces` bound is enforced on the
    /// next insert, not immediately.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<(), MonitorError> {
        let mut state = self.lock().ok_or(MonitorError::Lock)?;
        state.settings.apply(&update)?;
        let capacity = state.settings.max_traces;
        state.history.set_capacity(capacity);
        tracing::debug!(settings = ?state.settings, "Updated settings");
        drop(state);
        self.publish(MonitorEvent::SettingsChanged);
        Ok(())
    }

    /// Records a connection lifecycle transition. Last writer wins.
    pub fn set_connection_state(&self, connection: ConnectionState) {
        let Some(mut state) = self.lock() else { return };
        match &connection {
            ConnectionState::Error(message) => state.last_error = Some(message.clone()),
            ConnectionState::Connected => state.last_error = None,
            _ => {}
        }
        state.connection = connection.clone();
        drop(state);

        tracing::debug!(state = %connection, "Connection state changed");
        self.publish(MonitorEvent::ConnectionChanged(connection));
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.read(|s| s.connection.clone())
    }

    /// Most recent transport error, kept until the next successful open.
    pub fn last_error(&self) -> Option<String> {
        self.read(|s| s.last_error.clone())
    }

    pub fn settings(&self) -> MonitorSettings {
        self.read(|s| s.settings.clone())
    }

    pub fn filters(&self) -> FilterSpec {
        self.read(|s| s.filters.clone())
    }

    pub fn panel_open(&self) -> bool {
        self.read(|s| s.view.panel_open)
    }

    pub fn active_trace_id(&self) -> Option<String> {
        self.read(|s| s.view.active_trace_id.clone())
    }

    /// Full history, newest first.
    pub fn history(&self) -> Vec<RouterTrace> {
        self.read(|s| s.history.to_vec())
    }

    pub fn filtered_history(&self) -> Vec<RouterTrace> {
        self.read(MonitorState::filtered)
    }

    /// Resolves the active selection, or `None` if it has been evicted.
    pub fn active_trace(&self) -> Option<RouterTrace> {
        self.read(MonitorState::active)
    }

    /// Statistics over the filtered history.
    pub fn stats(&self) -> TraceStats {
        self.read(|s| TraceStats::compute(&s.filtered()))
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.read(|s| {
            let filtered = s.filtered();
            MonitorSnapshot {
                connection: s.connection.clone(),
                last_error: s.last_error.clone(),
                history: s.history.to_vec(),
                stats: TraceStats::compute(&filtered),
                filtered,
                active: s.active(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routescope_core::{RoutingMethod, TraceStep};
    use std::sync::Arc;

    fn ids(traces: &[RouterTrace]) -> Vec<&str> {
        traces.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_capacity_eviction_scenario() {
        let monitor = TraceMonitor::new(MonitorSettings::default().with_max_traces(2));
        for id in ["t1", "t2", "t3"] {
            assert!(monitor.ingest(RouterTrace::new(id, "s1")));
        }
        assert_eq!(ids(&monitor.history()), vec!["t3", "t2"]);
    }

    #[test]
    fn test_ingest_raw_skips_noise() {
        let monitor = TraceMonitor::default();
        assert!(!monitor.ingest_raw(""));
        assert!(!monitor.ingest_raw("keep-alive"));
        assert!(!monitor.ingest_raw(r#"{"id":"t1"}"#));
        assert!(monitor.ingest_raw(r#"{"id":"t1","sessionId":"s1"}"#));
        assert_eq!(monitor.history().len(), 1);
    }

    #[test]
    fn test_follow_tracks_newest_when_panel_open() {
        let monitor = TraceMonitor::default();
        monitor.ingest(RouterTrace::new("t1", "s1"));
        assert_eq!(monitor.active_trace_id(), None);

        monitor.set_panel_open(true);
        monitor.ingest(RouterTrace::new("t2", "s1"));
        assert_eq!(monitor.active_trace().map(|t| t.id), Some("t2".to_string()));

        monitor
            .update_settings(SettingsUpdate::new().auto_scroll(false))
            .unwrap();
        monitor.ingest(RouterTrace::new("t3", "s1"));
        assert_eq!(monitor.active_trace_id().as_deref(), Some("t2"));
    }

    #[test]
    fn test_active_trace_resolves_to_none_after_eviction() {
        let monitor = TraceMonitor::new(MonitorSettings::default().with_max_traces(1));
        monitor.ingest(RouterTrace::new("t1", "s1"));
        monitor.set_active_trace(Some("t1".to_string()));
        assert!(monitor.active_trace().is_some());

        monitor.ingest(RouterTrace::new("t2", "s1"));
        assert_eq!(monitor.active_trace_id().as_deref(), Some("t1"));
        assert!(monitor.active_trace().is_none());
    }

    #[test]
    fn test_clear_drops_selection() {
        let monitor = TraceMonitor::default();
        monitor.ingest(RouterTrace::new("t1", "s1"));
        monitor.set_active_trace(Some("t1".to_string()));
        monitor.clear_history();
        assert!(monitor.history().is_empty());
        assert!(monitor.active_trace_id().is_none());
    }

    #[test]
    fn test_capacity_update_is_lazy() {
        let monitor = TraceMonitor::default();
        for i in 0..4 {
            monitor.ingest(RouterTrace::new(format!("t{i}"), "s1"));
        }
        monitor
            .update_settings(SettingsUpdate::new().max_traces(2))
            .unwrap();
        assert_eq!(monitor.history().len(), 4);

        monitor.ingest(RouterTrace::new("t4", "s1"));
        assert_eq!(ids(&monitor.history()), vec!["t4", "t3"]);
    }

    #[test]
    fn test_invalid_settings_leave_state_intact() {
        let monitor = TraceMonitor::default();
        let result = monitor.update_settings(SettingsUpdate::new().max_traces(0));
        assert!(matches!(result, Err(MonitorError::InvalidSetting(_))));
        assert_eq!(monitor.settings(), MonitorSettings::default());
    }

    #[test]
    fn test_live_updates_disabled_drops_traces() {
        let monitor = TraceMonitor::default();
        monitor
            .update_settings(SettingsUpdate::new().live_updates(false))
            .unwrap();
        assert!(!monitor.ingest(RouterTrace::new("t1", "s1")));
        assert!(monitor.history().is_empty());
    }

    #[test]
    fn test_stats_follow_filters() {
        let monitor = TraceMonitor::default();
        monitor.ingest(
            RouterTrace::new("t1", "s1")
                .with_agent("lease")
                .with_confidence(0.9)
                .with_step(TraceStep::new("a", RoutingMethod::LlmRouter)),
        );
        monitor.ingest(
            RouterTrace::new("t2", "s1")
                .with_agent("general")
                .with_confidence(0.5)
                .with_error("no route"),
        );

        assert_eq!(monitor.stats().total_traces, 2);

        monitor
            .update_filters(FilterUpdate::new().with_agent("lease"))
            .unwrap();
        let stats = monitor.stats();
        assert_eq!(stats.total_traces, 1);
        assert_eq!(stats.success_rate_percent, 100.0);
        assert_eq!(ids(&monitor.filtered_history()), vec!["t1"]);
        assert_eq!(monitor.history().len(), 2);
    }

    #[test]
    fn test_connection_error_is_retained_after_close() {
        let monitor = TraceMonitor::default();
        monitor.set_connection_state(ConnectionState::Connecting);
        monitor.set_connection_state(ConnectionState::Error("refused".into()));
        monitor.set_connection_state(ConnectionState::Disconnected);

        assert_eq!(monitor.connection_state(), ConnectionState::Disconnected);
        assert_eq!(monitor.last_error().as_deref(), Some("refused"));

        monitor.set_connection_state(ConnectionState::Connected);
        assert!(monitor.last_error().is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let monitor = TraceMonitor::default();
        let mut events = monitor.subscribe();

        monitor.ingest(RouterTrace::new("t1", "s1"));
        monitor.clear_history();

        assert_eq!(
            events.try_recv().unwrap(),
            MonitorEvent::TraceAdded { trace_id: "t1".into() }
        );
        assert_eq!(events.try_recv().unwrap(), MonitorEvent::HistoryCleared);
    }

    #[test]
    fn test_followed_ingest_publishes_after_state_is_released() {
        let monitor = Arc::new(TraceMonitor::default());
        monitor.set_panel_open(true);
        let mut events = monitor.subscribe();

        let reader = {
            let monitor = monitor.clone();
            std::thread::spawn(move || {
                let first = events.blocking_recv().unwrap();
                let seen = (monitor.history().len(), monitor.active_trace_id());
                let second = events.blocking_recv().unwrap();
                (first, seen, second)
            })
        };

        assert!(monitor.ingest(RouterTrace::new("t1", "s1")));
        let (first, seen, second) = reader.join().unwrap();

        assert_eq!(first, MonitorEvent::TraceAdded { trace_id: "t1".into() });
        assert_eq!(seen, (1, Some("t1".to_string())));
        assert_eq!(second, MonitorEvent::ActiveTraceChanged(Some("t1".into())));
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let monitor = TraceMonitor::default();
        monitor.set_panel_open(true);
        monitor.ingest(RouterTrace::new("t1", "s1").with_agent("lease"));
        monitor.ingest(RouterTrace::new("t2", "s1").with_agent("general"));
        monitor
            .update_filters(FilterUpdate::new().with_agent("general"))
            .unwrap();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(ids(&snapshot.filtered), vec!["t2"]);
        assert_eq!(snapshot.stats.total_traces, 1);
        assert_eq!(snapshot.active.map(|t| t.id), Some("t2".to_string()));
    }
}
