use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use routescope_client::{ClientConfig, ConnectionManager, WsTransport};
use routescope_core::ConnectionState;
use routescope_monitor::{MonitorEvent, MonitorSettings, TraceMonitor};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

fn settings_from_env() -> MonitorSettings {
    let settings = MonitorSettings::default();
    match env::var("ROUTESCOPE_MAX_TRACES").ok().map(|v| v.parse::<usize>()) {
        Some(Ok(max)) if max > 0 => settings.with_max_traces(max),
        Some(_) => {
            warn!("Ignoring invalid ROUTESCOPE_MAX_TRACES");
            settings
        }
        None => settings,
    }
}

/// True once the connection has settled on `Disconnected`. A lagging
/// subscriber may have missed the event that said so.
fn channel_closed(monitor: &TraceMonitor) -> bool {
    monitor.connection_state() == ConnectionState::Disconnected
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let session_id = env::args()
        .nth(1)
        .context("usage: routescope-tail <session-id>")?;

    let monitor = Arc::new(TraceMonitor::new(settings_from_env()));
    let mut events = monitor.subscribe();

    let manager = ConnectionManager::new(ClientConfig::from_env(), WsTransport::new(), monitor.clone());
    manager.connect(&session_id)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::TraceAdded { trace_id }) => {
                    let stats = monitor.stats();
                    info!(
                        trace_id = %trace_id,
                        total = stats.total_traces,
                        avg_latency_ms = stats.avg_latency_ms,
                        avg_confidence = stats.avg_confidence_percent,
                        success_rate = stats.success_rate_percent,
                        "Trace received"
                    );
                }
                Ok(MonitorEvent::ConnectionChanged(ConnectionState::Disconnected)) => {
                    match monitor.last_error() {
                        Some(error) => warn!("Trace channel closed: {}", error),
                        None => info!("Trace channel closed"),
                    }
                    break;
                }
                Ok(MonitorEvent::ConnectionChanged(state)) => info!(state = %state, "Connection state"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                    if channel_closed(&monitor) {
                        info!("Trace channel closed while lagging");
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    manager.disconnect();

    let summary = serde_json::to_string_pretty(&monitor.stats())?;
    info!("Final stats:\n{}", summary);

    Ok(())
}
