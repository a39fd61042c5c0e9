//! Live trace channel client for routescope.
//!
//! [`ConnectionManager`] opens the per-session trace channel over a
//! [`Transport`] (the WebSocket [`WsTransport`] in production) and feeds
//! every inbound message into a shared [`TraceMonitor`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use routescope_client::{ClientConfig, ConnectionManager, WsTransport};
//! use routescope_monitor::TraceMonitor;
//!
//! # async fn run() -> Result<(), routescope_client::ClientError> {
//! let monitor = Arc::new(TraceMonitor::default());
//! let manager = ConnectionManager::new(ClientConfig::from_env(), WsTransport::new(), monitor.clone());
//! manager.connect("session-1")?;
//! // ... later
//! println!("{:?}", monitor.stats());
//! manager.disconnect();
//! # Ok(())
//! # }
//! ```
//!
//! [`TraceMonitor`]: routescope_monitor::TraceMonitor

mod config;
mod connection;
mod transport;

pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TRACE_PATH};
pub use connection::ConnectionManager;
pub use transport::{Transport, TransportEvent, TransportEvents, WsTransport};

use thiserror::Error;

/// Errors from connection commands.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Session id must not be empty")]
    InvalidSessionId,

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("connect must be called from within a Tokio runtime")]
    NoRuntime,

    #[error("No previous session to reconnect to")]
    NoSession,

    #[error("Lock error")]
    Lock,
}
