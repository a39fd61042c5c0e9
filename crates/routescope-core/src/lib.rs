//! Core domain types and error definitions for routescope.
//!
//! This crate provides the types shared by the monitor and client crates:
//!
//! - [`RouterTrace`] and [`TraceStep`] - One routing decision and its stages
//! - [`RoutingMethod`] - How a step reached its decision
//! - [`ConnectionState`] - Lifecycle of the live trace connection
//! - [`CoreError`] - Decode and parse failures
//!
//! # Example
//!
//! ```rust
//! use routescope_core::{RouterTrace, RoutingMethod, TraceStep};
//!
//! let trace = RouterTrace::new("t1", "session-1")
//!     .with_agent("lease")
//!     .with_confidence(0.92)
//!     .with_step(TraceStep::new("s1", RoutingMethod::LlmRouter));
//!
//! assert!(trace.uses_method(RoutingMethod::LlmRouter));
//! ```

mod trace;

pub use trace::{RouterTrace, RoutingMethod, TraceStep};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding trace payloads.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The payload was empty or whitespace only.
    #[error("Empty payload")]
    EmptyPayload,

    /// The payload was not a JSON object with the router trace shape.
    #[error("Failed to decode router trace: {0}")]
    Decode(#[from] serde_json::Error),

    /// Unrecognized routing method label.
    #[error("Unknown routing method: {0}")]
    UnknownMethod(String),
}

/// Lifecycle of the live trace connection.
///
/// Exactly one state holds at a time. `Error` carries the transport's
/// message; the transport usually follows it with a close, which moves the
/// state on to `Disconnected`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error(_) => "error",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Returns the transport error message when in the `Error` state.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ConnectionState::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Error(message) => write!(f, "error: {}", message),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_connected());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        let err = ConnectionState::Error("socket reset".to_string());
        assert_eq!(err.to_string(), "error: socket reset");
        assert_eq!(err.error_message(), Some("socket reset"));
        assert_eq!(ConnectionState::Connected.error_message(), None);
    }

    #[test]
    fn test_connection_state_serializes_tagged() {
        let json = serde_json::to_value(ConnectionState::Error("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "error", "message": "boom"}));

        let json = serde_json::to_value(ConnectionState::Connected).unwrap();
        assert_eq!(json, serde_json::json!({"status": "connected"}));
    }
}
