//! Endpoint configuration for the live trace channel.

use crate::ClientError;
use std::env;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TRACE_PATH: &str = "/debug/router-trace/{session_id}";

const SESSION_PLACEHOLDER: &str = "{session_id}";

/// Where to find the trace channel for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Origin of the trace server. `http`/`https` are mapped to `ws`/`wss`.
    pub base_url: String,
    /// Path appended to the base, with `{session_id}` substituted.
    pub path_template: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path_template: DEFAULT_TRACE_PATH.to_string(),
        }
    }

    pub fn with_path_template(mut self, template: impl Into<String>) -> Self {
        self.path_template = template.into();
        self
    }

    /// Reads `ROUTESCOPE_BASE_URL` and `ROUTESCOPE_TRACE_PATH`, falling back
    /// to the defaults.
    pub fn from_env() -> Self {
        let base_url = env::var("ROUTESCOPE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let path_template =
            env::var("ROUTESCOPE_TRACE_PATH").unwrap_or_else(|_| DEFAULT_TRACE_PATH.into());
        Self {
            base_url,
            path_template,
        }
    }

    /// Builds the WebSocket endpoint for `session_id`.
    pub fn endpoint_for(&self, session_id: &str) -> Result<Url, ClientError> {
        if session_id.trim().is_empty() {
            return Err(ClientError::InvalidSessionId);
        }

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{}: {}", self.base_url, e)))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::InvalidBaseUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidBaseUrl(format!("cannot use scheme '{}'", scheme)))?;

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.clone()))?;
            segments.pop_if_empty();
            for part in self.path_template.split('/').filter(|p| !p.is_empty()) {
                if part == SESSION_PLACEHOLDER {
                    segments.push(session_id);
                } else {
                    segments.push(part);
                }
            }
        }

        Ok(url)
    }
}
