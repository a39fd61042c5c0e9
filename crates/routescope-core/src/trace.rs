//! Router trace types as delivered on the live trace channel.

use crate::CoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Mechanism that produced a step's routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    /// Large-model based routing.
    LlmRouter,
    /// Pattern based routing.
    Regex,
    /// Default route when nothing else matched.
    Fallback,
}

impl RoutingMethod {
    pub const ALL: [RoutingMethod; 3] = [
        RoutingMethod::LlmRouter,
        RoutingMethod::Regex,
        RoutingMethod::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMethod::LlmRouter => "llm_router",
            RoutingMethod::Regex => "regex",
            RoutingMethod::Fallback => "fallback",
        }
    }
}

impl FromStr for RoutingMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm_router" => Ok(RoutingMethod::LlmRouter),
            "regex" => Ok(RoutingMethod::Regex),
            "fallback" => Ok(RoutingMethod::Fallback),
            other => Err(CoreError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decision point within a routing trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Unique step identifier.
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    /// Event time (ISO-8601).
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: String,
    /// Stage label, e.g. "intent_classification".
    #[serde(default, deserialize_with = "lenient")]
    pub step: String,
    /// Agent chosen at this step.
    #[serde(default, deserialize_with = "lenient")]
    pub agent: String,
    /// Confidence as a fraction in [0.0, 1.0].
    #[serde(default, deserialize_with = "lenient")]
    pub confidence: f64,
    /// Classified intent label.
    #[serde(default, deserialize_with = "lenient")]
    pub intent: String,
    /// Routing method that produced this step.
    pub method: RoutingMethod,
    /// Milliseconds spent in this step.
    #[serde(default, deserialize_with = "lenient")]
    pub latency_ms: f64,
    /// Opaque extra data, never interpreted here.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl TraceStep {
    pub fn new(id: impl Into<String>, method: RoutingMethod) -> Self {
        Self {
            id: id.into(),
            timestamp: String::new(),
            step: String::new(),
            agent: String::new(),
            confidence: 0.0,
            intent: String::new(),
            method,
            latency_ms: 0.0,
            metadata: None,
        }
    }

    pub fn with_stage(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// One complete routing decision, the unit of ingestion.
///
/// Only `id` and `sessionId` are required on the wire. Every other field
/// falls back to its default when missing, `null` or of the wrong type, so
/// partially populated traces are still kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTrace {
    /// Trace identifier. Not unique across the history.
    pub id: String,
    /// Conversation session this trace belongs to.
    pub session_id: String,
    /// Original input text.
    #[serde(default, deserialize_with = "lenient")]
    pub query: String,
    /// Creation time (ISO-8601).
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: String,
    /// End-to-end latency in milliseconds.
    #[serde(default, deserialize_with = "lenient")]
    pub total_latency_ms: f64,
    /// Agent ultimately selected.
    #[serde(default, deserialize_with = "lenient")]
    pub final_agent: String,
    /// Final confidence as a fraction in [0.0, 1.0].
    #[serde(default, deserialize_with = "lenient")]
    pub final_confidence: f64,
    #[serde(default = "default_true", deserialize_with = "lenient_success")]
    pub success: bool,
    /// Failure message, only meaningful when `success` is false.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Steps in execution order. Entries that do not decode are skipped.
    #[serde(default, deserialize_with = "lenient_steps")]
    pub steps: Vec<TraceStep>,
}

fn default_true() -> bool {
    true
}

/// Decodes an optional field, falling back to its default on `null` or a
/// value of the wrong type.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_success<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_bool().unwrap_or(true))
}

fn lenient_steps<'de, D>(deserializer: D) -> Result<Vec<TraceStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl RouterTrace {
    /// Creates a successful trace with no steps.
    pub fn new(id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            query: String::new(),
            timestamp: String::new(),
            total_latency_ms: 0.0,
            final_agent: String::new(),
            final_confidence: 0.0,
            success: true,
            error: None,
            steps: Vec::new(),
        }
    }

    /// Parses a JSON payload into a trace.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        if raw.trim().is_empty() {
            return Err(CoreError::EmptyPayload);
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.final_agent = agent.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.final_confidence = confidence;
        self
    }

    pub fn with_latency(mut self, total_latency_ms: f64) -> Self {
        self.total_latency_ms = total_latency_ms;
        self
    }

    /// Marks the trace as failed with the given message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    pub fn with_step(mut self, step: TraceStep) -> Self {
        self.steps.push(step);
        self
    }

    /// True when any step was decided by `method`.
    pub fn uses_method(&self, method: RoutingMethod) -> bool {
        self.steps.iter().any(|s| s.method == method)
    }
}
