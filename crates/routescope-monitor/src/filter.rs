//! Declarative filters over the trace history.

use crate::MonitorError;
use routescope_core::{RouterTrace, RoutingMethod};
use serde::{Deserialize, Serialize};

/// Active filter constraints. `None` means no constraint on that dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    /// Exact, case-sensitive match on `finalAgent`.
    #[serde(default)]
    pub agent: Option<String>,
    /// At least one step must use this method.
    #[serde(default)]
    pub method: Option<RoutingMethod>,
    /// Inclusive lower bound on `finalConfidence`.
    #[serde(default)]
    pub min_confidence: f64,
    /// When false, failed traces are hidden.
    #[serde(default = "default_true")]
    pub show_errors: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            agent: None,
            method: None,
            min_confidence: 0.0,
            show_errors: true,
        }
    }
}

impl FilterSpec {
    /// True when `trace` satisfies every active constraint.
    pub fn matches(&self, trace: &RouterTrace) -> bool {
        if let Some(ref agent) = self.agent {
            if trace.final_agent != *agent {
                return false;
            }
        }

        if let Some(method) = self.method {
            if !trace.uses_method(method) {
                return false;
            }
        }

        if trace.final_confidence < self.min_confidence {
            return false;
        }

        self.show_errors || trace.success
    }

    /// Merges a partial update. Nothing changes if the update is invalid.
    pub fn apply(&mut self, update: FilterUpdate) -> Result<(), MonitorError> {
        if let Some(min) = update.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(MonitorError::InvalidFilter(format!(
                    "minConfidence must be within [0, 1], got {}",
                    min
                )));
            }
        }

        if let Some(agent) = update.agent {
            self.agent = agent;
        }
        if let Some(method) = update.method {
            self.method = method;
        }
        if let Some(min) = update.min_confidence {
            self.min_confidence = min;
        }
        if let Some(show) = update.show_errors {
            self.show_errors = show;
        }
        Ok(())
    }
}

/// Field-by-field update for a [`FilterSpec`]. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterUpdate {
    agent: Option<Option<String>>,
    method: Option<Option<RoutingMethod>>,
    min_confidence: Option<f64>,
    show_errors: Option<bool>,
}

impl FilterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(Some(agent.into()));
        self
    }

    /// Removes the agent constraint.
    pub fn any_agent(mut self) -> Self {
        self.agent = Some(None);
        self
    }

    pub fn with_method(mut self, method: RoutingMethod) -> Self {
        self.method = Some(Some(method));
        self
    }

    /// Removes the method constraint.
    pub fn any_method(mut self) -> Self {
        self.method = Some(None);
        self
    }

    pub fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    pub fn with_show_errors(mut self, show: bool) -> Self {
        self.show_errors = Some(show);
        self
    }
}

impl From<FilterSpec> for FilterUpdate {
    /// Replaces every field of the target spec.
    fn from(spec: FilterSpec) -> Self {
        Self {
            agent: Some(spec.agent),
            method: Some(spec.method),
            min_confidence: Some(spec.min_confidence),
            show_errors: Some(spec.show_errors),
        }
    }
}

/// Returns the traces matching `spec`, preserving input order.
pub fn apply_filters<'a, I>(traces: I, spec: &FilterSpec) -> Vec<RouterTrace>
where
    I: IntoIterator<Item = &'a RouterTrace>,
{
    traces
        .into_iter()
        .filter(|t| spec.matches(t))
        .cloned()
        .collect()
}
