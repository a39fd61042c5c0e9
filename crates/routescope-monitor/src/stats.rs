//! Aggregate statistics over a (filtered) set of traces.

use routescope_core::{RouterTrace, RoutingMethod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary metrics for the traces a consumer currently sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStats {
    pub total_traces: usize,
    /// Mean end-to-end latency, two decimals.
    pub avg_latency_ms: f64,
    /// Mean final confidence scaled to a percentage, two decimals.
    pub avg_confidence_percent: f64,
    /// Share of successful traces as a percentage, two decimals.
    pub success_rate_percent: f64,
    /// Trace count per final agent.
    pub agent_distribution: BTreeMap<String, usize>,
    /// Step count per routing method, summed over every step of every trace.
    pub method_distribution: BTreeMap<RoutingMethod, usize>,
}

impl TraceStats {
    /// Aggregates `traces`. An empty input yields all zeros.
    pub fn compute<'a, I>(traces: I) -> Self
    where
        I: IntoIterator<Item = &'a RouterTrace>,
    {
        let mut stats = TraceStats::default();
        let mut latency_sum = 0.0;
        let mut confidence_sum = 0.0;
        let mut successes = 0usize;

        for trace in traces {
            stats.total_traces += 1;
            latency_sum += trace.total_latency_ms;
            confidence_sum += trace.final_confidence;
            if trace.success {
                successes += 1;
            }

            *stats
                .agent_distribution
                .entry(trace.final_agent.clone())
                .or_insert(0) += 1;

            for step in &trace.steps {
                *stats.method_distribution.entry(step.method).or_insert(0) += 1;
            }
        }

        if stats.total_traces == 0 {
            return stats;
        }

        let n = stats.total_traces as f64;
        stats.avg_latency_ms = round2(latency_sum / n);
        stats.avg_confidence_percent = round2(confidence_sum / n * 100.0);
        stats.success_rate_percent = round2(successes as f64 / n * 100.0);
        stats
    }

    pub fn method_count(&self, method: RoutingMethod) -> usize {
        self.method_distribution.get(&method).copied().unwrap_or(0)
    }
}

/// Rounds half away from zero to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
