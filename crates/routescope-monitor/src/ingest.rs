//! Decoding of raw channel messages into router traces.
//!
//! The trace channel also carries keep-alives and other control traffic, so
//! anything that does not decode as a trace is dropped without surfacing an
//! error.

use routescope_core::RouterTrace;

/// Decodes one inbound message, returning `None` for anything that is not a
/// router trace.
pub fn decode_trace(raw: &str) -> Option<RouterTrace> {
    let mut trace = match RouterTrace::from_json(raw) {
        Ok(trace) => trace,
        Err(e) => {
            tracing::debug!(len = raw.len(), "Discarding non-trace message: {}", e);
            return None;
        }
    };

    if trace.success && trace.error.is_some() {
        tracing::debug!(trace_id = %trace.id, "Dropping error message on successful trace");
        trace.error = None;
    }

    Some(trace)
}
