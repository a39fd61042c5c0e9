//! Bounded, newest-first trace history.

use routescope_core::RouterTrace;
use std::collections::VecDeque;

/// Default number of traces kept in memory.
pub const DEFAULT_MAX_TRACES: usize = 100;

/// In-memory trace history, most recently inserted first.
///
/// The length never exceeds the capacity after an insert. Capacity changes
/// are applied lazily: a smaller bound only trims on the next insert.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    traces: VecDeque<RouterTrace>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACES)
    }
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            traces: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_TRACES)),
            capacity,
        }
    }

    /// Prepends a trace and trims the oldest entries past capacity.
    ///
    /// Returns how many traces were evicted. Traces sharing an id are kept
    /// as separate entries.
    pub fn insert(&mut self, trace: RouterTrace) -> usize {
        self.traces.push_front(trace);
        let evicted = self.traces.len().saturating_sub(self.capacity);
        self.traces.truncate(self.capacity);
        evicted
    }

    pub fn clear(&mut self) {
        self.traces.clear();
    }

    /// Updates the bound used by future inserts.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Iterates newest first.
    pub fn iter(&self) -> impl Iterator<Item = &RouterTrace> {
        self.traces.iter()
    }

    /// Finds a trace by id. With duplicate ids the newest one wins.
    pub fn get(&self, id: &str) -> Option<&RouterTrace> {
        self.traces.iter().find(|t| t.id == id)
    }

    pub fn to_vec(&self) -> Vec<RouterTrace> {
        self.traces.iter().cloned().collect()
    }
}
