//! Bounded in-memory event log, and the emitter abstraction services use
//! to publish to it without knowing about transport concerns.

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

use crate::protocol_constants::EVENT_LOG_CAPACITY;
use crate::util::now_unix_millis;

/// A single entry in the bounded event-log ring.
#[derive(Debug, Clone, Serialize)]
pub struct EventLogEntry {
    pub timestamp: u128,
    pub message: String,
}

/// FIFO ring buffer capped at [`EVENT_LOG_CAPACITY`] entries.
///
/// This is the only record of recovery activity kept beyond the process's
/// lifetime of in-flight state; it is not itself persisted to disk.
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<VecDeque<EventLogEntry>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, evicting the oldest one if at capacity.
    pub fn push(&self, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() >= EVENT_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(EventLogEntry {
            timestamp: now_unix_millis(),
            message: message.into(),
        });
    }

    /// Returns a defensive snapshot of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<EventLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_entry_past_capacity() {
        let log = EventLog::new();
        for i in 0..EVENT_LOG_CAPACITY + 10 {
            log.push(format!("entry {i}"));
        }
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), EVENT_LOG_CAPACITY);
        assert_eq!(snapshot.first().unwrap().message, "entry 10");
        assert_eq!(
            snapshot.last().unwrap().message,
            format!("entry {}", EVENT_LOG_CAPACITY + 9)
        );
    }

    #[test]
    fn snapshot_is_a_defensive_copy() {
        let log = EventLog::new();
        log.push("first");
        let snapshot = log.snapshot();
        log.push("second");
        assert_eq!(snapshot.len(), 1);
    }
}
