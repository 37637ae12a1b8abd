//! Event emitter abstraction for decoupling the recovery engine from the
//! event log's concrete storage.

use super::EventLog;

/// Trait for emitting a human-readable event without knowledge of storage.
///
/// The recovery engine depends on this trait rather than `EventLog`
/// directly, decoupling it from how entries are eventually surfaced (the
/// out-of-scope admin REST surface reads snapshots from the log this
/// emitter writes to).
pub trait EventEmitter: Send + Sync {
    /// Records a human-readable event.
    fn emit(&self, message: &str);
}

impl EventEmitter for EventLog {
    fn emit(&self, message: &str) {
        self.push(message);
    }
}

/// No-op emitter for tests that don't care about the event log.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _message: &str) {}
}

/// Logging emitter that only forwards to `log`, useful when no in-memory
/// log is wired up (e.g. a component under test in isolation).
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, message: &str) {
        log::info!("[Event] {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_implements_emitter() {
        let log = EventLog::new();
        log.emit("recovery resolved");
        assert_eq!(log.snapshot().len(), 1);
    }
}
