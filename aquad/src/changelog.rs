//! Append-only change logs and the clock that stamps them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Timestamp format of every log entry.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of log timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn timestamp(&self) -> String;
}

/// Wall-clock local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Always returns the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedClock(pub String);

impl FixedClock {
    pub fn new(timestamp: impl Into<String>) -> Self {
        FixedClock(timestamp.into())
    }
}

impl Clock for FixedClock {
    fn timestamp(&self) -> String {
        self.0.clone()
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

/// An ordered history of `(timestamp, message)` entries. Entries are only ever
/// appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeLog(Vec<LogEntry>);

impl ChangeLog {
    pub fn new() -> Self {
        ChangeLog(Vec::new())
    }

    /// Stamps `message` with `clock` and appends it.
    pub fn record(&mut self, clock: &dyn Clock, message: impl Into<String>) {
        self.push(LogEntry {
            timestamp: clock.timestamp(),
            message: message.into(),
        });
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.0
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a LogEntry;
    type IntoIter = std::slice::Iter<'a, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_with_injected_clock() {
        let clock = FixedClock::new("2024-01-02 03:04:05");
        let mut log = ChangeLog::new();
        log.record(&clock, "Initial Train");
        log.record(&clock, "Rebuild");

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].message, "Initial Train");
        assert_eq!(log.last().map(|e| e.message.as_str()), Some("Rebuild"));
        assert!(log.iter().all(|e| e.timestamp == "2024-01-02 03:04:05"));

        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(
            json,
            r#"[{"timestamp":"2024-01-02 03:04:05","message":"Initial Train"},{"timestamp":"2024-01-02 03:04:05","message":"Rebuild"}]"#
        );
        assert_eq!(serde_json::from_str::<ChangeLog>(&json).unwrap(), log);
    }

    #[test]
    fn system_clock_uses_the_log_format() {
        let stamp = SystemClock.timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).is_ok());
    }
}
