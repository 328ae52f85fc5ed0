//! Injected logging capability for lifecycle and audit messages.

use std::sync::{Arc, Mutex};

/// Leveled sink for operational messages.
///
/// Calls must return promptly; the control loop invokes this inline.
pub trait EventLog: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards to the `log` facade, tagging each line with its source.
#[derive(Debug, Clone)]
pub struct LogEventLog {
    source: String,
}

impl LogEventLog {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl EventLog for LogEventLog {
    fn info(&self, message: &str) {
        log::info!("[{}] {}", self.source, message);
    }

    fn warn(&self, message: &str) {
        log::warn!("[{}] {}", self.source, message);
    }

    fn error(&self, message: &str) {
        log::error!("[{}] {}", self.source, message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// Keeps every entry in memory. Used to assert on what was reported.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventLog {
    entries: Arc<Mutex<Vec<(Level, String)>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }
}

impl EventLog for MemoryEventLog {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}
