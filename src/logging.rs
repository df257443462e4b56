//! Run logging
//!
//! Processing functions never log through a global logger. Each batch run owns a
//! [`LogSink`] and passes it down explicitly, so a run's diagnostics can be sent to
//! `tracing`, captured in memory, or both.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured log event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub level: Level,
    /// Processing stage that produced the event (e.g. "basal", "discovery")
    pub stage: &'static str,
    pub message: String,
    /// Structured key/value context
    pub fields: Vec<(String, String)>,
}

impl LogEvent {
    pub fn new(level: Level, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            stage,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn debug(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(Level::Debug, stage, message)
    }

    pub fn info(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(Level::Info, stage, message)
    }

    pub fn warn(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(Level::Warn, stage, message)
    }

    pub fn error(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(Level::Error, stage, message)
    }

    /// Attach a key/value pair
    pub fn field(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.fields.push((key.to_string(), value.to_string()));
        self
    }

    /// Look up a field value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Destination for a run's log events
pub trait LogSink {
    fn emit(&mut self, event: LogEvent);
}

/// Forwards events to `tracing`, tagged with the run id
pub struct TracingSink {
    run_id: Uuid,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingSink {
    /// Start a new run with a fresh run id
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl LogSink for TracingSink {
    fn emit(&mut self, event: LogEvent) {
        let fields = event.render_fields();
        let run_id = self.run_id;
        let stage = event.stage;
        match event.level {
            Level::Debug => {
                tracing::debug!(%run_id, stage, fields = %fields, "{}", event.message)
            }
            Level::Info => {
                tracing::info!(%run_id, stage, fields = %fields, "{}", event.message)
            }
            Level::Warn => {
                tracing::warn!(%run_id, stage, fields = %fields, "{}", event.message)
            }
            Level::Error => {
                tracing::error!(%run_id, stage, fields = %fields, "{}", event.message)
            }
        }
    }
}

/// Captures events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<LogEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Number of events at the given level
    pub fn count(&self, level: Level) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    /// Events from one stage
    pub fn stage(&self, stage: &str) -> Vec<&LogEvent> {
        self.events.iter().filter(|e| e.stage == stage).collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&mut self, event: LogEvent) {
        self.events.push(event);
    }
}
