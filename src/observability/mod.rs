//! Observability: typed events, structured logging, and the event sink
//!
//! The core notifies an [`EventSink`] about notable moments (attribute
//! resolved, document conformed, index selected). Notifications are
//! fire-and-forget: a missing or failing sink never affects core results,
//! so sink implementations must not panic and must swallow their own I/O
//! errors.

pub mod events;
pub mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

use std::sync::Arc;

/// Receiver for structured event notifications
pub trait EventSink: Send + Sync {
    /// Delivers one event with its fields; must not fail or panic
    fn emit(&self, event: Event, fields: &[(&str, &str)]);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event, _fields: &[(&str, &str)]) {}
}

/// Sink that writes events through the structured JSON logger
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event, fields: &[(&str, &str)]) {
        // Logger writes are already error-swallowing
        Logger::info(event.as_str(), fields);
    }
}

/// Shared handle to a sink; defaults to the null sink
pub fn null_sink() -> Arc<dyn EventSink> {
    Arc::new(NullSink)
}
