//! Pluggable log sink.
//!
//! The pipeline reports one record per call through a [`Logger`]. The default
//! [`TracingLogger`] forwards records to `tracing`; applications with their
//! own logging stack implement the trait instead.

use std::fmt;
use std::sync::Arc;

use crate::CallContext;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal completion.
    Info,
    /// Client-side failure (4xx).
    Warn,
    /// Server or transport failure.
    Error,
}

/// Structured key/value attached to a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub key: &'static str,
    /// Rendered value.
    pub value: String,
}

impl Field {
    /// Create a field, rendering `value` with `Display`.
    pub fn new(key: &'static str, value: impl fmt::Display) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Log sink used by [`LoggingLayer`](crate::middleware::LoggingLayer).
pub trait Logger: Send + Sync {
    /// Emit one record.
    fn log(&self, level: LogLevel, context: &CallContext, message: &str, fields: &[Field]);

    /// A logger that adds `fields` to every record.
    fn with(&self, fields: Vec<Field>) -> Arc<dyn Logger>;

    /// Emit at [`LogLevel::Debug`].
    fn debug(&self, context: &CallContext, message: &str, fields: &[Field]) {
        self.log(LogLevel::Debug, context, message, fields);
    }

    /// Emit at [`LogLevel::Info`].
    fn info(&self, context: &CallContext, message: &str, fields: &[Field]) {
        self.log(LogLevel::Info, context, message, fields);
    }

    /// Emit at [`LogLevel::Warn`].
    fn warn(&self, context: &CallContext, message: &str, fields: &[Field]) {
        self.log(LogLevel::Warn, context, message, fields);
    }

    /// Emit at [`LogLevel::Error`].
    fn error(&self, context: &CallContext, message: &str, fields: &[Field]) {
        self.log(LogLevel::Error, context, message, fields);
    }
}

/// Forwards records to `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    fields: Vec<Field>,
}

impl TracingLogger {
    /// Create a logger with no extra fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, _context: &CallContext, message: &str, fields: &[Field]) {
        let fields = self
            .fields
            .iter()
            .chain(fields)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        match level {
            LogLevel::Debug => tracing::debug!(%fields, "{message}"),
            LogLevel::Info => tracing::info!(%fields, "{message}"),
            LogLevel::Warn => tracing::warn!(%fields, "{message}"),
            LogLevel::Error => tracing::error!(%fields, "{message}"),
        }
    }

    fn with(&self, fields: Vec<Field>) -> Arc<dyn Logger> {
        let mut all = self.fields.clone();
        all.extend(fields);
        Arc::new(Self { fields: all })
    }
}
