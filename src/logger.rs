use std::fmt;

/// Severity attached to a log line emitted by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum LogLevel {
    /// Request bodies and transport-level retries; only with `debug` set.
    Debug,
    /// A call that recovered after outer retries.
    Info,
    /// A failed attempt that is about to be retried.
    Warn,
    /// Invalid configuration values that were replaced by defaults.
    Error,
}

/// Sink for the client's diagnostic output.
///
/// The client always calls its logger unconditionally; whether anything is
/// written is decided by the implementation.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards log lines to `tracing` under the `circonus_api` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "circonus_api", "{message}"),
            LogLevel::Info => tracing::info!(target: "circonus_api", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "circonus_api", "{message}"),
            LogLevel::Error => tracing::error!(target: "circonus_api", "{message}"),
        }
    }
}

/// Drops every log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardLogger;

impl Logger for DiscardLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<logger>")
    }
}
