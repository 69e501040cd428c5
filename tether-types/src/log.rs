//! Log levels and the application log sink.
//!
//! The engine emits structured `tracing` events for its own observability;
//! the level/callback pair here is the application-facing mirror of that
//! stream, for embedders that route agent logs into their own sink.

use serde::{Deserialize, Serialize};

/// Severity of a log message, most severe first.
///
/// The ordering supports threshold filtering: a message is delivered when
/// `level <= threshold`, so a threshold of [`LogLevel::Info`] passes
/// errors, warnings, and informational messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// The operation failed and the agent may be degraded.
    Error,
    /// Something unexpected happened but the agent continues.
    Warning,
    /// Normal lifecycle events.
    Info,
    /// Detail useful when diagnosing a deployment.
    Debug,
    /// Per-request detail.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// The application-registered log sink.
///
/// Called with the message level and the formatted message. May be invoked
/// from any worker; implementations must be quick and must not call back
/// into the agent.
pub type LogCallback = dyn Fn(LogLevel, &str) + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_supports_threshold_filtering() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);

        let threshold = LogLevel::Info;
        assert!(LogLevel::Error <= threshold);
        assert!(LogLevel::Trace > threshold);
    }
}
