//! The semantic error kinds shared by every public entry point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an agent operation failed.
///
/// One flat set of semantic kinds rather than per-module enums: the same
/// kind can surface from several subsystems (a pool, the queue, and the
/// option store all report [`Status::Full`]), and transports forward the
/// kind to the cloud unchanged.
///
/// [`Status::describe`] maps every kind to a stable English descriptor for
/// logs and completion payloads.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A nullable argument was null or a value was out of range.
    #[error("invalid parameter")]
    BadParameter,

    /// An invariant-violating combination: type mismatch, illegal name,
    /// required parameter missing.
    #[error("bad request")]
    BadRequest,

    /// The named item, option, or action does not exist.
    #[error("not found")]
    NotFound,

    /// The operation requires a registered or connected state that has not
    /// been reached.
    #[error("not initialized")]
    NotInitialized,

    /// A bounded pool or queue is at capacity.
    #[error("no more space available")]
    Full,

    /// An allocation failed.
    #[error("out of memory")]
    NoMemory,

    /// A bounded wait elapsed.
    #[error("timed out")]
    TimedOut,

    /// The transport plugin reported a non-specific error.
    #[error("internal failure")]
    Failure,

    /// An input/output operation failed.
    #[error("input/output error")]
    IoError,

    /// A file could not be opened.
    #[error("failed to open file")]
    FileOpenFailed,

    /// The registered command path is not an executable file.
    #[error("file is not executable")]
    NotExecutable,

    /// Stored or received data could not be parsed.
    #[error("error parsing data")]
    ParseError,

    /// An external command could not be executed or exited abnormally.
    #[error("error executing command")]
    ExecutionError,
}

impl Status {
    /// Stable English descriptor for this kind.
    ///
    /// Identical to the `Display` output for every known kind; variants
    /// added in future versions (the enum is `#[non_exhaustive]`) render as
    /// `"unknown error"` so downstream match arms never have to change.
    pub fn describe(&self) -> &'static str {
        #[allow(unreachable_patterns)]
        match self {
            Status::BadParameter => "invalid parameter",
            Status::BadRequest => "bad request",
            Status::NotFound => "not found",
            Status::NotInitialized => "not initialized",
            Status::Full => "no more space available",
            Status::NoMemory => "out of memory",
            Status::TimedOut => "timed out",
            Status::Failure => "internal failure",
            Status::IoError => "input/output error",
            Status::FileOpenFailed => "failed to open file",
            Status::NotExecutable => "file is not executable",
            Status::ParseError => "error parsing data",
            Status::ExecutionError => "error executing command",
            _ => "unknown error",
        }
    }
}
