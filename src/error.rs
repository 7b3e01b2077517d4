//! Error types for nudge
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, empty task text, bad config)
//! - 3: Daemon unavailable (nothing listening on the control socket)
//! - 4: Operation failed (model, parse, persistence, io)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the nudge CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const DAEMON_UNAVAILABLE: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for nudge operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Daemon reachability (exit code 3)
    #[error("Daemon not reachable at {0}")]
    DaemonUnavailable(PathBuf),

    // Operation failures (exit code 4)
    #[error("Model error: {0}")]
    Model(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Page closed: {0}")]
    PageClosed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::InvalidConfig(_) => exit_codes::USER_ERROR,

            Error::DaemonUnavailable(_) => exit_codes::DAEMON_UNAVAILABLE,

            Error::Model(_)
            | Error::Parse(_)
            | Error::Persistence(_)
            | Error::PageClosed(_)
            | Error::Protocol(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::LockFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Short machine-readable kind, used on the wire and in JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::InvalidConfig(_) => "invalid_config",
            Error::DaemonUnavailable(_) => "daemon_unavailable",
            Error::Model(_) => "model_error",
            Error::Parse(_) => "parse_error",
            Error::Persistence(_) => "persistence_error",
            Error::PageClosed(_) => "page_closed",
            Error::Protocol(_) => "protocol_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::TomlParse(_) => "toml_error",
            Error::LockFailed(_) => "lock_failed",
        }
    }

    /// Rebuild an error from its wire form (kind + message)
    ///
    /// Variants that wrap foreign error types come back as `Protocol`.
    pub fn from_wire(kind: &str, message: String) -> Self {
        match kind {
            "invalid_argument" => Error::InvalidArgument(message),
            "invalid_config" => Error::InvalidConfig(message),
            "model_error" => Error::Model(message),
            "parse_error" => Error::Parse(message),
            "persistence_error" => Error::Persistence(message),
            "page_closed" => Error::PageClosed(message),
            _ => Error::Protocol(message),
        }
    }

    /// Message without the kind prefix, as carried on the control socket
    pub fn wire_message(&self) -> String {
        match self {
            Error::InvalidArgument(msg)
            | Error::InvalidConfig(msg)
            | Error::Model(msg)
            | Error::Parse(msg)
            | Error::Persistence(msg)
            | Error::PageClosed(msg)
            | Error::Protocol(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Optional structured details for JSON output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::DaemonUnavailable(path) | Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path.to_string_lossy() }))
            }
            _ => None,
        }
    }
}

/// Result type alias for nudge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
