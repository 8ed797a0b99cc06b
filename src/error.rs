//! Error types for the MCP server.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge errors.
///
/// The first seven variants are the failures a tool invocation can end in;
/// they never escape the dispatcher and are reported to the agent as tool
/// results. The rest are transport-level problems of the MCP server itself.
#[derive(Error, Debug)]
pub enum Error {
    /// No tool is registered under this name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments do not match the tool's parameter schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// An SDK-mode tool was called while no SDK app is connected.
    #[error("no active SDK connection; call sdk_connect first")]
    NoActiveConnection,

    /// The runner could not be reached (connection refused, DNS failure).
    #[error("cannot reach runner at {url}: {reason}")]
    BackendUnreachable {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        reason: String,
    },

    /// The runner did not answer within the request timeout.
    #[error("runner request to {url} timed out after {}ms", .timeout.as_millis())]
    BackendTimeout {
        /// Request URL.
        url: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The runner answered with a non-2xx status.
    #[error("runner returned HTTP {status}: {body}")]
    BackendError {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The runner answered 2xx with a body that is not JSON.
    #[error("malformed runner response: {0}")]
    BackendProtocolError(String),

    /// JSON-RPC protocol error.
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Closed set of failure kinds surfaced in tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// See [`Error::UnknownTool`].
    UnknownTool,
    /// See [`Error::InvalidArguments`].
    InvalidArguments,
    /// See [`Error::NoActiveConnection`].
    NoActiveConnection,
    /// See [`Error::BackendUnreachable`].
    BackendUnreachable,
    /// See [`Error::BackendTimeout`].
    BackendTimeout,
    /// See [`Error::BackendError`].
    BackendError,
    /// See [`Error::BackendProtocolError`].
    BackendProtocolError,
    /// Anything else; indicates a bug in the bridge rather than misuse.
    Internal,
}

impl ErrorKind {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::NoActiveConnection => "NoActiveConnection",
            ErrorKind::BackendUnreachable => "BackendUnreachable",
            ErrorKind::BackendTimeout => "BackendTimeout",
            ErrorKind::BackendError => "BackendError",
            ErrorKind::BackendProtocolError => "BackendProtocolError",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Whether the failure was decided locally, without talking to the runner.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownTool | ErrorKind::InvalidArguments | ErrorKind::NoActiveConnection
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Tool-result kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownTool(_) => ErrorKind::UnknownTool,
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::NoActiveConnection => ErrorKind::NoActiveConnection,
            Error::BackendUnreachable { .. } => ErrorKind::BackendUnreachable,
            Error::BackendTimeout { .. } => ErrorKind::BackendTimeout,
            Error::BackendError { .. } => ErrorKind::BackendError,
            Error::BackendProtocolError(_) => ErrorKind::BackendProtocolError,
            Error::JsonRpc { .. } | Error::Serialization(_) | Error::Io(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::JsonRpc { code, .. } => *code,
            Error::UnknownTool(_) => codes::METHOD_NOT_FOUND,
            Error::InvalidArguments(_) => codes::INVALID_PARAMS,
            Error::NoActiveConnection => -32000,
            Error::BackendUnreachable { .. } => -32001,
            Error::BackendTimeout { .. } => -32002,
            Error::BackendError { .. } => -32003,
            Error::BackendProtocolError(_) => -32004,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::Io(_) => -32005,
            Error::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Extra structured detail for the agent, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::BackendError { status, body } => Some(serde_json::json!({
                "status": status,
                "body": body,
            })),
            Error::BackendTimeout { timeout, .. } => Some(serde_json::json!({
                "timeout_ms": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })),
            Error::BackendUnreachable { url, .. } => Some(serde_json::json!({ "url": url })),
            _ => None,
        }
    }
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_kinds_are_flagged() {
        assert!(Error::UnknownTool("x".into()).kind().is_local());
        assert!(Error::InvalidArguments("x".into()).kind().is_local());
        assert!(Error::NoActiveConnection.kind().is_local());
        assert!(!Error::BackendProtocolError("x".into()).kind().is_local());
    }

    #[test]
    fn backend_error_carries_status_and_body() {
        let err = Error::BackendError {
            status: 503,
            body: "runner busy".into(),
        };
        assert_eq!(err.kind(), ErrorKind::BackendError);
        assert_eq!(err.to_string(), "runner returned HTTP 503: runner busy");
        let details = err.details().unwrap();
        assert_eq!(details["status"], 503);
        assert_eq!(details["body"], "runner busy");
    }

    #[test]
    fn timeout_message_uses_millis() {
        let err = Error::BackendTimeout {
            url: "http://localhost:9876/health".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(err.kind(), ErrorKind::BackendTimeout);
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn kind_serializes_as_pascal_case() {
        let json = serde_json::to_value(ErrorKind::NoActiveConnection).unwrap();
        assert_eq!(json, "NoActiveConnection");
        assert_eq!(ErrorKind::BackendTimeout.to_string(), "BackendTimeout");
    }

    #[test]
    fn protocol_errors_map_to_internal_kind() {
        let err = Error::Internal("boom".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
    }
}
