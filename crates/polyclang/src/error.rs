//! Error types for client orchestration

use polyclang_process::ProcessError;
use thiserror::Error;

/// Errors raised while routing documents and supervising server clients
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered a request with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    ResponseError { code: i32, message: String },

    /// Framing or message-level protocol violation
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The server process could not be started or stopped
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The connection to the server is gone
    #[error("Connection closed")]
    ConnectionClosed,

    /// The supervisor has no live connection
    #[error("Client for {folder} is not running")]
    NotRunning { folder: String },

    /// Request did not complete in time
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// No client became ready to restart
    #[error("No client became ready within {timeout_ms}ms")]
    NotReady { timeout_ms: u64 },

    /// Command invoked with arguments of the wrong shape
    #[error("Invalid arguments for {command}: {reason}")]
    InvalidCommandArgs { command: String, reason: String },

    /// Command name is not registered
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Settings could not be read or are invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether this failure came back from the server as an error response
    pub fn is_response_error(&self) -> bool {
        matches!(self, ClientError::ResponseError { .. })
    }
}

/// Result type for client orchestration
pub type Result<T> = std::result::Result<T, ClientError>;
