//! Error types for server process management

use std::io;
use thiserror::Error;

/// Server process errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started
    #[error("Failed to spawn server process: {0}")]
    SpawnFailed(#[from] io::Error),

    /// The executable could not be located
    #[error("Server executable not found: {executable}")]
    ExecutableNotFound { executable: String },

    /// The process did not exit within its grace period
    #[error("Server process did not exit within {millis}ms")]
    Timeout { millis: u64 },

    /// Failed to kill the process
    #[error("Failed to kill server process: {0}")]
    KillFailed(String),

    /// A stdio handle was requested twice or never piped
    #[error("Server process {stream} is unavailable")]
    StreamUnavailable { stream: &'static str },

    /// Invalid command configuration
    #[error("Invalid server command: {0}")]
    InvalidCommand(String),
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
