//! Error types for email segregation

use std::time::Duration;
use thiserror::Error;

/// An exception raised inside the foreign engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while segregating email content
#[derive(Error, Debug)]
pub enum SegregationError {
    /// No usable engine handle exists for the calling thread
    #[error("Failed to initialize engine handle: {0}")]
    Initialization(String),

    /// The calling thread's handle exists but cannot be reached right now,
    /// either because it is already borrowed further up the stack or because
    /// the thread is being torn down
    #[error("Engine handle unavailable: {0}")]
    HandleUnavailable(&'static str),

    /// The engine returned a value whose shape does not match the operation
    #[error("Unexpected {found} returned from {operation}, expected {expected}")]
    ProtocolViolation {
        operation: &'static str,
        expected: &'static str,
        found: String,
    },

    /// The engine raised while executing an operation
    #[error("Engine call {operation} failed: {source}")]
    Invocation {
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    /// The call did not finish within the caller's time limit
    #[error("{operation} did not complete within {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The job panicked on its worker; the worker's handle was torn down
    #[error("{operation} panicked: {message}")]
    JobPanicked {
        operation: &'static str,
        message: String,
    },

    /// The worker pool is shut down
    #[error("Worker pool is closed")]
    PoolClosed,

    /// Startup configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A raw message could not be parsed
    #[error("Failed to parse message: {0}")]
    Message(String),
}

impl SegregationError {
    /// Whether repeating the call could succeed.
    ///
    /// Only timeouts qualify: the timed-out handle is torn down, so a retry
    /// runs against a fresh one.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for segregation operations
pub type Result<T> = std::result::Result<T, SegregationError>;
