//! Error types for memscout.
//!
//! Fallible internal operations return [`MemscoutError`] through the usual
//! `Result`/`?` machinery. At the public [`Session`](crate::session::Session)
//! surface each failure is collapsed into a compact sticky [`ErrorCode`]
//! that gates further active operations until the caller clears it.

use thiserror::Error;

/// Main error type for memscout operations.
#[derive(Debug, Error)]
pub enum MemscoutError {
    /// A soft capacity on one of the session collections was exceeded
    #[error("capacity exceeded: {resource} ({used}/{limit})")]
    CapacityExceeded {
        resource: &'static str,
        used: usize,
        limit: usize,
    },

    /// Pattern text that does not follow the mini-language
    #[error("invalid pattern {text:?}: {message}")]
    InvalidPattern { text: String, message: String },

    /// An operation needed attachment but no process criterion is set
    #[error("no process criterion configured")]
    MissingCriterion,

    /// A numeric field in an address-space map line could not be parsed
    #[error("malformed address-space line: {0:?}")]
    MalformedRegion(String),

    /// Process-wait deadline exceeded
    #[error("timed out after {seconds}s waiting for a matching process")]
    Timeout { seconds: u64 },

    /// OS introspection surface could not be opened or read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A positioned memory read came back shorter than requested
    #[error("short read at {addr:#x}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        addr: u64,
        wanted: usize,
        got: usize,
    },
}

/// Result type alias for memscout operations
pub type Result<T> = std::result::Result<T, MemscoutError>;

/// Sticky failure taxonomy stored on a session.
///
/// Every [`MemscoutError`] maps onto one of these codes; while a code is
/// pending, active operations on the session are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Collection capacity exhausted or allocation failure
    OutOfMemory,
    /// Missing criterion, malformed pattern text, malformed numeric field
    InvalidArgument,
    /// A required OS resource could not be opened or read
    Io,
    /// Process-wait deadline exceeded
    Timeout,
}

impl ErrorCode {
    /// Human-readable text for the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::OutOfMemory => "out of memory",
            ErrorCode::InvalidArgument => "invalid parameter(s)",
            ErrorCode::Io => "i/o error",
            ErrorCode::Timeout => "timed out",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MemscoutError {
    /// The sticky code this error collapses into at the session surface.
    pub fn code(&self) -> ErrorCode {
        match self {
            MemscoutError::CapacityExceeded { .. } => ErrorCode::OutOfMemory,
            MemscoutError::InvalidPattern { .. }
            | MemscoutError::MissingCriterion
            | MemscoutError::MalformedRegion(_) => ErrorCode::InvalidArgument,
            MemscoutError::Io(_) | MemscoutError::ShortRead { .. } => ErrorCode::Io,
            MemscoutError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}

/// Map an optional sticky code to human-readable text ("no error" when clear).
pub fn describe(code: Option<ErrorCode>) -> &'static str {
    match code {
        None => "no error",
        Some(code) => code.as_str(),
    }
}
