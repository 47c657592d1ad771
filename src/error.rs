//! Error types for port mapping operations
//!
//! Three families surface to callers:
//! - `ParseError` for malformed port map strings
//! - `StoreError` for property and config storage failures
//! - validation errors (`InvalidFormat`, `UnknownProperty`) for bad trigger input

use thiserror::Error;

/// A port map string that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid port map {input}: {reason}")]
pub struct ParseError {
    /// The offending input entry
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

impl ParseError {
    pub fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the property store and config collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite backend failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store could not service the request.
    #[error("Property store unavailable: {0}")]
    Unavailable(String),

    /// A stored value that cannot be decoded.
    #[error("Corrupt property {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Unable to encode property: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors returned by ports triggers.
#[derive(Debug, Error)]
pub enum PortsError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Output format other than `stdout` or `json`.
    #[error("Invalid format specified: {0}")]
    InvalidFormat(String),

    /// Property key the ports plugin does not expose.
    #[error("Invalid ports property specified: {0}")]
    UnknownProperty(String),

    /// A stored scalar property that should hold a port but doesn't.
    #[error("Invalid value for ports property {key}: {value}")]
    InvalidPropertyValue { key: String, value: String },

    #[error("Unable to marshal port mapping: {0}")]
    Encode(#[from] serde_json::Error),

    /// No ephemeral port at or above the configured minimum could be bound.
    #[error("No available port found at or above {0}")]
    NoAvailablePort(u16),
}

impl From<rusqlite::Error> for PortsError {
    fn from(err: rusqlite::Error) -> Self {
        PortsError::Store(StoreError::Sqlite(err))
    }
}

/// Result type for ports operations.
pub type PortsResult<T> = Result<T, PortsError>;

/// Result of a best-effort cleanup step.
///
/// Teardown paths never fail the caller; anything that went wrong is handed
/// back as a `Warning` so it can be logged or asserted on.
#[derive(Debug)]
pub enum CleanupOutcome {
    Completed,
    Warning(PortsError),
}

impl CleanupOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(self, CleanupOutcome::Warning(_))
    }
}
