//! Error types for Temporal-FS

use thiserror::Error;

/// Result type alias for Temporal-FS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Temporal-FS
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid file source configuration (raised before any I/O)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller violated an input contract, e.g. an inverted or non-UTC time range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A single physical file could not be read
    #[error("Read error: {0}")]
    Read(String),

    /// Out-of-memory class failure; never swallowed
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The operation was cancelled by its caller
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error must abort the whole operation instead of being
    /// logged and skipped at file granularity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ResourceExhausted(_) | Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Other(format!("worker task failed: {e}"))
    }
}
