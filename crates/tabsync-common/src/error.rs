//! Error types for tabsync

use thiserror::Error;

/// Result type alias for tabsync operations
pub type Result<T> = std::result::Result<T, TabsyncError>;

/// Main error type for tabsync
#[derive(Error, Debug)]
pub enum TabsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Batch commit failed after {attempts} attempts: {message}")]
    CommitFailed { attempts: u32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
