//! Error types for the flood domain generator.

use thiserror::Error;

/// Result type alias using HydroError.
pub type HydroResult<T> = Result<T, HydroError>;

/// Primary error type for shared operations.
#[derive(Debug, Error)]
pub enum HydroError {
    // === Message Errors ===
    #[error("Invalid queue message: {0}")]
    InvalidMessage(String),

    // === Identifier Errors ===
    #[error("Invalid location identifier: {0:?}")]
    InvalidLid(String),

    #[error("Invalid reach identifier: {0:?}")]
    InvalidReachId(String),

    // === Infrastructure Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for HydroError {
    fn from(err: serde_json::Error) -> Self {
        HydroError::InternalError(format!("JSON error: {}", err))
    }
}
