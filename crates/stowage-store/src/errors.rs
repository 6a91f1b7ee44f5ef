//! Error handling for stowage-store
//!
//! Wraps stowage-core ExError with store-specific helpers

use stowage_core::errors::{ExError, ExErrorKind, StowageError};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::StatementExecution)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a statement error carrying the rejected statement text
pub fn statement_failed(sql: &str, err: rusqlite::Error) -> ExError {
    StowageError::StatementFailed {
        sql: sql.to_string(),
        reason: err.to_string(),
    }
    .into()
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// Create a configuration parse error
pub fn config_error(source: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("config_load")
        .with_message(format!("Invalid store configuration in {}: {}", source, reason))
}
