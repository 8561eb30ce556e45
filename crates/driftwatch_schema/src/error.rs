//! Errors for the schema engine.
//!
//! Only stop-the-world conditions live here. Data drifting away from the
//! schema is never an error: it is reported as a `Description` with a
//! `Severity` inside an `UpdateReport`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema is already initialized")]
    AlreadyInitialized,

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid statistics for column '{column}': {reason}")]
    InvalidStatistics { column: String, reason: String },

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchemaError {
    pub(crate) fn invalid_statistics(column: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidStatistics {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
