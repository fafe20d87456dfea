//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Missing data
    #[error("Missing data for {entity}: {reason}")]
    MissingData {
        /// Entity that was queried
        entity: String,
        /// Reason for missing data
        reason: String,
    },

    /// Rows for an entity were written twice without clearing them first
    #[error("Duplicate write for {entity} into {table}")]
    DuplicateWrite {
        /// Entity whose rows collided
        entity: String,
        /// Table that rejected the write
        table: String,
    },

    /// Entity has no submission metadata
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    /// Shorthand for a [`DataError::MissingData`].
    pub fn missing(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingData {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}
