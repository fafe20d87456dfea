//! Error types for feature operations.

use hobart_data::DataError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type for feature operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Errors that can occur while deriving, persisting or normalizing features.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// No rows matched the requested entity, industry or period
    #[error("No data: {0}")]
    NoData(String),

    /// A wide table lacks required feature columns
    #[error("Schema mismatch, missing columns: {}", missing.join(", "))]
    SchemaMismatch {
        /// Required columns that were absent
        missing: Vec<String>,
    },

    /// Missing or mutually exclusive arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Rows were written twice without clearing
    #[error("Duplicate write for {entity} into {table}")]
    DuplicateWrite {
        /// Entity whose rows collided
        entity: String,
        /// Table that rejected the write
        table: String,
    },

    /// Storage error
    #[error("Data error: {0}")]
    Data(#[source] DataError),

    /// DataFrame query error
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl From<DataError> for FeatureError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::MissingData { entity, reason } => {
                Self::NoData(format!("{}: {}", entity, reason))
            }
            DataError::UnknownEntity(entity) => {
                Self::NoData(format!("{}: no classification code", entity))
            }
            DataError::DuplicateWrite { entity, table } => Self::DuplicateWrite { entity, table },
            other => Self::Data(other),
        }
    }
}
