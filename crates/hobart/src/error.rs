//! Error types for orchestration.

use hobart_data::DataError;
use hobart_features::FeatureError;
use thiserror::Error;

/// Result type for orchestration.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or running installs.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage or source error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Feature pipeline error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
