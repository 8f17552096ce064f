//! Error types for forecast-core

use crate::forecast::ForecastResult;
use thiserror::Error;

/// Result type alias for forecast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type returned by the public entry points of the engine
///
/// Per-model adapter failures never surface here; they are captured inside
/// each [`ForecastResult`]. Only structurally invalid calls, data access
/// failures and comparisons without any usable model are reported as errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed series, horizon or model selection
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown option key or unsupported option value
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Backend could not be reached or refused the request
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Every requested model failed; the per-model results are kept
    #[error("All {} models failed", .results.len())]
    AllModelsFailed {
        /// One failed result per requested model, in selection order
        results: Vec<ForecastResult>,
    },

    /// The data store failed while fetching a series
    #[error("Data store error: {0}")]
    DataStoreError(String),

    /// The requested series does not exist or has no data in range
    #[error("Not found: {0}")]
    NotFound(String),

    /// Forecasts handed to the comparison engine do not share horizon or series
    #[error("Alignment mismatch: {0}")]
    AlignmentMismatch(String),

    /// Invalid engine or adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
