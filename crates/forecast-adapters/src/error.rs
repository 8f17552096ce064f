//! Error types for adapter construction
//!
//! Forecast calls never return these: call failures travel inside
//! [`forecast_core::ForecastResult`]. These cover building adapters and the
//! registry from configuration.

use forecast_core::ModelId;
use thiserror::Error;

/// Result type for adapter setup
pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// Missing or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Two adapters registered under one identifier
    #[error("Model '{0}' is registered more than once")]
    DuplicateModel(ModelId),

    /// Service URL could not be parsed
    #[error("Invalid service URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP client could not be built
    #[cfg(feature = "remote")]
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<AdapterError> for forecast_core::Error {
    fn from(err: AdapterError) -> Self {
        forecast_core::Error::Config(err.to_string())
    }
}
