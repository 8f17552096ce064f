//! Error types for series repository operations

use thiserror::Error;

/// Series repository specific errors
#[derive(Debug, Error)]
pub enum SeriesError {
    /// Series does not exist or has no observations in the requested range
    #[error("Series not found: {0}")]
    NotFound(String),

    /// Requested date range is malformed
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// Stored data could not be turned into a valid series
    #[error("Data store error: {0}")]
    DataStore(String),

    /// IO error while reading the data store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, SeriesError>;

/// Convert SeriesError to forecast_core::Error
impl From<SeriesError> for forecast_core::Error {
    fn from(err: SeriesError) -> Self {
        match err {
            SeriesError::NotFound(msg) => forecast_core::Error::NotFound(msg),
            SeriesError::InvalidRange(msg) => forecast_core::Error::InvalidInput(msg),
            other => forecast_core::Error::DataStoreError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SeriesError::NotFound("pce".to_string());
        assert_eq!(err.to_string(), "Series not found: pce");
    }

    #[test]
    fn test_error_conversion() {
        let core_err: forecast_core::Error = SeriesError::NotFound("pce".to_string()).into();
        assert!(matches!(core_err, forecast_core::Error::NotFound(msg) if msg == "pce"));

        let core_err: forecast_core::Error =
            SeriesError::DataStore("duplicate date".to_string()).into();
        match core_err {
            forecast_core::Error::DataStoreError(msg) => assert!(msg.contains("duplicate date")),
            other => panic!("Expected DataStoreError, got {other:?}"),
        }
    }
}
