//! Forecast adapter trait definition
//!
//! An adapter translates the normalized [`ForecastRequest`] into one
//! backend's native call and maps the answer back into a [`ForecastResult`].
//! Adapters capture every failure in the returned result; they never panic
//! across this boundary and never retry on their own.

use async_trait::async_trait;
use forecast_core::{FailureKind, ForecastRequest, ForecastResult, ModelId, ModelOptions};
use std::time::Duration;

/// Option key shared by every adapter: two-sided prediction interval level
pub const CONFIDENCE_INTERVAL: &str = "confidence_interval";

/// Limits an adapter advertises to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterCapabilities {
    /// Largest horizon the backend accepts
    pub max_horizon: usize,
    /// Deadline for a single call
    pub timeout: Duration,
    /// Option keys the adapter understands
    pub options: Vec<String>,
}

impl AdapterCapabilities {
    pub fn new(max_horizon: usize, timeout: Duration) -> Self {
        Self {
            max_horizon,
            timeout,
            options: vec![CONFIDENCE_INTERVAL.to_string()],
        }
    }

    /// Add accepted option keys
    pub fn with_options<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.options.iter().any(|k| k == key)
    }
}

/// Trait for forecasting backends
///
/// Implementations must be safe to call concurrently, both alongside other
/// adapters and with themselves for different requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastAdapter: Send + Sync {
    /// Identifier the adapter is registered under
    fn model_id(&self) -> &ModelId;

    /// Advertised limits
    fn capabilities(&self) -> &AdapterCapabilities;

    /// Produce a forecast, capturing any failure in the result
    async fn forecast(&self, request: &ForecastRequest) -> ForecastResult;
}

/// Failure captured inside an adapter before it becomes a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnsupportedConfiguration, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BackendUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    /// Turn the failure into the result value returned to the orchestrator
    pub fn into_result(self, model: &ModelId, request: &ForecastRequest) -> ForecastResult {
        ForecastResult::failed(model.clone(), request, self.kind, self.message)
    }
}

/// Check the request against the adapter's declared limits
///
/// Empty series and a zero horizon are invalid input; a horizon above the
/// adapter's maximum and unknown option keys are unsupported configuration.
pub fn validate_request(
    capabilities: &AdapterCapabilities,
    request: &ForecastRequest,
) -> Result<(), Failure> {
    if request.series.is_empty() {
        return Err(Failure::invalid_input(format!(
            "series {} has no observations",
            request.series.id()
        )));
    }

    if request.horizon == 0 {
        return Err(Failure::invalid_input("horizon must be at least 1"));
    }

    if request.horizon > capabilities.max_horizon {
        return Err(Failure::unsupported(format!(
            "horizon {} exceeds the maximum of {}",
            request.horizon, capabilities.max_horizon
        )));
    }

    if let Some(key) = request.options.keys().find(|k| !capabilities.accepts(k)) {
        return Err(Failure::unsupported(format!("unknown option '{key}'")));
    }

    Ok(())
}

/// Read a numeric option
pub fn option_f64(options: &ModelOptions, key: &str) -> Result<Option<f64>, Failure> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| Failure::unsupported(format!("option '{key}' must be a number, got {value}"))),
    }
}

/// Read a positive integer option
pub fn option_usize(options: &ModelOptions, key: &str) -> Result<Option<usize>, Failure> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v > 0)
            .map(Some)
            .ok_or_else(|| {
                Failure::unsupported(format!("option '{key}' must be a positive integer, got {value}"))
            }),
    }
}

/// Read the confidence level, which must lie strictly between 0 and 1
pub fn confidence_level(options: &ModelOptions) -> Result<Option<f64>, Failure> {
    match option_f64(options, CONFIDENCE_INTERVAL)? {
        Some(level) if level <= 0.0 || level >= 1.0 => Err(Failure::unsupported(format!(
            "option '{CONFIDENCE_INTERVAL}' must be between 0 and 1, got {level}"
        ))),
        level => Ok(level),
    }
}
