//! Forecast request and result types
//!
//! Every adapter, whatever its backend, answers a [`ForecastRequest`] with one
//! [`ForecastResult`]. Failures are values: a failed model still produces a
//! result carrying a [`FailureKind`] so that callers never need to know
//! backend-specific error types.

use crate::series::{SeriesId, TimeSeries};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a registered forecasting model (e.g. "xgboost", "naive")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-model options, e.g. `{"confidence_interval": 0.95}`
///
/// Keys are validated by the adapter that receives them.
pub type ModelOptions = BTreeMap<String, serde_json::Value>;

/// Input handed to one adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    /// Historical series, shared read-only between adapters
    pub series: TimeSeries,
    /// Number of future periods to forecast
    pub horizon: usize,
    /// Options for the receiving model
    #[serde(default)]
    pub options: ModelOptions,
}

impl ForecastRequest {
    pub fn new(series: TimeSeries, horizon: usize) -> Self {
        Self {
            series,
            horizon,
            options: ModelOptions::new(),
        }
    }

    /// Replace the option map
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Set a single option
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// One forecast step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub estimate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl ForecastPoint {
    pub fn new(timestamp: DateTime<Utc>, estimate: f64) -> Self {
        Self {
            timestamp,
            estimate,
            lower: None,
            upper: None,
        }
    }

    /// Attach a prediction interval
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    /// Apply a value mapping to the estimate and both bounds
    pub fn map_values(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            timestamp: self.timestamp,
            estimate: f(self.estimate),
            lower: self.lower.map(&f),
            upper: self.upper.map(&f),
        }
    }
}

/// Reason an adapter could not produce a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed series or horizon
    InvalidInput,
    /// Unknown option key/value, or horizon above the adapter's limit
    UnsupportedConfiguration,
    /// Network, authentication or server failure
    BackendUnavailable,
    /// The call did not finish within its deadline
    Timeout,
    /// The backend answered with output that breaks the result contract
    MalformedResponse,
}

impl FailureKind {
    /// Whether retrying can change the outcome
    ///
    /// Validation outcomes are deterministic and never retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::BackendUnavailable | Self::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidInput => "InvalidInput",
            Self::UnsupportedConfiguration => "UnsupportedConfiguration",
            Self::BackendUnavailable => "BackendUnavailable",
            Self::Timeout => "Timeout",
            Self::MalformedResponse => "MalformedResponse",
        };
        f.write_str(name)
    }
}

/// Outcome of one adapter call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastStatus {
    /// All requested periods were forecast
    Success,
    /// Fewer periods than requested were forecast
    Partial { reason: String },
    /// No usable forecast
    Failed { kind: FailureKind, message: String },
}

impl ForecastStatus {
    /// Success or partial success
    pub fn is_usable(&self) -> bool {
        !self.is_failed()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Normalized forecast produced by exactly one adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    /// Model that produced the forecast
    pub model: ModelId,
    /// Series the forecast was made from
    pub series_id: SeriesId,
    /// Requested horizon
    pub horizon: usize,
    /// Forecast steps in time order
    pub points: Vec<ForecastPoint>,
    pub status: ForecastStatus,
    /// Number of calls made to the backend (1 without retries)
    pub attempts: u32,
}

impl ForecastResult {
    /// Successful result; marked partial when it covers less than the horizon
    pub fn success(model: ModelId, request: &ForecastRequest, points: Vec<ForecastPoint>) -> Self {
        let status = if points.len() < request.horizon {
            ForecastStatus::Partial {
                reason: format!(
                    "{} of {} periods forecast",
                    points.len(),
                    request.horizon
                ),
            }
        } else {
            ForecastStatus::Success
        };

        Self {
            model,
            series_id: request.series.id().clone(),
            horizon: request.horizon,
            points,
            status,
            attempts: 1,
        }
    }

    /// Failed result with no points
    pub fn failed(
        model: ModelId,
        request: &ForecastRequest,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model,
            series_id: request.series.id().clone(),
            horizon: request.horizon,
            points: Vec::new(),
            status: ForecastStatus::Failed {
                kind,
                message: message.into(),
            },
            attempts: 1,
        }
    }

    /// Record how many backend calls were made
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.status.failure_kind()
    }
}
