//! Local statistical baselines
//!
//! These models run in-process and need no backend. They give every
//! comparison a cheap reference point and make the orchestrator usable
//! without network access.
//!
//! Prediction intervals assume normally distributed one-step errors: the
//! standard deviation is the RMSE of the in-sample one-step residuals and
//! widens with the square root of the step.

use crate::adapter::{
    AdapterCapabilities, Failure, ForecastAdapter, confidence_level, option_f64, option_usize,
};
use async_trait::async_trait;
use forecast_core::{ForecastPoint, ForecastRequest, ForecastResult, ModelId, ModelOptions};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_LOCAL_MAX_HORIZON: usize = 120;
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_PERIOD: usize = 12;
pub const DEFAULT_WINDOW: usize = 3;
pub const DEFAULT_ALPHA: f64 = 0.3;
pub const DEFAULT_HOLT_ALPHA: f64 = 0.5;
pub const DEFAULT_HOLT_BETA: f64 = 0.3;

/// Built-in baseline model and its default parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalModel {
    /// Repeat the last observation
    Naive,
    /// Repeat the last full season
    SeasonalNaive { period: usize },
    /// Extend the line between the first and last observations
    Drift,
    /// Mean of the last `window` observations
    MovingAverage { window: usize },
    /// Simple exponential smoothing
    ExponentialSmoothing { alpha: f64 },
    /// Holt's linear trend method
    HoltLinear { alpha: f64, beta: f64 },
}

impl LocalModel {
    pub fn seasonal_naive() -> Self {
        Self::SeasonalNaive {
            period: DEFAULT_PERIOD,
        }
    }

    pub fn moving_average() -> Self {
        Self::MovingAverage {
            window: DEFAULT_WINDOW,
        }
    }

    pub fn exponential_smoothing() -> Self {
        Self::ExponentialSmoothing {
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn holt_linear() -> Self {
        Self::HoltLinear {
            alpha: DEFAULT_HOLT_ALPHA,
            beta: DEFAULT_HOLT_BETA,
        }
    }

    /// Option keys this model accepts as parameter overrides
    pub fn option_keys(&self) -> &'static [&'static str] {
        match self {
            Self::Naive | Self::Drift => &[],
            Self::SeasonalNaive { .. } => &["period"],
            Self::MovingAverage { .. } => &["window"],
            Self::ExponentialSmoothing { .. } => &["alpha"],
            Self::HoltLinear { .. } => &["alpha", "beta"],
        }
    }

    /// Apply per-request parameter overrides
    pub fn with_overrides(self, options: &ModelOptions) -> Result<Self, Failure> {
        let model = match self {
            Self::SeasonalNaive { period } => Self::SeasonalNaive {
                period: option_usize(options, "period")?.unwrap_or(period),
            },
            Self::MovingAverage { window } => Self::MovingAverage {
                window: option_usize(options, "window")?.unwrap_or(window),
            },
            Self::ExponentialSmoothing { alpha } => Self::ExponentialSmoothing {
                alpha: option_f64(options, "alpha")?.unwrap_or(alpha),
            },
            Self::HoltLinear { alpha, beta } => Self::HoltLinear {
                alpha: option_f64(options, "alpha")?.unwrap_or(alpha),
                beta: option_f64(options, "beta")?.unwrap_or(beta),
            },
            other => other,
        };
        model.validate()?;
        Ok(model)
    }

    /// Reject parameter values outside their valid range
    pub fn validate(&self) -> Result<(), Failure> {
        let smoothing = |name: &str, value: f64| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(Failure::unsupported(format!(
                    "{name} must be in (0, 1], got {value}"
                )))
            }
        };

        match *self {
            Self::SeasonalNaive { period: 0 } => Err(Failure::unsupported("period must be positive")),
            Self::MovingAverage { window: 0 } => Err(Failure::unsupported("window must be positive")),
            Self::ExponentialSmoothing { alpha } => smoothing("alpha", alpha),
            Self::HoltLinear { alpha, beta } => {
                smoothing("alpha", alpha)?;
                smoothing("beta", beta)
            }
            _ => Ok(()),
        }
    }

    /// Fit on `values` and forecast `horizon` steps
    pub fn fit(&self, values: &[f64], horizon: usize) -> Result<Fit, Failure> {
        let n = values.len();
        let need = |min: usize| {
            if n < min {
                Err(Failure::invalid_input(format!(
                    "{self:?} needs at least {min} observations, got {n}"
                )))
            } else {
                Ok(())
            }
        };

        let fit = match *self {
            Self::Naive => {
                need(1)?;
                let last = values[n - 1];
                Fit {
                    estimates: vec![last; horizon],
                    residuals: values.windows(2).map(|w| w[1] - w[0]).collect(),
                }
            }
            Self::SeasonalNaive { period } => {
                need(period)?;
                let season = &values[n - period..];
                Fit {
                    estimates: (0..horizon).map(|k| season[k % period]).collect(),
                    residuals: (period..n).map(|t| values[t] - values[t - period]).collect(),
                }
            }
            Self::Drift => {
                need(2)?;
                let slope = (values[n - 1] - values[0]) / (n - 1) as f64;
                Fit {
                    estimates: (1..=horizon)
                        .map(|k| values[n - 1] + slope * k as f64)
                        .collect(),
                    residuals: values.windows(2).map(|w| w[1] - w[0] - slope).collect(),
                }
            }
            Self::MovingAverage { window } => {
                need(window)?;
                let mean = |slice: &[f64]| slice.iter().sum::<f64>() / slice.len() as f64;
                Fit {
                    estimates: vec![mean(&values[n - window..]); horizon],
                    residuals: (window..n)
                        .map(|t| values[t] - mean(&values[t - window..t]))
                        .collect(),
                }
            }
            Self::ExponentialSmoothing { alpha } => {
                need(1)?;
                let mut level = values[0];
                let mut residuals = Vec::with_capacity(n.saturating_sub(1));
                for &value in &values[1..] {
                    residuals.push(value - level);
                    level = alpha * value + (1.0 - alpha) * level;
                }
                Fit {
                    estimates: vec![level; horizon],
                    residuals,
                }
            }
            Self::HoltLinear { alpha, beta } => {
                need(2)?;
                let mut level = values[0];
                let mut trend = values[1] - values[0];
                let mut residuals = Vec::with_capacity(n - 1);
                for &value in &values[1..] {
                    let predicted = level + trend;
                    residuals.push(value - predicted);
                    let previous = level;
                    level = alpha * value + (1.0 - alpha) * predicted;
                    trend = beta * (level - previous) + (1.0 - beta) * trend;
                }
                Fit {
                    estimates: (1..=horizon).map(|k| level + trend * k as f64).collect(),
                    residuals,
                }
            }
        };
        Ok(fit)
    }
}

/// Point forecasts and the in-sample one-step residuals behind them
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub estimates: Vec<f64>,
    pub residuals: Vec<f64>,
}

impl Fit {
    /// Root mean square of the one-step residuals
    pub fn sigma(&self) -> Option<f64> {
        if self.residuals.is_empty() {
            return None;
        }
        let mse = self.residuals.iter().map(|r| r * r).sum::<f64>() / self.residuals.len() as f64;
        Some(mse.sqrt())
    }

    /// `(lower, upper)` for each step at the given two-sided level
    pub fn intervals(&self, level: f64) -> Option<Vec<(f64, f64)>> {
        let sigma = self.sigma()?;
        let normal = Normal::new(0.0, 1.0).ok()?;
        let z = normal.inverse_cdf(0.5 + level / 2.0);

        Some(
            self.estimates
                .iter()
                .enumerate()
                .map(|(i, &estimate)| {
                    let spread = z * sigma * ((i + 1) as f64).sqrt();
                    (estimate - spread, estimate + spread)
                })
                .collect(),
        )
    }
}

/// Adapter running a [`LocalModel`] in-process
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    id: ModelId,
    model: LocalModel,
    capabilities: AdapterCapabilities,
}

impl LocalAdapter {
    pub fn new(id: impl Into<ModelId>, model: LocalModel) -> Self {
        let capabilities = AdapterCapabilities::new(DEFAULT_LOCAL_MAX_HORIZON, DEFAULT_LOCAL_TIMEOUT)
            .with_options(model.option_keys().iter().copied());
        Self {
            id: id.into(),
            model,
            capabilities,
        }
    }

    pub fn with_max_horizon(mut self, max_horizon: usize) -> Self {
        self.capabilities.max_horizon = max_horizon;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.capabilities.timeout = timeout;
        self
    }

    pub fn model(&self) -> LocalModel {
        self.model
    }

    fn run(&self, request: &ForecastRequest) -> Result<Vec<ForecastPoint>, Failure> {
        crate::adapter::validate_request(&self.capabilities, request)?;
        let level = confidence_level(&request.options)?;
        let model = self.model.with_overrides(&request.options)?;

        let timestamps = request.series.future_timestamps(request.horizon).ok_or_else(|| {
            Failure::invalid_input(format!(
                "cannot infer a regular cadence for series {}",
                request.series.id()
            ))
        })?;

        let fit = model.fit(&request.series.values(), request.horizon)?;
        let intervals = level.and_then(|level| fit.intervals(level));

        let points = timestamps
            .into_iter()
            .zip(&fit.estimates)
            .enumerate()
            .map(|(i, (timestamp, &estimate))| {
                let point = ForecastPoint::new(timestamp, estimate);
                match intervals.as_ref().map(|bounds| bounds[i]) {
                    Some((lower, upper)) => point.with_bounds(lower, upper),
                    None => point,
                }
            })
            .collect();
        Ok(points)
    }
}

#[async_trait]
impl ForecastAdapter for LocalAdapter {
    fn model_id(&self) -> &ModelId {
        &self.id
    }

    fn capabilities(&self) -> &AdapterCapabilities {
        &self.capabilities
    }

    async fn forecast(&self, request: &ForecastRequest) -> ForecastResult {
        match self.run(request) {
            Ok(points) => {
                debug!("{} forecast {} points for {}", self.id, points.len(), request.series.id());
                ForecastResult::success(self.id.clone(), request, points)
            }
            Err(failure) => {
                debug!("{} failed on {}: {}", self.id, request.series.id(), failure.message);
                failure.into_result(&self.id, request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use forecast_core::{FailureKind, ForecastStatus, Observation, TimeSeries};
    use serde_json::json;

    fn monthly(values: &[f64]) -> TimeSeries {
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let month = u32::try_from(i % 12).unwrap() + 1;
                let year = 2020 + i32::try_from(i / 12).unwrap();
                Observation::new(Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(), v)
            })
            .collect();
        TimeSeries::new("unemploy", observations).unwrap()
    }

    #[test]
    fn test_naive_repeats_last_value() {
        let fit = LocalModel::Naive.fit(&[1.0, 2.0, 4.0], 3).unwrap();
        assert_eq!(fit.estimates, vec![4.0, 4.0, 4.0]);
        assert_eq!(fit.residuals, vec![1.0, 2.0]);
    }

    #[test]
    fn test_seasonal_naive_cycles_last_season() {
        let model = LocalModel::SeasonalNaive { period: 2 };
        let fit = model.fit(&[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_eq!(fit.estimates, vec![3.0, 4.0, 3.0]);

        let err = LocalModel::seasonal_naive().fit(&[1.0; 5], 1).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidInput);
    }

    #[test]
    fn test_drift_extends_line() {
        let fit = LocalModel::Drift.fit(&[1.0, 2.0, 3.0], 2).unwrap();
        assert_eq!(fit.estimates, vec![4.0, 5.0]);
        assert_eq!(fit.sigma(), Some(0.0));
    }

    #[test]
    fn test_moving_average() {
        let fit = LocalModel::MovingAverage { window: 2 }.fit(&[1.0, 3.0, 5.0], 2).unwrap();
        assert_eq!(fit.estimates, vec![4.0, 4.0]);
        assert_eq!(fit.residuals, vec![3.0]);
    }

    #[test]
    fn test_exponential_smoothing_level() {
        let fit = LocalModel::ExponentialSmoothing { alpha: 0.5 }
            .fit(&[2.0, 4.0], 1)
            .unwrap();
        assert_eq!(fit.estimates, vec![3.0]);
    }

    #[test]
    fn test_holt_tracks_linear_trend() {
        let fit = LocalModel::holt_linear().fit(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert!((fit.estimates[0] - 5.0).abs() < 1e-9);
        assert!((fit.estimates[1] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_smoothing_parameter() {
        let mut options = ModelOptions::new();
        options.insert("alpha".to_string(), json!(1.5));
        let err = LocalModel::exponential_smoothing()
            .with_overrides(&options)
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::UnsupportedConfiguration);
    }

    #[test]
    fn test_intervals_widen_with_step() {
        let fit = Fit {
            estimates: vec![10.0, 10.0],
            residuals: vec![1.0, -1.0],
        };
        let bounds = fit.intervals(0.95).unwrap();
        let first = bounds[0].1 - bounds[0].0;
        let second = bounds[1].1 - bounds[1].0;
        assert!((bounds[0].1 - 10.0 - 1.959_964).abs() < 1e-3);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_adapter_produces_timestamped_points() {
        let adapter = LocalAdapter::new("naive", LocalModel::Naive);
        let series = monthly(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let request = ForecastRequest::new(series, 3).with_option("confidence_interval", json!(0.8));

        let result = adapter.forecast(&request).await;
        assert_eq!(result.status, ForecastStatus::Success);
        assert_eq!(result.points.len(), 3);
        assert_eq!(
            result.points[0].timestamp,
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        assert!(result.points.iter().all(|p| p.lower.is_some() && p.upper.is_some()));
    }

    #[test]
    fn test_adapter_rejects_horizon_above_max() {
        let adapter = LocalAdapter::new("drift", LocalModel::Drift).with_max_horizon(2);
        let request = ForecastRequest::new(monthly(&[1.0, 2.0, 3.0]), 3);

        let result = tokio_test::block_on(adapter.forecast(&request));
        assert_eq!(result.failure_kind(), Some(FailureKind::UnsupportedConfiguration));
        assert!(result.points.is_empty());
    }

    #[test]
    fn test_adapter_accepts_model_parameter_override() {
        let adapter = LocalAdapter::new("ma", LocalModel::moving_average());
        let request =
            ForecastRequest::new(monthly(&[1.0, 2.0, 3.0, 5.0]), 1).with_option("window", json!(2));

        let result = tokio_test::block_on(adapter.forecast(&request));
        assert_eq!(result.points[0].estimate, 4.0);

        let request = ForecastRequest::new(monthly(&[1.0, 2.0]), 1).with_option("alpha", json!(0.2));
        let result = tokio_test::block_on(adapter.forecast(&request));
        assert_eq!(result.failure_kind(), Some(FailureKind::UnsupportedConfiguration));
    }

    #[test]
    fn test_adapter_forecasts_month_end_series() {
        let observations = (1..=12)
            .map(|m| {
                let first_of_next = if m == 12 {
                    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
                } else {
                    Utc.with_ymd_and_hms(2020, m + 1, 1, 0, 0, 0).unwrap()
                };
                Observation::new(first_of_next - chrono::TimeDelta::days(1), f64::from(m))
            })
            .collect();
        let series = TimeSeries::new("pce", observations).unwrap();
        let adapter = LocalAdapter::new("naive", LocalModel::Naive);

        let result = tokio_test::block_on(adapter.forecast(&ForecastRequest::new(series, 2)));
        assert_eq!(result.status, ForecastStatus::Success);
        assert_eq!(
            result.points[1].timestamp,
            Utc.with_ymd_and_hms(2021, 2, 28, 0, 0, 0).unwrap()
        );
        assert_eq!(result.points[1].estimate, 12.0);
    }

    #[test]
    fn test_single_observation_has_no_cadence() {
        let adapter = LocalAdapter::new("naive", LocalModel::Naive);
        let request = ForecastRequest::new(monthly(&[1.0]), 1);
        let result = tokio_test::block_on(adapter.forecast(&request));
        assert_eq!(result.failure_kind(), Some(FailureKind::InvalidInput));
    }
}
