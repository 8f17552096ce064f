//! Comparison report handed to the presentation layer
//!
//! The report holds only values derived from its inputs (no wall-clock
//! data, no hash-ordered maps), so identical inputs serialize identically.

use chrono::{DateTime, Utc};
use forecast_core::{ForecastResult, ModelId, Observation, SeriesId};
use serde::{Deserialize, Serialize};

/// Why a successful model was left out of the aligned metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exclusion {
    /// The model returned no points
    InsufficientData,
    /// The model has no value at these axis timestamps
    MissingTimestamps { missing: Vec<DateTime<Utc>> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedModel {
    pub model: ModelId,
    #[serde(flatten)]
    pub exclusion: Exclusion,
}

/// One model's estimates laid out on the common axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSeries {
    pub model: ModelId,
    /// One value per axis timestamp
    pub values: Vec<f64>,
    /// Axis timestamps whose value was interpolated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpolated: Vec<DateTime<Utc>>,
}

/// Agreement between two aligned models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMetrics {
    pub model_a: ModelId,
    pub model_b: ModelId,
    /// Mean absolute difference over the axis
    pub mean_abs_diff: f64,
    /// Largest pointwise absolute difference
    pub max_divergence: f64,
    /// Earliest timestamp at which the largest difference occurs
    pub max_divergence_at: DateTime<Utc>,
}

/// Accuracy of one model against held-out actuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestScore {
    pub model: ModelId,
    /// 1 = best
    pub rank: usize,
    /// Number of forecast points matched to an actual
    pub matched: usize,
    pub mae: f64,
    /// Mean absolute percentage error; absent when every matched actual is zero
    pub mape: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    /// Held-out observations the backtest forecasts are scored against
    pub actuals: Vec<Observation>,
    /// Backtest forecasts, one per requested model, in selection order
    pub results: Vec<ForecastResult>,
    /// Scored models, best first
    pub scores: Vec<BacktestScore>,
    /// Models without a usable backtest forecast
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unscored: Vec<ModelId>,
}

impl BacktestSummary {
    pub fn best(&self) -> Option<&BacktestScore> {
        self.scores.first()
    }
}

/// Outcome of one comparison run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub series_id: SeriesId,
    pub horizon: usize,
    /// Sorted union of the timestamps of every usable result
    pub axis: Vec<DateTime<Utc>>,
    /// One result per requested model, in selection order
    pub results: Vec<ForecastResult>,
    pub aligned: Vec<AlignedSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ExcludedModel>,
    pub pairwise: Vec<PairwiseMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest: Option<BacktestSummary>,
}

impl ComparisonReport {
    /// Result of one model
    pub fn result(&self, model: &ModelId) -> Option<&ForecastResult> {
        self.results.iter().find(|r| &r.model == model)
    }

    /// Results with a usable forecast
    pub fn successful(&self) -> impl Iterator<Item = &ForecastResult> {
        self.results.iter().filter(|r| r.is_usable())
    }

    /// Results without a usable forecast
    pub fn failed(&self) -> impl Iterator<Item = &ForecastResult> {
        self.results.iter().filter(|r| !r.is_usable())
    }

    pub fn pair(&self, a: &ModelId, b: &ModelId) -> Option<&PairwiseMetrics> {
        self.pairwise.iter().find(|p| {
            (&p.model_a == a && &p.model_b == b) || (&p.model_a == b && &p.model_b == a)
        })
    }

    pub fn to_json_pretty(&self) -> forecast_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
