//! Model configuration file
//!
//! ```json
//! {
//!   "remote": {"base_url": "https://forecast.example.com/api"},
//!   "models": [
//!     {"id": "naive", "kind": "naive"},
//!     {"id": "ses", "kind": "exponential_smoothing", "alpha": 0.4},
//!     {"id": "xgboost", "kind": "remote", "model": "xgboost", "timeout_ms": 30000}
//!   ]
//! }
//! ```

use crate::local::{
    DEFAULT_ALPHA, DEFAULT_HOLT_ALPHA, DEFAULT_HOLT_BETA, DEFAULT_PERIOD, DEFAULT_WINDOW, LocalModel,
};
#[cfg(feature = "remote")]
use crate::remote::RemoteSettings;
use forecast_core::ModelId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which backend serves a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Naive,
    SeasonalNaive {
        #[serde(default)]
        period: Option<usize>,
    },
    Drift,
    MovingAverage {
        #[serde(default)]
        window: Option<usize>,
    },
    ExponentialSmoothing {
        #[serde(default)]
        alpha: Option<f64>,
    },
    HoltLinear {
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        beta: Option<f64>,
    },
    /// Model served by the remote forecasting service under `model`
    Remote { model: String },
}

impl BackendConfig {
    /// The local model this entry describes, with defaults filled in
    pub fn local_model(&self) -> Option<LocalModel> {
        let model = match *self {
            Self::Naive => LocalModel::Naive,
            Self::Drift => LocalModel::Drift,
            Self::SeasonalNaive { period } => LocalModel::SeasonalNaive {
                period: period.unwrap_or(DEFAULT_PERIOD),
            },
            Self::MovingAverage { window } => LocalModel::MovingAverage {
                window: window.unwrap_or(DEFAULT_WINDOW),
            },
            Self::ExponentialSmoothing { alpha } => LocalModel::ExponentialSmoothing {
                alpha: alpha.unwrap_or(DEFAULT_ALPHA),
            },
            Self::HoltLinear { alpha, beta } => LocalModel::HoltLinear {
                alpha: alpha.unwrap_or(DEFAULT_HOLT_ALPHA),
                beta: beta.unwrap_or(DEFAULT_HOLT_BETA),
            },
            Self::Remote { .. } => return None,
        };
        Some(model)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// One registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    #[serde(flatten)]
    pub backend: BackendConfig,
    /// Override of the backend's horizon limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_horizon: Option<usize>,
    /// Override of the backend's call timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ModelEntry {
    pub fn new(id: impl Into<ModelId>, backend: BackendConfig) -> Self {
        Self {
            id: id.into(),
            backend,
            max_horizon: None,
            timeout_ms: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Contents of a models file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsFile {
    /// Forecasting service settings, needed when any model is remote
    #[cfg(feature = "remote")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSettings>,
    pub models: Vec<ModelEntry>,
}

impl ModelsFile {
    /// The six built-in baselines under their default names
    pub fn local_defaults() -> Self {
        let models = [
            ("naive", BackendConfig::Naive),
            ("seasonal_naive", BackendConfig::SeasonalNaive { period: None }),
            ("drift", BackendConfig::Drift),
            ("moving_average", BackendConfig::MovingAverage { window: None }),
            ("ses", BackendConfig::ExponentialSmoothing { alpha: None }),
            (
                "holt",
                BackendConfig::HoltLinear {
                    alpha: None,
                    beta: None,
                },
            ),
        ]
        .into_iter()
        .map(|(id, backend)| ModelEntry::new(id, backend))
        .collect();

        Self {
            models,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_models_file() {
        let file: ModelsFile = serde_json::from_value(json!({
            "models": [
                {"id": "naive", "kind": "naive"},
                {"id": "ses", "kind": "exponential_smoothing", "alpha": 0.4, "max_horizon": 24},
                {"id": "xgb", "kind": "remote", "model": "xgboost", "timeout_ms": 1500}
            ]
        }))
        .unwrap();

        assert_eq!(file.models.len(), 3);
        assert_eq!(
            file.models[1].backend.local_model(),
            Some(LocalModel::ExponentialSmoothing { alpha: 0.4 })
        );
        assert_eq!(file.models[1].max_horizon, Some(24));
        assert!(file.models[2].backend.is_remote());
        assert_eq!(file.models[2].timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_defaults_filled_in() {
        let backend = BackendConfig::HoltLinear {
            alpha: Some(0.2),
            beta: None,
        };
        assert_eq!(
            backend.local_model(),
            Some(LocalModel::HoltLinear {
                alpha: 0.2,
                beta: 0.3
            })
        );
        assert_eq!(
            BackendConfig::SeasonalNaive { period: None }.local_model(),
            Some(LocalModel::SeasonalNaive { period: 12 })
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<ModelsFile, _> =
            serde_json::from_value(json!({"models": [{"id": "x", "kind": "arima"}]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_local_defaults() {
        let file = ModelsFile::local_defaults();
        assert_eq!(file.models.len(), 6);
        assert!(file.models.iter().all(|m| !m.backend.is_remote()));
    }
}
