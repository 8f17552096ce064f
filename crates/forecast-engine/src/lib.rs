//! Forecast orchestration and comparison for forecast-rs
//!
//! This crate turns one historical series and a selection of registered
//! models into a [`ComparisonReport`]:
//! - [`ForecastOrchestrator`] fans the request out to every selected adapter
//!   concurrently, under per-call and global timeouts
//! - [`RetryPolicy`] retries transient backend failures with backoff
//! - [`ComparisonEngine`] aligns the forecasts on a common time axis and
//!   computes pairwise agreement and optional backtest accuracy
//!
//! # Example
//!
//! ```rust,ignore
//! use forecast_adapters::{AdapterRegistry, ModelsFile};
//! use forecast_engine::{CompareConfig, ForecastOrchestrator, SelectionOptions};
//!
//! let registry = AdapterRegistry::from_config(&ModelsFile::local_defaults())?;
//! let orchestrator = ForecastOrchestrator::new(registry, CompareConfig::default());
//!
//! let models = ["naive".into(), "holt".into()];
//! let report = orchestrator
//!     .compare_forecasts(series, 12, &models, &SelectionOptions::new())
//!     .await?;
//! println!("{}", report.to_json_pretty()?);
//! ```

pub mod comparison;
pub mod config;
pub mod orchestrator;
pub mod report;
pub mod retry;

pub use comparison::ComparisonEngine;
pub use config::{CompareConfig, CompareConfigBuilder, ScaleMode};
pub use orchestrator::{ForecastOrchestrator, SelectionOptions};
pub use report::{
    AlignedSeries, BacktestScore, BacktestSummary, ComparisonReport, ExcludedModel, Exclusion,
    PairwiseMetrics,
};
pub use retry::RetryPolicy;
