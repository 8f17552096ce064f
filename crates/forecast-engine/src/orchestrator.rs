//! Forecast orchestrator
//!
//! Validates a comparison request, fans it out to every selected adapter
//! concurrently, normalizes what comes back and hands the results to the
//! [`ComparisonEngine`].
//!
//! Each selected model runs as its own tokio task. A task retries transient
//! failures under the configured [`RetryPolicy`](crate::RetryPolicy) with a
//! per-attempt timeout; the fan-in is bounded by one global deadline after
//! which unfinished tasks are aborted and recorded as `Timeout`.

use crate::comparison::ComparisonEngine;
use crate::config::{CompareConfig, ScaleMode};
use crate::report::ComparisonReport;
use crate::retry::RetryPolicy;
use forecast_adapters::{AdapterRegistry, ForecastAdapter};
use forecast_core::{
    DateRange, Error, FailureKind, ForecastRequest, ForecastResult, ForecastStatus, ModelId,
    ModelOptions, Result, SeriesId, TimeSeries, ValueScale,
};
use forecast_series::SeriesRepository;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

/// Per-model option maps keyed by model identifier
pub type SelectionOptions = BTreeMap<ModelId, ModelOptions>;

/// Runs one comparison per call; safe to share between concurrent callers
#[derive(Clone)]
pub struct ForecastOrchestrator {
    registry: Arc<AdapterRegistry>,
    repository: Option<Arc<dyn SeriesRepository>>,
    config: CompareConfig,
    engine: ComparisonEngine,
}

impl std::fmt::Debug for ForecastOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastOrchestrator")
            .field("registry", &self.registry)
            .field("repository", &self.repository.as_ref().map(|r| r.name()))
            .field("config", &self.config)
            .finish()
    }
}

impl ForecastOrchestrator {
    pub fn new(registry: AdapterRegistry, config: CompareConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            repository: None,
            engine: ComparisonEngine::new(config.interpolate),
            config,
        }
    }

    /// Attach the repository used by [`compare_stored`](Self::compare_stored)
    pub fn with_repository(mut self, repository: Arc<dyn SeriesRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Fetch a stored series, then compare forecasts for it
    pub async fn compare_stored(
        &self,
        series_id: &SeriesId,
        range: &DateRange,
        horizon: usize,
        models: &[ModelId],
        options: &SelectionOptions,
    ) -> Result<ComparisonReport> {
        let repository = self
            .repository
            .as_ref()
            .ok_or_else(|| Error::Config("no series repository configured".to_string()))?;

        // Reject bad selections before touching the data store.
        self.validate_selection(horizon, models, options)?;

        let series = repository.get_series(series_id, range).await?;
        debug!(
            "Fetched {} observations of {} from {}",
            series.len(),
            series_id,
            repository.name()
        );

        self.compare_forecasts(series, horizon, models, options).await
    }

    /// Forecast `series` with every selected model and compare the results
    ///
    /// Returns exactly one result per selected model, in selection order.
    /// Fails with [`Error::InvalidInput`] before dispatching anything when
    /// the request itself is malformed, and with [`Error::AllModelsFailed`]
    /// when no model produced a usable forecast.
    #[instrument(skip_all, fields(series = %series.id(), horizon = horizon, models = models.len()))]
    pub async fn compare_forecasts(
        &self,
        series: TimeSeries,
        horizon: usize,
        models: &[ModelId],
        options: &SelectionOptions,
    ) -> Result<ComparisonReport> {
        self.validate_selection(horizon, models, options)?;
        if series.is_empty() {
            return Err(Error::InvalidInput(format!(
                "series {} has no observations",
                series.id()
            )));
        }

        let backtest = if self.config.backtest {
            Some(series.split_holdout(horizon)?)
        } else {
            None
        };

        let deadline = Instant::now() + self.config.global_timeout;
        let selection = Selection {
            models,
            options,
            horizon,
            deadline,
        };

        let (results, backtest_results) = tokio::join!(
            self.forecast_all(&series, &selection),
            async {
                match &backtest {
                    Some((training, _)) => Some(self.forecast_all(training, &selection).await),
                    None => None,
                }
            }
        );

        if results.iter().all(|r| !r.is_usable()) {
            warn!("All {} models failed for {}", results.len(), series.id());
            return Err(Error::AllModelsFailed { results });
        }

        let mut report = self.engine.compare(series.id(), horizon, results)?;

        if let (Some((_, actuals)), Some(backtest_results)) = (backtest, backtest_results) {
            let summary = self
                .engine
                .score_backtest(series.id(), actuals, backtest_results)?;
            if let Some(best) = summary.best() {
                info!("Backtest best model for {}: {}", series.id(), best.model);
            }
            report.backtest = Some(summary);
        }

        info!(
            "Compared {} models on {}: {} usable, {} aligned",
            report.results.len(),
            series.id(),
            report.successful().count(),
            report.aligned.len()
        );
        Ok(report)
    }

    fn validate_selection(
        &self,
        horizon: usize,
        models: &[ModelId],
        options: &SelectionOptions,
    ) -> Result<()> {
        if models.is_empty() {
            return Err(Error::InvalidInput("no models selected".to_string()));
        }
        if horizon == 0 {
            return Err(Error::InvalidInput("horizon must be at least 1".to_string()));
        }

        let mut seen = BTreeSet::new();
        for model in models {
            if !seen.insert(model) {
                return Err(Error::InvalidInput(format!("model '{model}' selected twice")));
            }
            if !self.registry.contains(model) {
                return Err(Error::InvalidInput(format!("model '{model}' is not registered")));
            }
        }

        if let Some(model) = options.keys().find(|m| !seen.contains(m)) {
            return Err(Error::InvalidInput(format!(
                "options given for unselected model '{model}'"
            )));
        }
        Ok(())
    }

    /// Forecast in the configured value space, reporting original units
    async fn forecast_all(&self, series: &TimeSeries, selection: &Selection<'_>) -> Vec<ForecastResult> {
        match self.config.scale {
            ScaleMode::Original => self.dispatch(series, selection).await,
            ScaleMode::MinMax => {
                let (scaled, scale) = series.min_max_scaled();
                self.dispatch(&scaled, selection)
                    .await
                    .into_iter()
                    .map(|result| unscale(result, scale))
                    .collect()
            }
        }
    }

    async fn dispatch(&self, series: &TimeSeries, selection: &Selection<'_>) -> Vec<ForecastResult> {
        let mut tasks = JoinSet::new();
        let mut requests = Vec::with_capacity(selection.models.len());
        let mut counters = Vec::with_capacity(selection.models.len());

        for (index, model) in selection.models.iter().enumerate() {
            let request = ForecastRequest::new(series.clone(), selection.horizon)
                .with_options(selection.options.get(model).cloned().unwrap_or_default());
            requests.push(request.clone());
            let attempts = Arc::new(AtomicU32::new(0));
            counters.push(Arc::clone(&attempts));

            let Some(adapter) = self.registry.get(model) else {
                continue;
            };
            let call_timeout = adapter.capabilities().timeout.min(self.config.call_timeout);
            let policy = self.config.retry.clone();
            let model = model.clone();

            tasks.spawn(async move {
                let call = ModelCall {
                    adapter,
                    model: &model,
                    request: &request,
                    call_timeout,
                    attempts: &attempts,
                };
                let result = AssertUnwindSafe(call.run(&policy))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!("Adapter {} panicked", model);
                        ForecastResult::failed(
                            model.clone(),
                            &request,
                            FailureKind::BackendUnavailable,
                            "adapter panicked",
                        )
                        .with_attempts(attempts.load(Ordering::Relaxed).max(1))
                    });
                (index, result)
            });
        }

        let mut slots: Vec<Option<ForecastResult>> = vec![None; requests.len()];
        let mut deadline_hit = false;

        loop {
            match timeout_at(selection.deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, result)))) => slots[index] = Some(result),
                Ok(Some(Err(err))) => warn!("Forecast task ended abnormally: {}", err),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Global timeout of {:?} elapsed with {} models outstanding",
                        self.config.global_timeout,
                        tasks.len()
                    );
                    tasks.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(selection.models.iter().zip(requests).zip(counters))
            .map(|(slot, ((model, request), attempts))| {
                slot.unwrap_or_else(|| {
                    let (kind, message) = if deadline_hit {
                        (
                            FailureKind::Timeout,
                            format!("global timeout of {:?} elapsed", self.config.global_timeout),
                        )
                    } else {
                        (FailureKind::BackendUnavailable, "forecast task failed".to_string())
                    };
                    ForecastResult::failed(model.clone(), &request, kind, message)
                        .with_attempts(attempts.load(Ordering::Relaxed).max(1))
                })
            })
            .collect()
    }
}

/// Parameters shared by every task of one comparison call
struct Selection<'a> {
    models: &'a [ModelId],
    options: &'a SelectionOptions,
    horizon: usize,
    deadline: Instant,
}

/// One model's retried, individually timed adapter calls
struct ModelCall<'a> {
    adapter: Arc<dyn ForecastAdapter>,
    model: &'a ModelId,
    request: &'a ForecastRequest,
    call_timeout: Duration,
    /// Attempts started so far, readable after a panic or an abort
    attempts: &'a AtomicU32,
}

impl ModelCall<'_> {
    async fn run(self, policy: &RetryPolicy) -> ForecastResult {
        let Self {
            adapter,
            model,
            request,
            call_timeout,
            attempts,
        } = self;

        let result = policy
            .execute(model, |attempt| {
                attempts.fetch_max(attempt, Ordering::Relaxed);
                let adapter = Arc::clone(&adapter);
                async move {
                    match timeout(call_timeout, adapter.forecast(request)).await {
                        Ok(result) => result,
                        Err(_) => {
                            debug!("{} attempt {} timed out after {:?}", model, attempt, call_timeout);
                            ForecastResult::failed(
                                model.clone(),
                                request,
                                FailureKind::Timeout,
                                format!("call timed out after {call_timeout:?}"),
                            )
                        }
                    }
                }
            })
            .await;

        normalize(model, request, result)
    }
}

/// Enforce the result contract on whatever an adapter returned
fn normalize(model: &ModelId, request: &ForecastRequest, result: ForecastResult) -> ForecastResult {
    let attempts = result.attempts;
    let malformed = |message: String| {
        warn!("{} returned a malformed forecast: {}", model, message);
        ForecastResult::failed(model.clone(), request, FailureKind::MalformedResponse, message)
            .with_attempts(attempts)
    };

    if &result.model != model || &result.series_id != request.series.id() || result.horizon != request.horizon {
        return malformed(format!(
            "answered for {}/{} horizon {} instead of {}/{} horizon {}",
            result.model,
            result.series_id,
            result.horizon,
            model,
            request.series.id(),
            request.horizon
        ));
    }

    if result.status.is_failed() {
        return result;
    }

    if result.points.len() > request.horizon {
        return malformed(format!(
            "{} points for horizon {}",
            result.points.len(),
            request.horizon
        ));
    }
    if result.points.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
        return malformed("points are not in strictly increasing time order".to_string());
    }
    if let (Some(first), Some(last)) = (result.points.first(), request.series.last()) {
        if first.timestamp <= last.timestamp {
            return malformed(format!(
                "forecast starts at {}, not after the last observation {}",
                first.timestamp, last.timestamp
            ));
        }
    }
    if result.points.iter().any(|p| !p.estimate.is_finite()) {
        return malformed("non-finite estimate".to_string());
    }

    let status = if result.points.len() < request.horizon {
        match result.status {
            ForecastStatus::Partial { reason } => ForecastStatus::Partial { reason },
            _ => ForecastStatus::Partial {
                reason: format!("{} of {} periods forecast", result.points.len(), request.horizon),
            },
        }
    } else {
        ForecastStatus::Success
    };

    ForecastResult { status, ..result }
}

fn unscale(mut result: ForecastResult, scale: ValueScale) -> ForecastResult {
    result.points = result
        .points
        .into_iter()
        .map(|p| p.map_values(|v| scale.unscale(v)))
        .collect();
    result
}
