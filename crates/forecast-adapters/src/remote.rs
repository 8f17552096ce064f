//! Remote forecasting service backend
//!
//! The service takes the history as a list of `{date, value}` rows and
//! answers with one row per forecast step:
//!
//! ```json
//! [{".model_id": 1, ".index": "2021-01-01", ".value": 4.2,
//!   ".conf_lo": 3.9, ".conf_hi": 4.5}]
//! ```
//!
//! Each adapter requests a single model, so the rows of interest carry
//! `.model_id == 1`. One [`RemoteClient`] is shared by every remote adapter
//! and rate-limits all of them together.

use crate::adapter::{
    AdapterCapabilities, Failure, ForecastAdapter, confidence_level, validate_request,
};
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use forecast_core::{
    ForecastPoint, ForecastRequest, ForecastResult, ModelId, TimeSeries, parse_timestamp,
};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT: u32 = 60;
const DEFAULT_MAX_HORIZON: usize = 90;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}

fn default_max_horizon() -> usize {
    DEFAULT_MAX_HORIZON
}

/// Connection settings for the forecasting service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Service base URL, e.g. `https://forecast.example.com/api/`
    pub base_url: String,

    /// Bearer token; usually supplied through `FORECAST_API_TOKEN`
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,

    /// Per-call HTTP timeout in seconds (default: 60)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Requests per minute across all remote models (default: 60)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Largest horizon the service accepts (default: 90)
    #[serde(default = "default_max_horizon")]
    pub max_horizon: usize,
}

impl RemoteSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT,
            max_horizon: DEFAULT_MAX_HORIZON,
        }
    }

    /// Create settings from environment variables
    ///
    /// Reads the base URL from `FORECAST_API_URL` and the optional token
    /// from `FORECAST_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("FORECAST_API_URL").map_err(|_| {
            AdapterError::Config("FORECAST_API_URL environment variable not set".to_string())
        })?;
        Ok(Self::new(base_url).with_env_token())
    }

    /// Fill the token from `FORECAST_API_TOKEN` unless one is already set
    pub fn with_env_token(mut self) -> Self {
        if self.api_token.is_none() {
            self.api_token = std::env::var("FORECAST_API_TOKEN").ok();
        }
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Resolve the forecast endpoint
    pub fn endpoint(&self) -> Result<Url> {
        let invalid = |reason: String| AdapterError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut base = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("forecast").map_err(|e| invalid(e.to_string()))
    }
}

/// HTTP client shared by remote adapters
pub struct RemoteClient {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
    rate_limiter: SharedRateLimiter,
    settings: RemoteSettings,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.api_token.is_some())
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        let endpoint = settings.endpoint()?;

        let per_minute = NonZeroU32::new(settings.rate_limit_per_minute).ok_or_else(|| {
            AdapterError::Config("rate_limit_per_minute must be positive".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_token: settings.api_token.clone(),
            rate_limiter,
            settings,
        })
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Request a forecast from one remote model
    #[instrument(skip(self, request), fields(series = %request.series.id(), horizon = request.horizon))]
    pub async fn forecast(
        &self,
        remote_model: &str,
        request: &ForecastRequest,
    ) -> std::result::Result<Vec<ForecastPoint>, Failure> {
        let confidence = confidence_level(&request.options)?;
        let payload = ForecastPayload::new(&request.series, request.horizon, remote_model, confidence);

        self.rate_limiter.until_ready().await;
        debug!("Requesting {} forecast from {}", remote_model, self.endpoint);

        let mut builder = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Forecast service returned {} for {}", status, remote_model);
            return Err(status_failure(status, &body));
        }

        let body = response.text().await.map_err(transport_failure)?;
        let rows: Vec<ResponseRow> = serde_json::from_str(&body)
            .map_err(|e| Failure::malformed(format!("unparsable forecast response: {e}")))?;

        rows_to_points(rows, &request.series, request.horizon)
    }
}

#[derive(Debug, Serialize)]
struct ActualRow {
    date: String,
    value: f64,
}

#[derive(Debug, Serialize)]
struct ForecastPayload<'a> {
    actuals: Vec<ActualRow>,
    fcast_horizon: usize,
    group_target: Option<String>,
    target_var: &'static str,
    date_var: &'static str,
    models_list: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence_interval: Option<f64>,
}

impl<'a> ForecastPayload<'a> {
    fn new(series: &TimeSeries, horizon: usize, model: &'a str, confidence: Option<f64>) -> Self {
        Self {
            actuals: series
                .observations()
                .iter()
                .map(|o| ActualRow {
                    date: format_date(o.timestamp),
                    value: o.value,
                })
                .collect(),
            fcast_horizon: horizon,
            group_target: None,
            target_var: "value",
            date_var: "date",
            models_list: [model],
            confidence_interval: confidence,
        }
    }
}

/// Midnight timestamps go out as plain dates
fn format_date(timestamp: DateTime<Utc>) -> String {
    if timestamp.num_seconds_from_midnight() == 0 {
        timestamp.format("%Y-%m-%d").to_string()
    } else {
        timestamp.to_rfc3339()
    }
}

#[derive(Debug, Deserialize)]
struct ResponseRow {
    #[serde(rename = ".model_id")]
    model_id: f64,
    #[serde(rename = ".index")]
    index: String,
    #[serde(rename = ".value")]
    value: Option<f64>,
    #[serde(rename = ".conf_lo", default)]
    conf_lo: Option<f64>,
    #[serde(rename = ".conf_hi", default)]
    conf_hi: Option<f64>,
}

fn rows_to_points(
    rows: Vec<ResponseRow>,
    series: &TimeSeries,
    horizon: usize,
) -> std::result::Result<Vec<ForecastPoint>, Failure> {
    let last = series.last().map(|o| o.timestamp);
    let mut points = Vec::new();

    for row in rows.into_iter().filter(|r| (r.model_id - 1.0).abs() < f64::EPSILON) {
        let timestamp = parse_timestamp(&row.index)
            .ok_or_else(|| Failure::malformed(format!("unparsable forecast date '{}'", row.index)))?;
        if last.is_some_and(|last| timestamp <= last) {
            continue;
        }

        let estimate = row
            .value
            .filter(|v| v.is_finite())
            .ok_or_else(|| Failure::malformed(format!("missing forecast value at {}", row.index)))?;

        let point = ForecastPoint::new(timestamp, estimate);
        points.push(match (row.conf_lo, row.conf_hi) {
            (Some(lo), Some(hi)) if lo.is_finite() && hi.is_finite() => point.with_bounds(lo, hi),
            _ => point,
        });
    }

    points.sort_by_key(|p| p.timestamp);
    if points.windows(2).any(|w| w[0].timestamp == w[1].timestamp) {
        return Err(Failure::malformed("duplicate forecast timestamps"));
    }
    if points.len() > horizon {
        return Err(Failure::malformed(format!(
            "{} forecast points returned for horizon {horizon}",
            points.len()
        )));
    }
    Ok(points)
}

fn transport_failure(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::timeout(format!("forecast service timed out: {err}"))
    } else if err.is_decode() {
        Failure::malformed(format!("unreadable forecast response: {err}"))
    } else {
        Failure::unavailable(format!("forecast service request failed: {err}"))
    }
}

fn status_failure(status: StatusCode, body: &str) -> Failure {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Failure::invalid_input(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Failure::timeout(detail),
        _ => Failure::unavailable(detail),
    }
}

/// Adapter for one model served by the forecasting service
#[derive(Debug, Clone)]
pub struct RemoteForecastAdapter {
    id: ModelId,
    remote_model: String,
    client: Arc<RemoteClient>,
    capabilities: AdapterCapabilities,
}

impl RemoteForecastAdapter {
    /// `remote_model` is the service's name for the model, e.g. "xgboost"
    pub fn new(id: impl Into<ModelId>, remote_model: impl Into<String>, client: Arc<RemoteClient>) -> Self {
        let capabilities = AdapterCapabilities::new(
            client.settings().max_horizon,
            Duration::from_secs(client.settings().timeout_secs),
        );
        Self {
            id: id.into(),
            remote_model: remote_model.into(),
            client,
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

    pub fn remote_model(&self) -> &str {
        &self.remote_model
    }
}

#[async_trait]
impl ForecastAdapter for RemoteForecastAdapter {
    fn model_id(&self) -> &ModelId {
        &self.id
    }

    fn capabilities(&self) -> &AdapterCapabilities {
        &self.capabilities
    }

    async fn forecast(&self, request: &ForecastRequest) -> ForecastResult {
        if let Err(failure) = validate_request(&self.capabilities, request) {
            return failure.into_result(&self.id, request);
        }

        match self.client.forecast(&self.remote_model, request).await {
            Ok(points) => ForecastResult::success(self.id.clone(), request, points),
            Err(failure) => {
                debug!("{} failed: {} ({})", self.id, failure.message, failure.kind);
                failure.into_result(&self.id, request)
            }
        }
    }
}
