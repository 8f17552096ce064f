//! Configuration of a comparison run
//!
//! Everything the orchestrator needs is passed in here; nothing is read
//! from the environment.

use crate::retry::RetryPolicy;
use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Value space the models forecast in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Original units
    #[default]
    Original,
    /// Min-max scaled to `[0, 1]`, mapped back to original units afterwards
    MinMax,
}

/// Settings for one orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Deadline for the whole fan-out, retries included
    pub global_timeout: Duration,

    /// Upper bound on a single adapter call
    pub call_timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Fill interior gaps linearly when aligning forecasts
    pub interpolate: bool,

    /// Also forecast from the series minus its last `horizon` observations
    /// and score the models against the held-out tail
    pub backtest: bool,

    pub scale: ScaleMode,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(120),
            call_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            interpolate: false,
            backtest: false,
            scale: ScaleMode::Original,
        }
    }
}

impl CompareConfig {
    pub fn builder() -> CompareConfigBuilder {
        CompareConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.global_timeout.is_zero() {
            return Err(Error::Config("global_timeout must be positive".to_string()));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::Config("call_timeout must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                "retry.backoff_multiplier must be a finite value of at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for CompareConfig
#[derive(Debug, Default)]
pub struct CompareConfigBuilder {
    global_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    interpolate: Option<bool>,
    backtest: Option<bool>,
    scale: Option<ScaleMode>,
}

impl CompareConfigBuilder {
    pub fn global_timeout(mut self, duration: Duration) -> Self {
        self.global_timeout = Some(duration);
        self
    }

    pub fn call_timeout(mut self, duration: Duration) -> Self {
        self.call_timeout = Some(duration);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Number of retries after the first attempt
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.retry = Some(self.retry.unwrap_or_default().with_retries(retries));
        self
    }

    pub fn interpolate(mut self, enabled: bool) -> Self {
        self.interpolate = Some(enabled);
        self
    }

    pub fn backtest(mut self, enabled: bool) -> Self {
        self.backtest = Some(enabled);
        self
    }

    pub fn scale(mut self, scale: ScaleMode) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<CompareConfig> {
        let defaults = CompareConfig::default();

        let config = CompareConfig {
            global_timeout: self.global_timeout.unwrap_or(defaults.global_timeout),
            call_timeout: self.call_timeout.unwrap_or(defaults.call_timeout),
            retry: self.retry.unwrap_or(defaults.retry),
            interpolate: self.interpolate.unwrap_or(defaults.interpolate),
            backtest: self.backtest.unwrap_or(defaults.backtest),
            scale: self.scale.unwrap_or(defaults.scale),
        };

        config.validate()?;
        Ok(config)
    }
}
