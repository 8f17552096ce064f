//! Series repository trait and in-memory implementation

use crate::error::{Result, SeriesError};
use async_trait::async_trait;
use forecast_core::{DateRange, SeriesId, TimeSeries};
use std::collections::BTreeMap;
use tracing::debug;

/// Source of historical time series
///
/// Implementations own their connections and caches; callers only see
/// validated [`TimeSeries`] values.
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    /// Fetch one series restricted to a date range
    ///
    /// Fails with [`SeriesError::NotFound`] when the series is unknown or has
    /// no observations inside the range.
    async fn get_series(&self, id: &SeriesId, range: &DateRange) -> Result<TimeSeries>;

    /// List the identifiers of every stored series
    async fn list_series(&self) -> Result<Vec<SeriesId>>;

    /// Repository name (for logging)
    fn name(&self) -> &str;
}

/// Repository holding fully-loaded series in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesRepository {
    series: BTreeMap<SeriesId, TimeSeries>,
}

impl InMemorySeriesRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a series
    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.id().clone(), series);
    }

    /// Builder-style insert
    pub fn with_series(mut self, series: TimeSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl FromIterator<TimeSeries> for InMemorySeriesRepository {
    fn from_iter<I: IntoIterator<Item = TimeSeries>>(iter: I) -> Self {
        let mut repository = Self::new();
        for series in iter {
            repository.insert(series);
        }
        repository
    }
}

#[async_trait]
impl SeriesRepository for InMemorySeriesRepository {
    async fn get_series(&self, id: &SeriesId, range: &DateRange) -> Result<TimeSeries> {
        range
            .validate()
            .map_err(|e| SeriesError::InvalidRange(e.to_string()))?;

        let series = self
            .series
            .get(id)
            .ok_or_else(|| SeriesError::NotFound(id.to_string()))?;

        let sliced = series.slice(range);
        if sliced.is_empty() {
            return Err(SeriesError::NotFound(format!(
                "{id} has no observations in the requested range"
            )));
        }

        debug!(
            "Fetched {} of {} observations for series {}",
            sliced.len(),
            series.len(),
            id
        );
        Ok(sliced)
    }

    async fn list_series(&self) -> Result<Vec<SeriesId>> {
        Ok(self.series.keys().cloned().collect())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
