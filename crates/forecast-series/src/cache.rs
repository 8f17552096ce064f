//! Caching layer in front of a series repository to reduce data store round-trips

use crate::error::Result;
use crate::repository::SeriesRepository;
use async_trait::async_trait;
use cached::{Cached, TimedCache};
use chrono::{DateTime, Utc};
use forecast_core::{DateRange, SeriesId, TimeSeries};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache key for series requests
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Series identifier
    pub series_id: SeriesId,
    /// Lower bound of the requested range
    pub start: Option<DateTime<Utc>>,
    /// Upper bound of the requested range
    pub end: Option<DateTime<Utc>>,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(series_id: &SeriesId, range: &DateRange) -> Self {
        Self {
            series_id: series_id.clone(),
            start: range.start,
            end: range.end,
        }
    }
}

/// Repository wrapper caching fetched series for a fixed lifespan
///
/// Failed fetches are not cached.
pub struct CachedSeriesRepository<R> {
    inner: R,
    cache: Arc<RwLock<TimedCache<CacheKey, TimeSeries>>>,
}

impl<R: SeriesRepository> CachedSeriesRepository<R> {
    /// Wrap a repository with a cache of the given TTL
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    /// Borrow the wrapped repository
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Invalidate a specific cache entry
    pub async fn invalidate(&self, series_id: &SeriesId, range: &DateRange) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(&CacheKey::new(series_id, range));
    }

    /// Clear all cached entries
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    /// Get the number of cached entries
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<R: SeriesRepository> SeriesRepository for CachedSeriesRepository<R> {
    async fn get_series(&self, id: &SeriesId, range: &DateRange) -> Result<TimeSeries> {
        let key = CacheKey::new(id, range);

        {
            let mut cache = self.cache.write().await;
            if let Some(series) = cache.cache_get(&key) {
                tracing::debug!("Cache hit for series {}", id);
                return Ok(series.clone());
            }
        }

        tracing::debug!("Cache miss for series {}", id);
        let series = self.inner.get_series(id, range).await?;

        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, series.clone());

        Ok(series)
    }

    async fn list_series(&self) -> Result<Vec<SeriesId>> {
        self.inner.list_series().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeriesError;
    use chrono::TimeZone;
    use forecast_core::Observation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRepository {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeriesRepository for CountingRepository {
        async fn get_series(&self, id: &SeriesId, _range: &DateRange) -> Result<TimeSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if id.as_str() == "missing" {
                return Err(SeriesError::NotFound(id.to_string()));
            }
            let ts = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
            Ok(TimeSeries::new(id.clone(), vec![Observation::new(ts, 1.0)]).unwrap())
        }

        async fn list_series(&self) -> Result<Vec<SeriesId>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn cached() -> CachedSeriesRepository<CountingRepository> {
        CachedSeriesRepository::new(
            CountingRepository {
                calls: AtomicUsize::new(0),
            },
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_second_fetch_hits_cache() {
        let repository = cached();
        let id = SeriesId::new("pce");

        repository.get_series(&id, &DateRange::all()).await.unwrap();
        repository.get_series(&id, &DateRange::all()).await.unwrap();

        assert_eq!(repository.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(repository.len().await, 1);
        assert_eq!(repository.name(), "counting");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let repository = cached();
        let id = SeriesId::new("missing");

        assert!(repository.get_series(&id, &DateRange::all()).await.is_err());
        assert!(repository.get_series(&id, &DateRange::all()).await.is_err());

        assert_eq!(repository.inner().calls.load(Ordering::SeqCst), 2);
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_entry() {
        let repository = cached();
        let pce = SeriesId::new("pce");
        let pop = SeriesId::new("pop");

        repository.get_series(&pce, &DateRange::all()).await.unwrap();
        repository.get_series(&pop, &DateRange::all()).await.unwrap();
        repository.invalidate(&pce, &DateRange::all()).await;
        assert_eq!(repository.len().await, 1);

        repository.get_series(&pce, &DateRange::all()).await.unwrap();
        assert_eq!(repository.inner().calls.load(Ordering::SeqCst), 3);

        repository.clear().await;
        assert!(repository.is_empty().await);
    }
}
