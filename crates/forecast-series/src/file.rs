//! File-backed repository reading a long-format table export
//!
//! The file is a JSON array of rows, one row per (date, variable) pair:
//!
//! ```json
//! [
//!   {"date": "1967-07-01", "variable": "pce", "value": 506.7},
//!   {"date": "1967-07-01", "variable": "unemploy", "value": 2944}
//! ]
//! ```
//!
//! Each distinct `variable` becomes one series. Rows with a `null` value are
//! skipped.

use crate::error::{Result, SeriesError};
use crate::repository::{InMemorySeriesRepository, SeriesRepository};
use async_trait::async_trait;
use forecast_core::{DateRange, Observation, SeriesId, TimeSeries, parse_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One row of the exported table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    /// Observation date (`YYYY-MM-DD` or RFC 3339)
    pub date: String,
    /// Series the row belongs to
    pub variable: String,
    /// Observed value, `null` when missing
    pub value: Option<f64>,
}

/// Repository loaded once from a JSON table export
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
    inner: InMemorySeriesRepository,
}

impl JsonFileRepository {
    /// Read and validate the whole file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path).await?;
        let records: Vec<SeriesRecord> = serde_json::from_str(&content)?;

        let inner = Self::build(records)?;
        info!(
            "Loaded {} series from {}",
            inner.len(),
            path.display()
        );
        Ok(Self { path, inner })
    }

    /// Build a repository from already-parsed rows
    pub fn from_records(records: Vec<SeriesRecord>) -> Result<Self> {
        Ok(Self {
            path: PathBuf::new(),
            inner: Self::build(records)?,
        })
    }

    /// Path the repository was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build(records: Vec<SeriesRecord>) -> Result<InMemorySeriesRepository> {
        let mut grouped: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        let mut skipped = 0usize;

        for record in records {
            let Some(value) = record.value else {
                skipped += 1;
                continue;
            };
            let timestamp = parse_timestamp(&record.date).ok_or_else(|| {
                SeriesError::DataStore(format!(
                    "unparsable date '{}' for variable {}",
                    record.date, record.variable
                ))
            })?;
            grouped
                .entry(record.variable)
                .or_default()
                .push(Observation::new(timestamp, value));
        }

        if skipped > 0 {
            debug!("Skipped {} rows with missing values", skipped);
        }

        grouped
            .into_iter()
            .map(|(variable, mut observations)| {
                observations.sort_by_key(|o| o.timestamp);
                TimeSeries::new(variable, observations)
                    .map_err(|e| SeriesError::DataStore(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl SeriesRepository for JsonFileRepository {
    async fn get_series(&self, id: &SeriesId, range: &DateRange) -> Result<TimeSeries> {
        self.inner.get_series(id, range).await
    }

    async fn list_series(&self) -> Result<Vec<SeriesId>> {
        self.inner.list_series().await
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(date: &str, variable: &str, value: Option<f64>) -> SeriesRecord {
        SeriesRecord {
            date: date.to_string(),
            variable: variable.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn test_groups_rows_by_variable() {
        let repository = JsonFileRepository::from_records(vec![
            record("2020-02-01", "pce", Some(2.0)),
            record("2020-01-01", "pce", Some(1.0)),
            record("2020-01-01", "pop", Some(300.0)),
            record("2020-02-01", "pop", None),
        ])
        .unwrap();

        let ids = repository.list_series().await.unwrap();
        assert_eq!(ids, vec![SeriesId::new("pce"), SeriesId::new("pop")]);

        let pce = repository
            .get_series(&SeriesId::new("pce"), &DateRange::all())
            .await
            .unwrap();
        assert_eq!(pce.values(), vec![1.0, 2.0]);

        let pop = repository
            .get_series(&SeriesId::new("pop"), &DateRange::all())
            .await
            .unwrap();
        assert_eq!(pop.len(), 1);
    }

    #[test]
    fn test_duplicate_dates_are_a_data_store_error() {
        let err = JsonFileRepository::from_records(vec![
            record("2020-01-01", "pce", Some(1.0)),
            record("2020-01-01", "pce", Some(1.5)),
        ])
        .unwrap_err();
        assert!(matches!(err, SeriesError::DataStore(_)));
    }

    #[test]
    fn test_bad_date_is_a_data_store_error() {
        let err = JsonFileRepository::from_records(vec![record("01/02/2020", "pce", Some(1.0))])
            .unwrap_err();
        assert!(matches!(err, SeriesError::DataStore(msg) if msg.contains("01/02/2020")));
    }

    #[tokio::test]
    async fn test_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"date": "1967-07-01", "variable": "uempmed", "value": 4.5}},
                {{"date": "1967-08-01", "variable": "uempmed", "value": 4.7}}]"#
        )
        .unwrap();

        let repository = JsonFileRepository::open(file.path()).await.unwrap();
        assert_eq!(repository.path(), file.path());

        let series = repository
            .get_series(&SeriesId::new("uempmed"), &DateRange::all())
            .await
            .unwrap();
        assert_eq!(series.values(), vec![4.5, 4.7]);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = JsonFileRepository::open("/no/such/export.json").await.unwrap_err();
        assert!(matches!(err, SeriesError::Io(_)));
    }
}
