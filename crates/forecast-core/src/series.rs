//! Time series data model
//!
//! A [`TimeSeries`] is validated once at construction (strictly increasing
//! timestamps, finite values) and immutable afterwards. Observations live
//! behind an `Arc` so every adapter of a comparison run can share the same
//! series without copying it.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a series in the data store (e.g. "unemploy")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    /// Create a new series identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SeriesId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One (timestamp, value) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Parse a timestamp as written by data stores and forecasting services
///
/// Accepts RFC 3339 (`2020-01-01T00:00:00Z`), `YYYY-MM-DD HH:MM:SS` and plain
/// `YYYY-MM-DD` dates (read as midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Inclusive date range used when fetching a series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest timestamp to include
    pub start: Option<DateTime<Utc>>,
    /// Latest timestamp to include
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Unbounded range
    pub fn all() -> Self {
        Self::default()
    }

    /// Range bounded on both sides
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Set the lower bound
    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the upper bound
    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Check whether a timestamp falls inside the range
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| timestamp >= start)
            && self.end.is_none_or(|end| timestamp <= end)
    }

    /// Reject ranges whose start lies after their end
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(Error::InvalidInput(format!(
                    "date range start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}

/// Sampling step of a regular series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// A whole number of calendar months (1 = monthly, 3 = quarterly, 12 = yearly)
    Months(u32),
    /// A whole number of calendar months, every timestamp on the last day of its month
    MonthEnd(u32),
    /// A fixed number of seconds (daily, hourly, ...)
    Seconds(i64),
}

impl Cadence {
    /// Timestamp `steps` periods after `from`
    pub fn advance(&self, from: DateTime<Utc>, steps: u32) -> Option<DateTime<Utc>> {
        match *self {
            Self::Months(months) => from.checked_add_months(Months::new(months.checked_mul(steps)?)),
            Self::MonthEnd(months) => {
                month_end(from.checked_add_months(Months::new(months.checked_mul(steps)?))?)
            }
            Self::Seconds(seconds) => {
                let delta = TimeDelta::try_seconds(seconds.checked_mul(i64::from(steps))?)?;
                from.checked_add_signed(delta)
            }
        }
    }
}

/// Calendar months from `a` to `b`, ignoring the day
fn month_diff(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (i64::from(b.year()) - i64::from(a.year())) * 12 + i64::from(b.month()) - i64::from(a.month())
}

fn is_month_end(timestamp: DateTime<Utc>) -> bool {
    timestamp
        .date_naive()
        .succ_opt()
        .is_none_or(|next| next.month() != timestamp.month())
}

/// Same time of day on the last day of the month
fn month_end(timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let first = NaiveDate::from_ymd_opt(timestamp.year(), timestamp.month(), 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some(last.and_time(timestamp.time()).and_utc())
}

/// Min-max scaling parameters of a series
///
/// Maps values into `[0, 1]` and back. A constant series scales to zero and
/// unscales to its constant value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueScale {
    pub min: f64,
    pub max: f64,
}

impl ValueScale {
    fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map an original value into the scaled space
    pub fn scale(&self, value: f64) -> f64 {
        let span = self.span();
        if span == 0.0 { 0.0 } else { (value - self.min) / span }
    }

    /// Map a scaled value back into original units
    pub fn unscale(&self, value: f64) -> f64 {
        value * self.span() + self.min
    }
}

#[derive(Serialize, Deserialize)]
struct RawSeries {
    id: SeriesId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    observations: Vec<Observation>,
}

/// Ordered, validated, immutable time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries", into = "RawSeries")]
pub struct TimeSeries {
    id: SeriesId,
    unit: Option<String>,
    observations: Arc<[Observation]>,
}

impl TryFrom<RawSeries> for TimeSeries {
    type Error = Error;

    fn try_from(raw: RawSeries) -> Result<Self> {
        let series = Self::new(raw.id, raw.observations)?;
        Ok(match raw.unit {
            Some(unit) => series.with_unit(unit),
            None => series,
        })
    }
}

impl From<TimeSeries> for RawSeries {
    fn from(series: TimeSeries) -> Self {
        Self {
            id: series.id,
            unit: series.unit,
            observations: series.observations.to_vec(),
        }
    }
}

impl TimeSeries {
    /// Create a series, validating ordering and values
    ///
    /// Timestamps must be strictly increasing and every value finite.
    pub fn new(id: impl Into<SeriesId>, observations: Vec<Observation>) -> Result<Self> {
        let id = id.into();

        if let Some(bad) = observations.iter().find(|o| !o.value.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "series {id} has a non-finite value at {}",
                bad.timestamp
            )));
        }

        if let Some(pair) = observations
            .windows(2)
            .find(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(Error::InvalidInput(format!(
                "series {id} timestamps must be strictly increasing ({} then {})",
                pair[0].timestamp, pair[1].timestamp
            )));
        }

        Ok(Self {
            id,
            unit: None,
            observations: observations.into(),
        })
    }

    /// Attach a unit of measure
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn id(&self) -> &SeriesId {
        &self.id
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Observation values in time order
    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    /// Infer the sampling step
    ///
    /// Calendar cadences take precedence over fixed durations. Returns `None`
    /// for series with fewer than two observations or with uneven gaps.
    pub fn cadence(&self) -> Option<Cadence> {
        let observations = &self.observations;
        let first = observations.first()?.timestamp;
        let second = observations.get(1)?.timestamp;

        if let Some(months) = u32::try_from(month_diff(first, second)).ok().filter(|&m| m > 0) {
            let stepped = observations.windows(2).all(|pair| {
                month_diff(pair[0].timestamp, pair[1].timestamp) == i64::from(months)
                    && pair[1].timestamp.time() == first.time()
            });
            if stepped {
                if observations.iter().all(|o| is_month_end(o.timestamp)) {
                    return Some(Cadence::MonthEnd(months));
                }
                // Anchored on the first day-of-month: Jan 30, Feb 29, Mar 30.
                let anchored = observations.iter().zip(0u32..).all(|(o, i)| {
                    i.checked_mul(months)
                        .and_then(|n| first.checked_add_months(Months::new(n)))
                        == Some(o.timestamp)
                });
                if anchored {
                    return Some(Cadence::Months(months));
                }
            }
        }

        let step = (second - first).num_seconds();
        let even = observations
            .windows(2)
            .all(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() == step);
        (step > 0 && even).then_some(Cadence::Seconds(step))
    }

    /// The `horizon` timestamps following the last observation
    pub fn future_timestamps(&self, horizon: usize) -> Option<Vec<DateTime<Utc>>> {
        let cadence = self.cadence()?;
        // Day-of-month cadences step from the first observation so a clamped
        // day is restored on later months.
        let (base, offset) = match cadence {
            Cadence::Months(_) => (self.first()?.timestamp, self.len() - 1),
            Cadence::MonthEnd(_) | Cadence::Seconds(_) => (self.last()?.timestamp, 0),
        };
        (1..=horizon)
            .map(|step| cadence.advance(base, u32::try_from(step + offset).ok()?))
            .collect()
    }

    /// Observations inside a date range, as a new series with the same id
    pub fn slice(&self, range: &DateRange) -> Self {
        let observations: Vec<Observation> = self
            .observations
            .iter()
            .filter(|o| range.contains(o.timestamp))
            .copied()
            .collect();

        Self {
            id: self.id.clone(),
            unit: self.unit.clone(),
            observations: observations.into(),
        }
    }

    /// Split off the last `holdout` observations for backtesting
    ///
    /// Returns the training series and the held-out actuals. The training
    /// part must keep at least one observation.
    pub fn split_holdout(&self, holdout: usize) -> Result<(Self, Vec<Observation>)> {
        if holdout == 0 || holdout >= self.len() {
            return Err(Error::InvalidInput(format!(
                "cannot hold out {holdout} of {} observations in series {}",
                self.len(),
                self.id
            )));
        }

        let cut = self.len() - holdout;
        let training = Self {
            id: self.id.clone(),
            unit: self.unit.clone(),
            observations: self.observations[..cut].into(),
        };
        Ok((training, self.observations[cut..].to_vec()))
    }

    /// Min-max scaled copy of the series together with its scale
    pub fn min_max_scaled(&self) -> (Self, ValueScale) {
        let (min, max) = self
            .observations
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), o| {
                (lo.min(o.value), hi.max(o.value))
            });
        let scale = if self.is_empty() {
            ValueScale { min: 0.0, max: 1.0 }
        } else {
            ValueScale { min, max }
        };

        let observations: Vec<Observation> = self
            .observations
            .iter()
            .map(|o| Observation::new(o.timestamp, scale.scale(o.value)))
            .collect();

        let scaled = Self {
            id: self.id.clone(),
            unit: None,
            observations: observations.into(),
        };
        (scaled, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn month(year: i32, month: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
    }

    fn monthly(values: &[f64]) -> TimeSeries {
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation::new(month(2020 + (i / 12) as i32, (i % 12) as u32 + 1), v))
            .collect();
        TimeSeries::new("pce", observations).unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2020-03-01"), Some(month(2020, 3)));
        assert_eq!(parse_timestamp("2020-03-01T00:00:00Z"), Some(month(2020, 3)));
        assert_eq!(parse_timestamp("2020-03-01 00:00:00"), Some(month(2020, 3)));
        assert_eq!(parse_timestamp("March 2020"), None);
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let observations = vec![
            Observation::new(month(2020, 2), 1.0),
            Observation::new(month(2020, 1), 2.0),
        ];
        assert!(matches!(
            TimeSeries::new("pce", observations),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let observations = vec![
            Observation::new(month(2020, 1), 1.0),
            Observation::new(month(2020, 1), 2.0),
        ];
        assert!(TimeSeries::new("pce", observations).is_err());
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let observations = vec![Observation::new(month(2020, 1), f64::NAN)];
        assert!(TimeSeries::new("pce", observations).is_err());
    }

    #[test]
    fn test_monthly_cadence_and_future_timestamps() {
        let series = monthly(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(series.cadence(), Some(Cadence::Months(1)));

        let future = series.future_timestamps(3).unwrap();
        assert_eq!(future, vec![month(2021, 1), month(2021, 2), month(2021, 3)]);
    }

    #[test]
    fn test_daily_cadence() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let observations = (0..5)
            .map(|i| Observation::new(start + TimeDelta::days(i), i as f64))
            .collect();
        let series = TimeSeries::new("daily", observations).unwrap();
        assert_eq!(series.cadence(), Some(Cadence::Seconds(86_400)));
        assert_eq!(
            series.future_timestamps(1).unwrap(),
            vec![start + TimeDelta::days(5)]
        );
    }

    fn dated(dates: &[&str]) -> TimeSeries {
        let observations = dates
            .iter()
            .zip(1_i32..)
            .map(|(d, v)| Observation::new(parse_timestamp(d).unwrap(), f64::from(v)))
            .collect();
        TimeSeries::new("pce", observations).unwrap()
    }

    #[test]
    fn test_month_end_cadence() {
        let series = dated(&[
            "2020-01-31", "2020-02-29", "2020-03-31", "2020-04-30", "2020-05-31", "2020-06-30",
            "2020-07-31", "2020-08-31", "2020-09-30", "2020-10-31", "2020-11-30", "2020-12-31",
        ]);
        assert_eq!(series.cadence(), Some(Cadence::MonthEnd(1)));
        assert_eq!(
            series.future_timestamps(3).unwrap(),
            vec![
                parse_timestamp("2021-01-31").unwrap(),
                parse_timestamp("2021-02-28").unwrap(),
                parse_timestamp("2021-03-31").unwrap(),
            ]
        );
    }

    #[test]
    fn test_quarter_end_cadence() {
        let series = dated(&["2019-12-31", "2020-03-31", "2020-06-30", "2020-09-30"]);
        assert_eq!(series.cadence(), Some(Cadence::MonthEnd(3)));
        assert_eq!(
            series.future_timestamps(2).unwrap(),
            vec![
                parse_timestamp("2020-12-31").unwrap(),
                parse_timestamp("2021-03-31").unwrap(),
            ]
        );
    }

    #[test]
    fn test_clamped_day_keeps_anchor() {
        let series = dated(&["2020-01-30", "2020-02-29", "2020-03-30", "2020-04-30"]);
        assert_eq!(series.cadence(), Some(Cadence::Months(1)));
        assert_eq!(
            series.future_timestamps(1).unwrap(),
            vec![parse_timestamp("2020-05-30").unwrap()]
        );
    }

    #[test]
    fn test_daily_series_across_month_end() {
        let series = dated(&["2024-01-30", "2024-01-31", "2024-02-01", "2024-02-02"]);
        assert_eq!(series.cadence(), Some(Cadence::Seconds(86_400)));
    }

    #[test]
    fn test_irregular_series_has_no_cadence() {
        let observations = vec![
            Observation::new(month(2020, 1), 1.0),
            Observation::new(month(2020, 2), 2.0),
            Observation::new(month(2020, 5), 3.0),
        ];
        let series = TimeSeries::new("irregular", observations).unwrap();
        assert_eq!(series.cadence(), None);
        assert!(series.future_timestamps(2).is_none());
    }

    #[test]
    fn test_split_holdout() {
        let series = monthly(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let (training, actuals) = series.split_holdout(2).unwrap();
        assert_eq!(training.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(actuals.len(), 2);
        assert_eq!(actuals[0].value, 4.0);

        assert!(series.split_holdout(5).is_err());
        assert!(series.split_holdout(0).is_err());
    }

    #[test]
    fn test_slice_by_range() {
        let series = monthly(&[1.0, 2.0, 3.0, 4.0]);
        let sliced = series.slice(&DateRange::between(month(2020, 2), month(2020, 3)));
        assert_eq!(sliced.values(), vec![2.0, 3.0]);
        assert_eq!(sliced.id(), series.id());
    }

    #[test]
    fn test_min_max_round_trip() {
        let series = monthly(&[10.0, 20.0, 30.0]);
        let (scaled, scale) = series.min_max_scaled();
        assert_eq!(scaled.values(), vec![0.0, 0.5, 1.0]);
        assert_eq!(scale.unscale(0.5), 20.0);

        let flat = monthly(&[4.0, 4.0]);
        let (scaled, scale) = flat.min_max_scaled();
        assert_eq!(scaled.values(), vec![0.0, 0.0]);
        assert_eq!(scale.unscale(0.0), 4.0);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"id":"x","observations":[
            {"timestamp":"2020-02-01T00:00:00Z","value":1.0},
            {"timestamp":"2020-01-01T00:00:00Z","value":2.0}]}"#;
        assert!(serde_json::from_str::<TimeSeries>(json).is_err());

        let json = r#"{"id":"x","unit":"weeks","observations":[
            {"timestamp":"2020-01-01T00:00:00Z","value":1.0}]}"#;
        let series: TimeSeries = serde_json::from_str(json).unwrap();
        assert_eq!(series.unit(), Some("weeks"));
        assert_eq!(series.len(), 1);
    }
}
