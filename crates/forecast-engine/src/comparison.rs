//! Cross-model comparison
//!
//! Pure functions over normalized results: no I/O, no clocks. Given the
//! same inputs the engine always builds the same report.

use crate::report::{
    AlignedSeries, BacktestScore, BacktestSummary, ComparisonReport, ExcludedModel, Exclusion,
    PairwiseMetrics,
};
use chrono::{DateTime, Utc};
use forecast_core::{Error, ForecastPoint, ForecastResult, ModelId, Observation, Result, SeriesId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonEngine {
    interpolate: bool,
}

impl ComparisonEngine {
    pub fn new(interpolate: bool) -> Self {
        Self { interpolate }
    }

    /// Align the usable forecasts on a common axis and compute pairwise
    /// agreement
    ///
    /// Every result must belong to `series_id`, cover `horizon` and carry
    /// strictly increasing timestamps; anything else is an
    /// [`Error::AlignmentMismatch`].
    pub fn compare(
        &self,
        series_id: &SeriesId,
        horizon: usize,
        results: Vec<ForecastResult>,
    ) -> Result<ComparisonReport> {
        check_alignment(series_id, horizon, &results)?;

        let axis: Vec<DateTime<Utc>> = results
            .iter()
            .filter(|r| r.is_usable())
            .flat_map(|r| r.points.iter().map(|p| p.timestamp))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut aligned = Vec::new();
        let mut excluded = Vec::new();

        for result in results.iter().filter(|r| r.is_usable()) {
            match self.align(result, &axis) {
                Ok(series) => aligned.push(series),
                Err(exclusion) => excluded.push(ExcludedModel {
                    model: result.model.clone(),
                    exclusion,
                }),
            }
        }

        let pairwise = pairwise_metrics(&axis, &aligned);

        Ok(ComparisonReport {
            series_id: series_id.clone(),
            horizon,
            axis,
            results,
            aligned,
            excluded,
            pairwise,
            backtest: None,
        })
    }

    fn align(&self, result: &ForecastResult, axis: &[DateTime<Utc>]) -> std::result::Result<AlignedSeries, Exclusion> {
        if result.points.is_empty() {
            return Err(Exclusion::InsufficientData);
        }

        let by_time: BTreeMap<DateTime<Utc>, f64> = result
            .points
            .iter()
            .map(|p| (p.timestamp, p.estimate))
            .collect();

        let mut values = Vec::with_capacity(axis.len());
        let mut interpolated = Vec::new();
        let mut missing = Vec::new();

        for &timestamp in axis {
            if let Some(&value) = by_time.get(&timestamp) {
                values.push(value);
            } else if let Some(value) = self.interpolate_at(&by_time, timestamp) {
                values.push(value);
                interpolated.push(timestamp);
            } else {
                missing.push(timestamp);
            }
        }

        if missing.is_empty() {
            Ok(AlignedSeries {
                model: result.model.clone(),
                values,
                interpolated,
            })
        } else {
            Err(Exclusion::MissingTimestamps { missing })
        }
    }

    /// Linear interpolation in time between the nearest known neighbours
    ///
    /// Never extrapolates past the model's first or last point.
    fn interpolate_at(&self, known: &BTreeMap<DateTime<Utc>, f64>, at: DateTime<Utc>) -> Option<f64> {
        if !self.interpolate {
            return None;
        }
        let (&t0, &v0) = known.range(..at).next_back()?;
        let (&t1, &v1) = known.range(at..).next()?;

        let span = (t1 - t0).num_milliseconds() as f64;
        let offset = (at - t0).num_milliseconds() as f64;
        Some(v0 + (v1 - v0) * offset / span)
    }

    /// Score backtest forecasts against held-out actuals
    ///
    /// Ranking is ascending by MAPE (models without one last), then MAE,
    /// then selection order.
    pub fn score_backtest(
        &self,
        series_id: &SeriesId,
        actuals: Vec<Observation>,
        results: Vec<ForecastResult>,
    ) -> Result<BacktestSummary> {
        check_alignment(series_id, actuals.len(), &results)?;

        let truth: BTreeMap<DateTime<Utc>, f64> =
            actuals.iter().map(|o| (o.timestamp, o.value)).collect();

        let mut scored: Vec<(usize, BacktestScore)> = Vec::new();
        let mut unscored = Vec::new();

        for (index, result) in results.iter().enumerate() {
            match score(&result.model, &result.points, &truth).filter(|_| result.is_usable()) {
                Some(score) => scored.push((index, score)),
                None => unscored.push(result.model.clone()),
            }
        }

        scored.sort_by(|(ia, a), (ib, b)| {
            let mape = |s: &BacktestScore| s.mape.unwrap_or(f64::INFINITY);
            mape(a)
                .total_cmp(&mape(b))
                .then(a.mae.total_cmp(&b.mae))
                .then(ia.cmp(ib))
        });

        let scores = scored
            .into_iter()
            .enumerate()
            .map(|(position, (_, mut score))| {
                score.rank = position + 1;
                score
            })
            .collect();

        Ok(BacktestSummary {
            actuals,
            results,
            scores,
            unscored,
        })
    }
}

fn check_alignment(series_id: &SeriesId, horizon: usize, results: &[ForecastResult]) -> Result<()> {
    for result in results {
        if &result.series_id != series_id {
            return Err(Error::AlignmentMismatch(format!(
                "{} forecasts series {}, expected {}",
                result.model, result.series_id, series_id
            )));
        }
        if result.horizon != horizon {
            return Err(Error::AlignmentMismatch(format!(
                "{} covers horizon {}, expected {}",
                result.model, result.horizon, horizon
            )));
        }
        if result.points.len() > horizon {
            return Err(Error::AlignmentMismatch(format!(
                "{} carries {} points for horizon {}",
                result.model,
                result.points.len(),
                horizon
            )));
        }
        if result.points.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(Error::AlignmentMismatch(format!(
                "{} points are not in strictly increasing time order",
                result.model
            )));
        }
    }
    Ok(())
}

fn pairwise_metrics(axis: &[DateTime<Utc>], aligned: &[AlignedSeries]) -> Vec<PairwiseMetrics> {
    let mut metrics = Vec::new();

    for (i, a) in aligned.iter().enumerate() {
        for b in &aligned[i + 1..] {
            let diffs: Vec<f64> = a
                .values
                .iter()
                .zip(&b.values)
                .map(|(x, y)| (x - y).abs())
                .collect();

            let Some((max_index, &max_divergence)) = diffs
                .iter()
                .enumerate()
                .reduce(|best, next| if next.1 > best.1 { next } else { best })
            else {
                continue;
            };

            metrics.push(PairwiseMetrics {
                model_a: a.model.clone(),
                model_b: b.model.clone(),
                mean_abs_diff: diffs.iter().sum::<f64>() / diffs.len() as f64,
                max_divergence,
                max_divergence_at: axis[max_index],
            });
        }
    }

    metrics
}

fn score(
    model: &ModelId,
    points: &[ForecastPoint],
    truth: &BTreeMap<DateTime<Utc>, f64>,
) -> Option<BacktestScore> {
    let pairs: Vec<(f64, f64)> = points
        .iter()
        .filter_map(|p| truth.get(&p.timestamp).map(|&actual| (p.estimate, actual)))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let mae = pairs.iter().map(|(f, a)| (f - a).abs()).sum::<f64>() / pairs.len() as f64;

    let percentages: Vec<f64> = pairs
        .iter()
        .filter(|(_, actual)| *actual != 0.0)
        .map(|(f, a)| ((f - a) / a).abs() * 100.0)
        .collect();
    let mape = (!percentages.is_empty())
        .then(|| percentages.iter().sum::<f64>() / percentages.len() as f64);

    Some(BacktestScore {
        model: model.clone(),
        rank: 0,
        matched: pairs.len(),
        mae,
        mape,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use forecast_core::{FailureKind, ForecastRequest, ForecastStatus, TimeSeries};

    fn month(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, m, 1, 0, 0, 0).unwrap()
    }

    fn request(horizon: usize) -> ForecastRequest {
        let series = TimeSeries::new("pce", vec![Observation::new(month(1), 1.0)]).unwrap();
        ForecastRequest::new(series, horizon)
    }

    fn result(model: &str, horizon: usize, points: &[(u32, f64)]) -> ForecastResult {
        let points = points
            .iter()
            .map(|&(m, v)| ForecastPoint::new(month(m), v))
            .collect();
        ForecastResult::success(model.into(), &request(horizon), points)
    }

    fn failed(model: &str, horizon: usize) -> ForecastResult {
        ForecastResult::failed(model.into(), &request(horizon), FailureKind::BackendUnavailable, "down")
    }

    fn pce() -> SeriesId {
        SeriesId::new("pce")
    }

    #[test]
    fn test_identical_forecasts_do_not_diverge() {
        let points = [(2, 1.0), (3, 2.0), (4, 3.0)];
        let report = ComparisonEngine::default()
            .compare(&pce(), 3, vec![result("a", 3, &points), result("b", 3, &points)])
            .unwrap();

        assert_eq!(report.pairwise.len(), 1);
        assert_eq!(report.pairwise[0].mean_abs_diff, 0.0);
        assert_eq!(report.pairwise[0].max_divergence, 0.0);
        assert_eq!(report.pairwise[0].max_divergence_at, month(2));
    }

    #[test]
    fn test_pairwise_metrics_in_selection_order() {
        let report = ComparisonEngine::default()
            .compare(
                &pce(),
                2,
                vec![
                    result("b", 2, &[(2, 1.0), (3, 1.0)]),
                    result("a", 2, &[(2, 2.0), (3, 4.0)]),
                    result("c", 2, &[(2, 1.0), (3, 2.0)]),
                ],
            )
            .unwrap();

        let order: Vec<(&str, &str)> = report
            .pairwise
            .iter()
            .map(|p| (p.model_a.as_str(), p.model_b.as_str()))
            .collect();
        assert_eq!(order, vec![("b", "a"), ("b", "c"), ("a", "c")]);

        let ba = &report.pairwise[0];
        assert_eq!(ba.mean_abs_diff, 2.0);
        assert_eq!(ba.max_divergence, 3.0);
        assert_eq!(ba.max_divergence_at, month(3));
    }

    #[test]
    fn test_failed_results_are_kept_but_not_aligned() {
        let report = ComparisonEngine::default()
            .compare(&pce(), 3, vec![result("naive", 3, &[(2, 1.0), (3, 1.0), (4, 1.0)]), failed("xgboost", 3)])
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.aligned.len(), 1);
        assert!(report.pairwise.is_empty());
        assert_eq!(report.axis.len(), 3);
        assert_eq!(report.failed().count(), 1);
    }

    #[test]
    fn test_missing_timestamps_exclude_model() {
        let report = ComparisonEngine::default()
            .compare(
                &pce(),
                3,
                vec![
                    result("full", 3, &[(2, 1.0), (3, 1.0), (4, 1.0)]),
                    result("gappy", 3, &[(2, 1.0), (4, 3.0)]),
                ],
            )
            .unwrap();

        assert_eq!(report.aligned.len(), 1);
        assert_eq!(
            report.excluded,
            vec![ExcludedModel {
                model: "gappy".into(),
                exclusion: Exclusion::MissingTimestamps {
                    missing: vec![month(3)]
                },
            }]
        );
        assert!(report.pairwise.is_empty());
    }

    #[test]
    fn test_interpolation_fills_interior_gaps_only() {
        let engine = ComparisonEngine::new(true);
        let report = engine
            .compare(
                &pce(),
                3,
                vec![
                    result("full", 3, &[(2, 0.0), (3, 0.0), (4, 0.0)]),
                    result("gappy", 3, &[(2, 1.0), (4, 3.0)]),
                    result("short", 3, &[(2, 1.0), (3, 1.0)]),
                ],
            )
            .unwrap();

        let gappy = report.aligned.iter().find(|a| a.model.as_str() == "gappy").unwrap();
        // February has 28 days and March 31, so March 1 sits 28/59 of the way.
        let expected = 1.0 + 2.0 * 28.0 / 59.0;
        assert!((gappy.values[1] - expected).abs() < 1e-9);
        assert_eq!(gappy.interpolated, vec![month(3)]);

        assert_eq!(report.excluded.len(), 1);
        assert_eq!(report.excluded[0].model.as_str(), "short");
    }

    #[test]
    fn test_empty_success_is_insufficient_data() {
        let report = ComparisonEngine::default()
            .compare(&pce(), 2, vec![result("empty", 2, &[]), result("ok", 2, &[(2, 1.0), (3, 1.0)])])
            .unwrap();

        assert!(matches!(report.results[0].status, ForecastStatus::Partial { .. }));
        assert_eq!(report.excluded[0].exclusion, Exclusion::InsufficientData);
        assert_eq!(report.aligned.len(), 1);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let engine = ComparisonEngine::default();

        let err = engine
            .compare(&pce(), 3, vec![result("a", 3, &[(2, 1.0)]), result("b", 2, &[(2, 1.0)])])
            .unwrap_err();
        assert!(matches!(err, Error::AlignmentMismatch(_)));

        let err = engine
            .compare(&SeriesId::new("unemploy"), 3, vec![result("a", 3, &[(2, 1.0)])])
            .unwrap_err();
        assert!(matches!(err, Error::AlignmentMismatch(_)));

        let err = engine
            .compare(&pce(), 1, vec![result("a", 1, &[(2, 1.0), (3, 1.0)])])
            .unwrap_err();
        assert!(matches!(err, Error::AlignmentMismatch(_)));
    }

    #[test]
    fn test_report_serialization_is_stable() {
        let build = || {
            ComparisonEngine::default()
                .compare(&pce(), 2, vec![result("a", 2, &[(2, 1.0), (3, 2.0)]), result("b", 2, &[(2, 1.5), (3, 2.5)])])
                .unwrap()
        };
        let first = serde_json::to_string(&build()).unwrap();
        let second = serde_json::to_string(&build()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_backtest_ranking() {
        let actuals = vec![Observation::new(month(2), 10.0), Observation::new(month(3), 20.0)];
        let summary = ComparisonEngine::default()
            .score_backtest(
                &pce(),
                actuals,
                vec![
                    result("far", 2, &[(2, 15.0), (3, 25.0)]),
                    result("close", 2, &[(2, 11.0), (3, 21.0)]),
                    failed("down", 2),
                ],
            )
            .unwrap();

        assert_eq!(summary.best().unwrap().model.as_str(), "close");
        assert_eq!(summary.scores[0].rank, 1);
        assert_eq!(summary.scores[0].mae, 1.0);
        assert!((summary.scores[0].mape.unwrap() - 7.5).abs() < 1e-9);
        assert_eq!(summary.scores[1].model.as_str(), "far");
        assert_eq!(summary.unscored, vec![ModelId::new("down")]);
    }

    #[test]
    fn test_mape_skips_zero_actuals() {
        let actuals = vec![Observation::new(month(2), 0.0), Observation::new(month(3), 4.0)];
        let summary = ComparisonEngine::default()
            .score_backtest(&pce(), actuals, vec![result("a", 2, &[(2, 1.0), (3, 5.0)])])
            .unwrap();

        let score = &summary.scores[0];
        assert_eq!(score.mae, 1.0);
        assert_eq!(score.mape, Some(25.0));

        let zeros = vec![Observation::new(month(2), 0.0)];
        let summary = ComparisonEngine::default()
            .score_backtest(&pce(), zeros, vec![result("a", 1, &[(2, 1.0)])])
            .unwrap();
        assert_eq!(summary.scores[0].mape, None);
    }

    #[test]
    fn test_ties_keep_selection_order() {
        let actuals = vec![Observation::new(month(2), 10.0)];
        let summary = ComparisonEngine::default()
            .score_backtest(
                &pce(),
                actuals,
                vec![result("second", 1, &[(2, 9.0)]), result("first", 1, &[(2, 11.0)])],
            )
            .unwrap();
        let order: Vec<&str> = summary.scores.iter().map(|s| s.model.as_str()).collect();
        assert_eq!(order, vec!["second", "first"]);
    }
}
