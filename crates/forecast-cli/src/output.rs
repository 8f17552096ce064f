//! Table rendering of comparison reports

use comfy_table::{Cell, Color, Table};
use forecast_core::{ForecastResult, ForecastStatus};
use forecast_engine::{ComparisonReport, Exclusion};

fn status_cell(result: &ForecastResult) -> Cell {
    match &result.status {
        ForecastStatus::Success => Cell::new("success").fg(Color::Green),
        ForecastStatus::Partial { reason } => Cell::new(format!("partial: {reason}")).fg(Color::Yellow),
        ForecastStatus::Failed { kind, message } => {
            Cell::new(format!("{kind}: {message}")).fg(Color::Red)
        }
    }
}

fn results_table(results: &[ForecastResult]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Model", "Status", "Attempts", "Points"]);
    for result in results {
        table.add_row(vec![
            Cell::new(&result.model),
            status_cell(result),
            Cell::new(result.attempts),
            Cell::new(result.points.len()),
        ]);
    }
    table
}

fn forecast_table(report: &ComparisonReport) -> Table {
    let mut table = Table::new();
    let mut header = vec!["Date".to_string()];
    header.extend(report.aligned.iter().map(|a| a.model.to_string()));
    table.set_header(header);

    for (i, timestamp) in report.axis.iter().enumerate() {
        let mut row = vec![Cell::new(timestamp.format("%Y-%m-%d"))];
        for aligned in &report.aligned {
            let value = format!("{:.3}", aligned.values[i]);
            let cell = if aligned.interpolated.contains(timestamp) {
                Cell::new(format!("{value}*")).fg(Color::Yellow)
            } else {
                Cell::new(value)
            };
            row.push(cell);
        }
        table.add_row(row);
    }
    table
}

fn pairwise_table(report: &ComparisonReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Model A", "Model B", "Mean abs diff", "Max divergence", "At"]);
    for pair in &report.pairwise {
        table.add_row(vec![
            Cell::new(&pair.model_a),
            Cell::new(&pair.model_b),
            Cell::new(format!("{:.4}", pair.mean_abs_diff)),
            Cell::new(format!("{:.4}", pair.max_divergence)),
            Cell::new(pair.max_divergence_at.format("%Y-%m-%d")),
        ]);
    }
    table
}

/// Render the per-model outcomes of a comparison where no model succeeded
pub fn render_failures(results: &[ForecastResult]) -> String {
    format!("No usable forecast\n\n{}\n", results_table(results))
}

/// Render every section of a report as text tables
pub fn render_report(report: &ComparisonReport) -> String {
    let mut out = format!(
        "Series {} | horizon {}\n\n{}\n",
        report.series_id,
        report.horizon,
        results_table(&report.results)
    );

    if !report.aligned.is_empty() {
        out.push_str(&format!("\nForecasts\n{}\n", forecast_table(report)));
        if report.aligned.iter().any(|a| !a.interpolated.is_empty()) {
            out.push_str("* interpolated\n");
        }
    }

    for excluded in &report.excluded {
        let reason = match &excluded.exclusion {
            Exclusion::InsufficientData => "no forecast points".to_string(),
            Exclusion::MissingTimestamps { missing } => {
                format!("missing {} axis dates", missing.len())
            }
        };
        out.push_str(&format!("Excluded {}: {}\n", excluded.model, reason));
    }

    if !report.pairwise.is_empty() {
        out.push_str(&format!("\nAgreement\n{}\n", pairwise_table(report)));
    }

    if let Some(backtest) = &report.backtest {
        let mut table = Table::new();
        table.set_header(vec!["Rank", "Model", "MAE", "MAPE %", "Matched"]);
        for score in &backtest.scores {
            table.add_row(vec![
                Cell::new(score.rank),
                Cell::new(&score.model),
                Cell::new(format!("{:.4}", score.mae)),
                Cell::new(score.mape.map_or_else(|| "-".to_string(), |m| format!("{m:.2}"))),
                Cell::new(score.matched),
            ]);
        }
        out.push_str(&format!(
            "\nBacktest on last {} observations\n{}\n",
            backtest.actuals.len(),
            table
        ));
        for model in &backtest.unscored {
            out.push_str(&format!("Unscored {model}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use forecast_core::{FailureKind, ForecastPoint, ForecastRequest, Observation, TimeSeries};
    use forecast_engine::ComparisonEngine;

    fn report() -> ComparisonReport {
        let observations = (1..=6)
            .map(|m| Observation::new(Utc.with_ymd_and_hms(2022, m, 1, 0, 0, 0).unwrap(), f64::from(m)))
            .collect();
        let request = ForecastRequest::new(TimeSeries::new("pce", observations).unwrap(), 2);
        let points = |value: f64| {
            vec![
                ForecastPoint::new(Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap(), value),
                ForecastPoint::new(Utc.with_ymd_and_hms(2022, 8, 1, 0, 0, 0).unwrap(), value),
            ]
        };

        let results = vec![
            ForecastResult::success("naive".into(), &request, points(6.0)),
            ForecastResult::success("drift".into(), &request, points(7.5)),
            ForecastResult::failed(
                "xgboost".into(),
                &request,
                FailureKind::BackendUnavailable,
                "connection refused",
            ),
        ];
        ComparisonEngine::new(false)
            .compare(request.series.id(), 2, results)
            .unwrap()
    }

    #[test]
    fn test_render_report_sections() {
        let text = render_report(&report());

        assert!(text.contains("Series pce | horizon 2"));
        assert!(text.contains("BackendUnavailable: connection refused"));
        assert!(text.contains("2022-07-01"));
        assert!(text.contains("Agreement"));
        assert!(text.contains("1.5000"));
        assert!(!text.contains("Backtest"));
    }

    #[test]
    fn test_render_failures_keeps_each_model() {
        let failed: Vec<ForecastResult> = report()
            .results
            .into_iter()
            .filter(|r| !r.is_usable())
            .chain(std::iter::once(ForecastResult {
                model: "arima".into(),
                status: ForecastStatus::Failed {
                    kind: FailureKind::Timeout,
                    message: "global timeout of 120s elapsed".to_string(),
                },
                points: Vec::new(),
                attempts: 3,
                ..report().results[0].clone()
            }))
            .collect();

        let text = render_failures(&failed);
        assert!(text.contains("xgboost"));
        assert!(text.contains("BackendUnavailable: connection refused"));
        assert!(text.contains("Timeout: global timeout of 120s elapsed"));
    }
}
