//! Command-line interface for forecast-rs

mod output;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use forecast_adapters::{AdapterRegistry, ModelsFile};
use forecast_core::{DateRange, Error, ModelId, SeriesId, parse_timestamp};
use forecast_engine::{CompareConfig, ForecastOrchestrator, ScaleMode, SelectionOptions};
use forecast_series::{CachedSeriesRepository, JsonFileRepository, SeriesRepository};
use forecast_utils::{LogFormat, init_tracing_with};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "forecast-cli")]
#[command(about = "Compare forecasts from several models on one time series", long_about = None)]
struct Cli {
    /// JSON table export holding the historical series
    #[arg(short, long, global = true, default_value = "sales_economics.json")]
    data: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forecast a series with several models and compare the results
    Compare(CompareArgs),
    /// Inspect the stored series
    #[command(subcommand)]
    Series(SeriesCommand),
}

#[derive(Subcommand, Debug)]
enum SeriesCommand {
    /// List the identifiers of every stored series
    List,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Series to forecast
    #[arg(short, long)]
    series: String,

    /// Number of future periods
    #[arg(short = 'H', long, default_value_t = 12)]
    horizon: usize,

    /// Models to compare, in display order
    #[arg(short, long, value_delimiter = ',', required = true)]
    models: Vec<String>,

    /// Model registry file; the local baselines are used when omitted
    #[arg(long)]
    models_config: Option<PathBuf>,

    /// Per-model option as MODEL.KEY=VALUE (VALUE is parsed as JSON when possible)
    #[arg(short, long = "option", value_parser = parse_model_option)]
    options: Vec<ModelOption>,

    /// First date to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date)]
    start: Option<DateTime<Utc>>,

    /// Last date to include (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date)]
    end: Option<DateTime<Utc>>,

    /// Deadline for the whole comparison, in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Deadline for a single model call, in seconds
    #[arg(long, default_value_t = 60)]
    call_timeout: u64,

    /// Retries after the first attempt for transient failures
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Fill interior gaps linearly when aligning forecasts
    #[arg(long)]
    interpolate: bool,

    /// Score the models against the last HORIZON observations
    #[arg(long)]
    backtest: bool,

    /// Forecast on min-max scaled values
    #[arg(long)]
    normalized: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// One `MODEL.KEY=VALUE` argument
#[derive(Debug, Clone, PartialEq)]
struct ModelOption {
    model: ModelId,
    key: String,
    value: serde_json::Value,
}

fn parse_model_option(raw: &str) -> Result<ModelOption, String> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected MODEL.KEY=VALUE, got '{raw}'"))?;
    let (model, key) = target
        .split_once('.')
        .filter(|(model, key)| !model.is_empty() && !key.is_empty())
        .ok_or_else(|| format!("expected MODEL.KEY before '=', got '{target}'"))?;

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok(ModelOption {
        model: ModelId::new(model),
        key: key.to_string(),
        value,
    })
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| format!("invalid date '{raw}'"))
}

fn selection_options(options: Vec<ModelOption>) -> SelectionOptions {
    let mut selection = SelectionOptions::new();
    for option in options {
        selection
            .entry(option.model)
            .or_default()
            .insert(option.key, option.value);
    }
    selection
}

impl CompareArgs {
    fn range(&self) -> DateRange {
        let mut range = DateRange::all();
        if let Some(start) = self.start {
            range = range.with_start(start);
        }
        if let Some(end) = self.end {
            range = range.with_end(end);
        }
        range
    }

    fn compare_config(&self) -> anyhow::Result<CompareConfig> {
        let scale = if self.normalized {
            ScaleMode::MinMax
        } else {
            ScaleMode::Original
        };
        let config = CompareConfig::builder()
            .global_timeout(Duration::from_secs(self.timeout))
            .call_timeout(Duration::from_secs(self.call_timeout))
            .max_retries(self.retries)
            .interpolate(self.interpolate)
            .backtest(self.backtest)
            .scale(scale)
            .build()?;
        Ok(config)
    }

    fn models_file(&self) -> anyhow::Result<ModelsFile> {
        match &self.models_config {
            Some(path) => forecast_utils::load_json(path)
                .with_context(|| format!("loading model registry {}", path.display())),
            None => Ok(ModelsFile::local_defaults()),
        }
    }
}

async fn open_repository(path: &Path) -> anyhow::Result<JsonFileRepository> {
    JsonFileRepository::open(path)
        .await
        .with_context(|| format!("opening data file {}", path.display()))
}

async fn compare(data: &Path, args: CompareArgs) -> anyhow::Result<()> {
    if args.horizon == 0 {
        bail!("--horizon must be at least 1");
    }

    let registry = AdapterRegistry::from_config(&args.models_file()?)?;
    let repository = CachedSeriesRepository::new(
        open_repository(data).await?,
        Duration::from_secs(300),
    );
    let orchestrator = ForecastOrchestrator::new(registry, args.compare_config()?)
        .with_repository(Arc::new(repository));

    let series_id = SeriesId::new(args.series.as_str());
    let models: Vec<ModelId> = args.models.iter().map(|m| ModelId::new(m.trim())).collect();
    let range = args.range();
    let format = args.format;
    let options = selection_options(args.options);

    info!("Comparing {} models on {}", models.len(), series_id);
    let report = match orchestrator
        .compare_stored(&series_id, &range, args.horizon, &models, &options)
        .await
    {
        Ok(report) => report,
        Err(Error::AllModelsFailed { results }) => {
            match format {
                OutputFormat::Table => print!("{}", output::render_failures(&results)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            }
            bail!("all {} models failed for {}", results.len(), series_id);
        }
        Err(err) => return Err(err.into()),
    };

    match format {
        OutputFormat::Table => println!("{}", output::render_report(&report)),
        OutputFormat::Json => println!("{}", report.to_json_pretty()?),
    }
    Ok(())
}

async fn list_series(data: &Path) -> anyhow::Result<()> {
    let repository = open_repository(data).await?;
    for id in repository.list_series().await? {
        println!("{id}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_tracing_with(format, "warn");

    match cli.command {
        Command::Compare(args) => compare(&cli.data, args).await,
        Command::Series(SeriesCommand::List) => list_series(&cli.data).await,
    }
}
