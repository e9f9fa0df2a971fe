use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use emissions_forecast::{load_dataset, DatasetReport, Pipeline, PipelineConfig, VERSION};

#[derive(Parser, Debug)]
#[command(author, version, about = "Emissions categorization and forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON config file; presets fill anything it leaves out
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    preset: Option<Preset>,

    /// Input dataset
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    data: Option<PathBuf>,

    /// Chart output path (PNG)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Periods to forecast; 0 draws the observed series only
    #[arg(long, global = true)]
    horizon: Option<usize>,

    #[arg(long, global = true)]
    min_year: Option<i32>,

    /// -v for debug, -vv for trace
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Analyze, forecast and write the chart (default)
    Run,
    /// Load the dataset and print the data quality report
    Validate,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Preset {
    Forecast,
    Historical,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = build_config(&cli)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config),
        Command::Validate => validate(config),
    }
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match (&cli.config, cli.preset) {
        (Some(path), _) => PipelineConfig::from_file(path)?,
        (None, Some(Preset::Historical)) => PipelineConfig::historical(),
        (None, _) => PipelineConfig::forecast(),
    };

    if let Some(data) = &cli.data {
        config.dataset_path = data.clone();
    }
    if let Some(output) = &cli.output {
        config.output_path = output.clone();
    }
    if let Some(horizon) = cli.horizon {
        config.forecast.horizon = horizon;
    }
    if cli.min_year.is_some() {
        config.min_year = cli.min_year;
    }

    Ok(config)
}

fn run(config: PipelineConfig) -> Result<()> {
    println!("📈 Emissions Forecast v{}", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let config = pipeline.config();

    println!("\n📂 Dataset: {}", config.dataset_path.display());
    let output = pipeline
        .run()
        .with_context(|| format!("Pipeline failed for {}", config.dataset_path.display()))?;

    println!("\n📊 Thresholds: {:?}", output.thresholds.edges);
    for (category, count) in &output.categorization.counts {
        println!("   {:<10} {} records", category.label, count);
    }

    if !output.forecasts.forecasts.is_empty() {
        println!("\n🔮 Forecasts ({})", config.forecast.order);
        for f in &output.forecasts.forecasts {
            let series = &f.forecast;
            println!(
                "   {:<10} {} → {}: {:.3} (normalized) / {:.2} MtCO2e",
                series.category.label,
                series.periods.first().map(|d| d.format("%Y").to_string()).unwrap_or_default(),
                series.periods.last().map(|d| d.format("%Y").to_string()).unwrap_or_default(),
                series.normalized.last().copied().unwrap_or(f64::NAN),
                series.raw.last().copied().unwrap_or(f64::NAN),
            );
        }
    }

    let diagnostics = output.diagnostics();
    if !diagnostics.is_empty() {
        println!("\n⚠️  Diagnostics");
        for diag in diagnostics {
            println!("   {}", diag);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Chart written to {}", config.output_path.display());

    Ok(())
}

fn validate(config: PipelineConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("🔍 Data Quality Report");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let dataset = load_dataset(&config.dataset_path, &config.schema)
        .with_context(|| format!("Failed to load {}", config.dataset_path.display()))?;
    let report = DatasetReport::from_dataset(&dataset);

    println!("\n{}", report.summary());
    println!("Fingerprint: {}", report.fingerprint);
    println!("Entities: {}", report.entity_sample.join(", "));

    if let Some(stats) = &report.stats {
        println!("\n{:<6} {:>14}", "stat", config.schema.measure_column);
        println!("{:<6} {:>14}", "count", stats.count);
        println!("{:<6} {:>14.4}", "mean", stats.mean);
        println!("{:<6} {:>14.4}", "std", stats.std.unwrap_or(f64::NAN));
        println!("{:<6} {:>14.4}", "min", stats.min);
        println!("{:<6} {:>14.4}", "25%", stats.p25);
        println!("{:<6} {:>14.4}", "50%", stats.p50);
        println!("{:<6} {:>14.4}", "75%", stats.p75);
        println!("{:<6} {:>14.4}", "max", stats.max);
    }

    if !report.issues.is_empty() {
        println!("\n⚠️  Issues");
        for issue in &report.issues {
            println!("   [{:?}] {}: {} ({})", issue.severity, issue.field, issue.issue, issue.recommendation);
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.has_critical_issues() {
        anyhow::bail!("dataset has critical quality issues");
    }
    println!("✅ Dataset usable");

    Ok(())
}
