use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edge_api_harness::client::ApiClient;
use edge_api_harness::config::HarnessConfig;
use edge_api_harness::coverage::{self, BatchSummary, CoverageReport, CoverageTrend};
use edge_api_harness::models::{ApiCall, CallRecord, Inventory};
use edge_api_harness::report::{self, ReportFormat};
use edge_api_harness::scheduler::{Dispatcher, Scheduler};

#[derive(Parser)]
#[command(name = "edge-api-harness")]
#[command(about = "Resilient API call harness and coverage reporter")]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan of API calls and record the results
    Run {
        /// JSON list of calls: [{"method", "path", "category", "body"?}]
        #[arg(short, long)]
        plan: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        max_concurrent: Option<usize>,
        #[arg(long, default_value = "data/records.json")]
        records: PathBuf,
        #[arg(long, default_value = "data/observed.json")]
        observed: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
    },
    /// Compare an expected endpoint inventory with an observed one
    Compare {
        #[arg(short, long)]
        expected: PathBuf,
        #[arg(long)]
        observed: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two JSON coverage reports (before and after)
    Trend {
        #[arg(long)]
        before: PathBuf,
        #[arg(long)]
        after: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize pass rates of recorded calls
    Summary {
        #[arg(short, long)]
        records: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn emit(output: Option<&Path>, contents: &str) -> Result<()> {
    match output {
        Some(path) => {
            write_file(path, contents)?;
            info!("report saved to {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            plan,
            config,
            max_concurrent,
            records,
            observed,
            format,
        } => {
            let config = HarnessConfig::load(config.as_deref())?;
            let calls: Vec<ApiCall> = read_json(&plan)?;
            info!("loaded {} calls from {}", calls.len(), plan.display());

            let client = ApiClient::new(&config)?;
            let dispatcher = Dispatcher::new(Arc::new(client), config.retry.clone(), config.breaker.clone());
            let scheduler = Scheduler::new(Arc::new(dispatcher), &config.scheduler);
            let results = scheduler
                .run_batch(calls, max_concurrent.unwrap_or(config.scheduler.max_concurrent))
                .await?;

            write_file(&records, &serde_json::to_string_pretty(&results)?)?;
            info!("call records saved to {}", records.display());

            let inventory = Inventory::observed_from_records(&results);
            write_file(&observed, &serde_json::to_string_pretty(&inventory)?)?;
            info!("observed inventory saved to {}", observed.display());

            let summary = BatchSummary::from_records(&results);
            emit(None, &report::render_summary(&summary, format)?)?;
        }
        Commands::Compare {
            expected,
            observed,
            format,
            output,
        } => {
            let expected = Inventory::load(&expected).with_context(|| format!("failed to load {}", expected.display()))?;
            let observed = Inventory::load(&observed).with_context(|| format!("failed to load {}", observed.display()))?;
            let coverage = coverage::compare_inventories(&expected, &observed);
            emit(output.as_deref(), &report::render(&coverage, format)?)?;
        }
        Commands::Trend {
            before,
            after,
            format,
            output,
        } => {
            let before: CoverageReport = read_json(&before)?;
            let after: CoverageReport = read_json(&after)?;
            let trend = CoverageTrend::between(&before, &after)?;
            emit(output.as_deref(), &report::render_trend(&trend, format)?)?;
        }
        Commands::Summary {
            records,
            format,
            output,
        } => {
            let records: Vec<CallRecord> = read_json(&records)?;
            let summary = BatchSummary::from_records(&records);
            emit(output.as_deref(), &report::render_summary(&summary, format)?)?;
        }
    }

    Ok(())
}
