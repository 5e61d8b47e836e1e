//! detector-worker: runs scheduled anomaly detection.
//!
//! Loads function specs from a YAML directory, schedules every active function
//! on its cron expression and queries the metric service on each firing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use vigil_core::config::{load_dotenv, Config};
use vigil_core::FunctionId;
use vigil_detector::store::{LoadResult, LoadStatus};
use vigil_detector::{
    CronScheduler, FileSpecStore, FunctionFactory, HttpMetricClient, JobManager,
    JournalResultStore, MemoryResultStore, ResultStore, SpecStore,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled anomaly detection worker.
#[derive(Parser, Debug)]
#[command(name = "detector-worker", version, about)]
struct Cli {
    /// Directory of function spec YAML files (overrides VIGIL_SPECS_DIR).
    #[arg(long, global = true)]
    specs_dir: Option<PathBuf>,

    /// Base URL of the metric query service (overrides VIGIL_METRIC_URL).
    #[arg(long, global = true)]
    metric_url: Option<String>,

    /// JSON-lines file anomalies are persisted to (overrides VIGIL_RESULTS_PATH).
    #[arg(long, global = true)]
    results_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule functions and run until interrupted.
    Serve {
        /// Only start these function ids (default: every active spec).
        #[arg(long = "function")]
        functions: Vec<FunctionId>,
    },
    /// Run one detection pass inline and print its summary.
    Run {
        #[arg(long)]
        function: FunctionId,
        /// Window start (ISO-8601).
        #[arg(long)]
        start: Option<String>,
        /// Window end (ISO-8601).
        #[arg(long)]
        end: Option<String>,
    },
    /// List loaded function specs.
    List,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.specs_dir {
        config.functions.specs_dir = dir;
    }
    if let Some(url) = cli.metric_url {
        config.metrics.url = url;
    }
    if let Some(path) = cli.results_path {
        config.results.journal_path = Some(path);
    }
    config.log_summary();

    let specs = Arc::new(FileSpecStore::new(config.functions.specs_dir.clone()));
    report_loads(&specs.load_all()?);

    match cli.command {
        Command::List => {
            for spec in specs.find_all()? {
                let state = if spec.is_active { "active" } else { "inactive" };
                println!("{:>6}  {:<8}  {}", spec.id, state, spec);
            }
            Ok(())
        }
        Command::Run {
            function,
            start,
            end,
        } => {
            let scheduler = Arc::new(CronScheduler::current()?);
            let manager = build_manager(&config, specs, scheduler)?;
            let executor = manager.ad_hoc_executor(function, start.as_deref(), end.as_deref())?;
            let summary = executor.run().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Serve { functions } => serve(&config, specs, functions).await,
    }
}

async fn serve(
    config: &Config,
    specs: Arc<FileSpecStore>,
    functions: Vec<FunctionId>,
) -> anyhow::Result<()> {
    let ids: Vec<FunctionId> = if functions.is_empty() {
        specs
            .find_all()?
            .into_iter()
            .filter(|s| s.is_active)
            .map(|s| s.id)
            .collect()
    } else {
        functions
    };

    let scheduler = Arc::new(CronScheduler::current()?);
    let manager = build_manager(config, specs, scheduler.clone())?;

    for id in ids {
        if let Err(e) = manager.start(id) {
            error!(function_id = id, error = %e, "failed to start function");
        }
    }
    info!(active = ?manager.list_active_jobs()?, "detector worker running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let stopped = manager.stop_all()?;
    scheduler.shutdown();
    info!(stopped, "detector worker stopped");
    Ok(())
}

fn build_manager(
    config: &Config,
    specs: Arc<FileSpecStore>,
    scheduler: Arc<CronScheduler>,
) -> anyhow::Result<JobManager> {
    let client = HttpMetricClient::new(
        &config.metrics.url,
        Duration::from_secs(config.metrics.timeout_secs),
    )?;

    let results: Arc<dyn ResultStore> = match &config.results.journal_path {
        Some(path) => Arc::new(JournalResultStore::open(path)?),
        None => {
            warn!("VIGIL_RESULTS_PATH unset, anomalies are kept in memory only");
            Arc::new(MemoryResultStore::new())
        }
    };

    Ok(JobManager::new(
        specs,
        Arc::new(FunctionFactory::with_defaults()),
        scheduler,
        Arc::new(client),
        results,
    ))
}

fn report_loads(results: &[LoadResult]) {
    let mut loaded = 0;
    for result in results {
        match &result.status {
            LoadStatus::Loaded { .. } => loaded += 1,
            LoadStatus::Skipped { reason } => {
                info!(path = %result.path.display(), reason = %reason, "skipped spec file")
            }
            LoadStatus::Failed { error } => {
                warn!(path = %result.path.display(), error = %error, "failed to load spec file")
            }
        }
    }
    info!(loaded, total = results.len(), "function specs loaded");
}
