use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use har_rust_core::*;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Search segmentation, feature and classifier combinations for the best
/// activity recognition pipeline on a labelled sensor dataset.
#[derive(Parser, Debug)]
#[command(name = "har-search", version, about, long_about = None)]
struct Cli {
    /// Search configuration (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Labelled dataset (YAML with `events` and `activities`).
    #[arg(short, long, value_name = "FILE")]
    dataset: PathBuf,

    /// Override the number of worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run trials one at a time, in enumeration order.
    #[arg(long)]
    sequential: bool,

    /// Abort the search on the first failing trial.
    #[arg(long)]
    fail_fast: bool,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "har_rust_core={},har_search={}",
            level.as_str().to_lowercase(),
            level.as_str().to_lowercase()
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = SearchConfig::from_path(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(workers) = cli.workers {
        config.workers = Some(workers);
    }
    config.sequential |= cli.sequential;
    config.fail_fast |= cli.fail_fast;
    config.validate()?;

    let raw = std::fs::read_to_string(&cli.dataset)
        .with_context(|| format!("reading dataset {}", cli.dataset.display()))?;
    let dataset: Dataset = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing dataset {}", cli.dataset.display()))?;
    info!(
        events = dataset.events.len(),
        activities = dataset.activities.events().len(),
        "loaded dataset"
    );

    let report = config
        .optimizer()
        .optimize(&config.to_catalog(), &dataset, config.schedule())?;
    print!("{}", report);
    Ok(())
}
