use anyhow::Result;
use clap::Parser;
use prescription_validator::batch::{collect_response_files, BatchRunner};
use prescription_validator::config::AppConfig;
use prescription_validator::debug_artifact::DebugArtifactWriter;
use prescription_validator::errors::error_logging;
use prescription_validator::fuzzy::MatchingStrategy;
use prescription_validator::inventory::Inventory;
use prescription_validator::observability;
use prescription_validator::pipeline::ValidationPipeline;
use prescription_validator::processor::ResponseProcessor;
use prescription_validator::secondary;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    about = "Validate medicine names from raw model responses against an inventory",
    version
)]
struct Args {
    /// Raw response file, or a directory of .txt/.json responses
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Output directory for results
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Medicine database file (.json, .csv, .tsv or one name per line)
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Inclusive match threshold in [0, 1]
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Number of responses processed concurrently
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Similarity strategy: full or sequence
    #[arg(long)]
    strategy: Option<MatchingStrategy>,
}

/// Command-line values take precedence over the environment
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(output) = &args.output {
        config.directories.output_dir = output.clone();
    }
    if let Some(database) = &args.database {
        config.validation.database_path = Some(database.clone());
    }
    if let Some(threshold) = args.threshold {
        config.validation.match_threshold = threshold;
    }
    if let Some(parallel) = args.parallel {
        config.processing.max_workers = parallel;
    }
    if let Some(strategy) = args.strategy {
        config.validation.strategy = strategy;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    apply_overrides(&mut config, &args);
    if let Err(e) = config.validate() {
        error_logging::log_config_error(&e, "app_config", "startup_validation");
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    observability::init_tracing(&config.observability)?;
    let metrics = match observability::install_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder not installed");
            None
        }
    };
    info!("{}", config.summary());

    let files = collect_response_files(&args.input, args.recursive)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!(
            "No response files found in: {}",
            args.input.display()
        ));
    }
    info!(count = files.len(), "Found response files to process");

    let inventory = Inventory::load_or_absent(&config.validation);
    let validator = secondary::build_validator(&config);
    let pipeline = ValidationPipeline::new(inventory, validator, &config.validation);
    let artifacts = DebugArtifactWriter::new(&config.directories, &config.limits);
    let processor = Arc::new(ResponseProcessor::new(pipeline, artifacts));

    let runner = BatchRunner::new(
        processor,
        config.directories.clone(),
        config.limits.clone(),
        config.processing.max_workers,
    );

    let start = Instant::now();
    let summary = runner.run(files).await;

    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        medicines = summary.medicines,
        elapsed_ms = start.elapsed().as_millis() as u64,
        output_dir = %config.directories.output_dir.display(),
        "Processing complete"
    );

    if let Some(handle) = metrics {
        tracing::debug!(snapshot = %handle.render(), "Metrics snapshot");
    }

    Ok(())
}
