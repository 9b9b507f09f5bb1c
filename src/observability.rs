//! Observability module for tracing setup, spans, and metrics helpers.
//!
//! This module provides:
//! - Structured logging with configurable levels (pretty or JSON)
//! - Span constructors for parse and validation operations
//! - `metrics` facade helpers; values are recorded only when a recorder is installed

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::observability_config::{LogFormat, ObservabilityConfig};
use crate::recovery_parser::RecoveryStrategy;

/// Initialize structured logging with tracing and configuration
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("prescription_validator={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    match config.effective_format() {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .try_init()?;
        }
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Install a Prometheus recorder so counters can be rendered at the end of a run
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::debug!("Metrics recorder installed");
    Ok(handle)
}

/// Create a span for response recovery
pub fn parse_span(source_file: &str) -> tracing::Span {
    tracing::info_span!(
        "parse_response",
        source_file = source_file,
        component = "recovery_parser"
    )
}

/// Create a span for a validation batch
pub fn validation_span(batch_size: usize, inventory_loaded: bool) -> tracing::Span {
    tracing::info_span!(
        "validate_batch",
        batch_size = batch_size,
        inventory_loaded = inventory_loaded,
        component = "validation"
    )
}

/// Record which recovery strategy produced a payload, or a failure
pub fn record_parse_outcome(strategy: Option<RecoveryStrategy>) {
    let outcome = strategy.map(|s| s.as_str()).unwrap_or("failed");
    metrics::counter!("response_parse_total", "outcome" => outcome).increment(1);
}

/// Record a classified match outcome
pub fn record_match_outcome(status: &'static str, score: f64) {
    metrics::counter!("medicine_matches_total", "status" => status).increment(1);
    metrics::histogram!("medicine_match_score").record(score);
}

/// Record a secondary validator call
pub fn record_validator_call(validator: &'static str, success: bool, duration: Duration) {
    metrics::counter!(
        "secondary_validator_calls_total",
        "validator" => validator,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("secondary_validator_duration_seconds").record(duration.as_secs_f64());
}

/// Record the size and duration of a validation batch
pub fn record_validation_batch(duration: Duration, name_count: usize) {
    metrics::histogram!("validation_batch_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("validation_batch_size").record(name_count as f64);
}

/// Record a debug artifact write attempt
pub fn record_debug_artifact(written: bool) {
    metrics::counter!(
        "debug_artifacts_total",
        "result" => if written { "written" } else { "failed" }
    )
    .increment(1);
}
