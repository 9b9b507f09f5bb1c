//! # Batch Processing
//!
//! Discovers raw response files, runs them through a [`ResponseProcessor`] with
//! bounded concurrency and writes one result document per input under
//! `<output_dir>/<sanitized stem>/<results_filename>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{DirectoryConfig, LimitsConfig};
use crate::errors::{error_logging, AppError, AppResult};
use crate::path_validation::sanitize_source_name;
use crate::processor::ResponseProcessor;

/// File extensions treated as raw model responses
pub const RESPONSE_EXTENSIONS: &[&str] = &["txt", "json"];

/// Document written when a response could not be processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub success: bool,
    pub error: String,
    /// Seconds spent on the file
    pub processing_time: f64,
    pub timestamp: String,
}

impl FailureRecord {
    pub fn new(error: impl Into<String>, processing_time: f64) -> Self {
        Self {
            success: false,
            error: error.into(),
            processing_time,
            timestamp: Local::now().to_rfc3339(),
        }
    }
}

/// Result for one input file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Validated { medicines: usize },
    Failed { error: String },
}

/// Totals for a batch run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub medicines: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &FileOutcome) {
        self.total += 1;
        match outcome {
            FileOutcome::Validated { medicines } => {
                self.succeeded += 1;
                self.medicines += medicines;
            }
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

fn is_response_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| RESPONSE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Response files under `input`, sorted by path
///
/// A file given directly is accepted whatever its extension.
pub fn collect_response_files(input: &Path, recursive: bool) -> AppResult<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(AppError::FileSystem(format!(
            "Input path does not exist: {}",
            input.display()
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![input.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_response_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Where the result document for `source` is written
pub fn result_path(directories: &DirectoryConfig, limits: &LimitsConfig, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    directories
        .output_dir
        .join(sanitize_source_name(&stem, limits.output_name_chars))
        .join(&directories.results_filename)
}

/// Runs files through a shared processor
#[derive(Debug, Clone)]
pub struct BatchRunner {
    processor: Arc<ResponseProcessor>,
    directories: DirectoryConfig,
    limits: LimitsConfig,
    max_workers: usize,
}

impl BatchRunner {
    pub fn new(
        processor: Arc<ResponseProcessor>,
        directories: DirectoryConfig,
        limits: LimitsConfig,
        max_workers: usize,
    ) -> Self {
        Self {
            processor,
            directories,
            limits,
            max_workers: max_workers.max(1),
        }
    }

    /// Process one file and write its result document
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        let start = Instant::now();
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let processed = match tokio::fs::read_to_string(path).await {
            Ok(raw) => self
                .processor
                .process(&raw, &source_file)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => {
                error_logging::log_filesystem_error(&e, "read_response", Some(path));
                Err(format!("Could not read {}: {}", path.display(), e))
            }
        };

        let (outcome, body) = match processed {
            Ok(report) => (
                FileOutcome::Validated {
                    medicines: report.medicines.len(),
                },
                serde_json::to_string_pretty(&report),
            ),
            Err(error) => {
                let record = FailureRecord::new(error.clone(), start.elapsed().as_secs_f64());
                (FileOutcome::Failed { error }, serde_json::to_string_pretty(&record))
            }
        };

        let target = result_path(&self.directories, &self.limits, path);
        let written = match body {
            Ok(body) => write_document(&target, body).await,
            Err(e) => Err(AppError::Internal(e.to_string())),
        };
        if let Err(e) = written {
            error_logging::log_filesystem_error(&e, "write_result", Some(target.as_path()));
            return FileOutcome::Failed {
                error: e.to_string(),
            };
        }

        info!(
            source_file = %source_file,
            result = %target.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Processed response file"
        );
        outcome
    }

    /// Process all files, at most `max_workers` at a time
    pub async fn run(&self, files: Vec<PathBuf>) -> BatchSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(files.len());

        for path in files {
            let runner = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                runner.process_file(&path).await
            }));
        }

        let mut summary = BatchSummary::default();
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Processing task did not complete");
                    FileOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            summary.record(&outcome);
        }
        summary
    }
}

async fn write_document(target: &Path, body: String) -> AppResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, body).await?;
    Ok(())
}
