//! # Debug Artifacts
//!
//! When a raw response cannot be turned into names, the text and the failure
//! reason are persisted under `<log_dir>/<debug_subdir>/` for offline inspection.
//! Writing is best effort: failures are logged and never reach the caller.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{DirectoryConfig, LimitsConfig};
use crate::errors::error_logging;
use crate::observability;
use crate::path_validation::sanitize_source_name;

/// Persisted diagnostic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugRecord {
    pub error: String,
    pub source_file: String,
    /// ISO-8601 local time
    pub timestamp: String,
    /// Raw response, truncated to the configured number of characters
    pub raw_response: String,
}

/// Writes [`DebugRecord`]s with deterministic, collision-free names
#[derive(Debug, Clone)]
pub struct DebugArtifactWriter {
    dir: PathBuf,
    suffix: String,
    max_response_chars: usize,
    max_name_chars: usize,
}

impl DebugArtifactWriter {
    pub fn new(directories: &DirectoryConfig, limits: &LimitsConfig) -> Self {
        Self {
            dir: directories.debug_dir(),
            suffix: directories.debug_suffix.clone(),
            max_response_chars: limits.debug_response_chars,
            max_name_chars: limits.source_name_chars,
        }
    }

    /// Directory receiving artifacts
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the record for a failed response
    pub fn record(&self, raw: &str, source_file: &str, error: &str, now: DateTime<Local>) -> DebugRecord {
        DebugRecord {
            error: error.to_string(),
            source_file: source_file.to_string(),
            timestamp: now.to_rfc3339(),
            raw_response: raw.chars().take(self.max_response_chars).collect(),
        }
    }

    /// Base file name: `<YYYYmmdd_HHMMSS>_<sanitized source><suffix>`
    pub fn file_name(&self, source_file: &str, now: DateTime<Local>) -> String {
        format!(
            "{}_{}{}",
            now.format("%Y%m%d_%H%M%S"),
            sanitize_source_name(source_file, self.max_name_chars),
            self.suffix
        )
    }

    /// Persist a failed response; returns the artifact path when it was written
    pub fn write(&self, raw: &str, source_file: &str, error: &str) -> Option<PathBuf> {
        let now = Local::now();
        let record = self.record(raw, source_file, error, now);
        let file_name = self.file_name(source_file, now);

        match self.persist(&file_name, &record) {
            Ok(path) => {
                info!(
                    path = %path.display(),
                    source_file = %source_file,
                    "Saved debug artifact"
                );
                observability::record_debug_artifact(true);
                Some(path)
            }
            Err(e) => {
                error_logging::log_filesystem_error(&e, "write_debug_artifact", Some(self.dir.as_path()));
                observability::record_debug_artifact(false);
                None
            }
        }
    }

    fn persist(&self, file_name: &str, record: &DebugRecord) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_string_pretty(record).map_err(io::Error::other)?;

        // Same source within the same second: append a counter before the suffix
        let stem = file_name.strip_suffix(self.suffix.as_str()).unwrap_or(file_name);
        for n in 0..1000u32 {
            let candidate = if n == 0 {
                self.dir.join(file_name)
            } else {
                self.dir.join(format!("{}_{}{}", stem, n, self.suffix))
            };

            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free artifact name for {}", file_name),
        ))
    }
}
