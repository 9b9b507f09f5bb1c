//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all validator settings into a single, structured configuration object.
//! The value is built once at startup (usually with [`AppConfig::from_env`]),
//! validated, and then passed by reference to the components that need it.

use crate::errors::{AppError, AppResult};
use crate::fuzzy::MatchingStrategy;
use crate::observability_config::ObservabilityConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default similarity a detected name must reach to count as in stock
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.75;

/// Inventory size above which the weighted-ratio fast path is used
pub const DEFAULT_FAST_PATH_MIN_ENTRIES: usize = 10;

/// Matching and inventory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Inventory database file; `None` means no inventory is configured
    pub database_path: Option<PathBuf>,
    /// Inclusive similarity threshold in `[0, 1]`
    pub match_threshold: f64,
    /// Sequence metric family used by the scorer
    pub strategy: MatchingStrategy,
    /// Whether the phonetic-key signal contributes to scores
    pub enable_phonetic: bool,
    /// Inventories with more entries than this use the fast path first
    pub fast_path_min_entries: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            strategy: MatchingStrategy::FullEnsemble,
            enable_phonetic: true,
            fast_path_min_entries: DEFAULT_FAST_PATH_MIN_ENTRIES,
        }
    }
}

impl ValidationConfig {
    /// Validate matching configuration
    pub fn validate(&self) -> AppResult<()> {
        if !self.match_threshold.is_finite() || !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(AppError::Config(format!(
                "Match threshold must be between 0.0 and 1.0, got {}",
                self.match_threshold
            )));
        }

        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(AppError::Config(
                    "Medicine database path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Size limits for persisted diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Characters of the raw response kept in a debug artifact
    pub debug_response_chars: usize,
    /// Characters of the sanitized source name used in artifact file names
    pub source_name_chars: usize,
    /// Characters of the sanitized name used for per-file output directories
    pub output_name_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            debug_response_chars: 5000,
            source_name_chars: 50,
            output_name_chars: 100,
        }
    }
}

impl LimitsConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.debug_response_chars == 0 {
            return Err(AppError::Config(
                "Debug response size cannot be 0".to_string(),
            ));
        }
        if self.source_name_chars == 0 || self.output_name_chars == 0 {
            return Err(AppError::Config(
                "Name truncation limits cannot be 0".to_string(),
            ));
        }
        if self.output_name_chars > crate::path_validation::MAX_FILENAME_LENGTH {
            return Err(AppError::Config(format!(
                "Output name limit cannot exceed {} characters",
                crate::path_validation::MAX_FILENAME_LENGTH
            )));
        }
        Ok(())
    }
}

/// Output and diagnostic locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Root directory for per-file results
    pub output_dir: PathBuf,
    /// Root directory for logs and debug artifacts
    pub log_dir: PathBuf,
    /// Subdirectory of `log_dir` receiving debug artifacts
    pub debug_subdir: String,
    /// Suffix appended to debug artifact file names
    pub debug_suffix: String,
    /// File name of the per-input result document
    pub results_filename: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./results"),
            log_dir: PathBuf::from("./logs"),
            debug_subdir: "debug".to_string(),
            debug_suffix: "_error.json".to_string(),
            results_filename: "results.json".to_string(),
        }
    }
}

impl DirectoryConfig {
    /// Directory receiving debug artifacts
    pub fn debug_dir(&self) -> PathBuf {
        self.log_dir.join(&self.debug_subdir)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Output directory cannot be empty".to_string()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(AppError::Config("Log directory cannot be empty".to_string()));
        }
        for (name, value) in [
            ("debug_subdir", &self.debug_subdir),
            ("results_filename", &self.results_filename),
        ] {
            crate::path_validation::validate_filename(value).map_err(|e| {
                AppError::Config(format!("Invalid {} '{}': {}", name, value, e))
            })?;
        }
        Ok(())
    }
}

/// Secondary validator (text-generation API) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryValidatorConfig {
    /// API key; without one the pass-through validator is used
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// HTTP client timeout in seconds
    pub http_timeout_secs: u64,
}

impl Default for SecondaryValidatorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            http_timeout_secs: 60,
        }
    }
}

impl SecondaryValidatorConfig {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(AppError::Config("API key cannot be blank".to_string()));
            }
        }
        if self.model.trim().is_empty() {
            return Err(AppError::Config("Model name cannot be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Invalid validator base URL: {}",
                self.base_url
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::Config("HTTP timeout cannot be 0".to_string()));
        }
        if self.http_timeout_secs > 300 {
            return Err(AppError::Config(
                "HTTP timeout cannot be greater than 300 seconds".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry policy for calls to the secondary validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Maximum number of attempts, including the first
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single attempt in seconds
    pub operation_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 1000,  // 1 second
            max_retry_delay_ms: 10000,  // 10 seconds
            operation_timeout_secs: 60, // 1 minute
        }
    }
}

impl RecoveryConfig {
    /// Validate recovery configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.max_retries == 0 {
            return Err(AppError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }
        if self.base_retry_delay_ms == 0 {
            return Err(AppError::Config(
                "base_retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(AppError::Config(format!(
                "max_retry_delay_ms ({}) must be >= base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if self.operation_timeout_secs == 0 {
            return Err(AppError::Config(
                "operation_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Batch processing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of responses processed concurrently
    pub max_workers: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self { max_workers: 5 }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.max_workers == 0 {
            return Err(AppError::Config("Max workers cannot be 0".to_string()));
        }
        if self.max_workers > 64 {
            return Err(AppError::Config(
                "Max workers cannot be greater than 64".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub validation: ValidationConfig,
    pub limits: LimitsConfig,
    pub directories: DirectoryConfig,
    pub secondary: SecondaryValidatorConfig,
    pub recovery: RecoveryConfig,
    pub processing: ProcessingConfig,
    pub observability: ObservabilityConfig,
}

/// Read an optional variable and parse it, falling back to `default`
fn parse_env<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, raw))),
        _ => Ok(default),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        // Matching
        config.validation.database_path = non_empty_env("MEDICINE_DB_PATH").map(PathBuf::from);
        config.validation.match_threshold =
            parse_env("MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD)?;
        config.validation.strategy = match non_empty_env("MATCHING_STRATEGY") {
            Some(raw) => raw.parse().map_err(AppError::Config)?,
            None => MatchingStrategy::FullEnsemble,
        };
        config.validation.enable_phonetic = parse_env("ENABLE_PHONETIC", true)?;

        // Limits
        config.limits.debug_response_chars = parse_env("DEBUG_RESPONSE_SIZE", 5000)?;
        config.limits.source_name_chars = parse_env("SOURCE_NAME_TRUNCATION", 50)?;
        config.limits.output_name_chars = parse_env("SAFE_NAME_TRUNCATION", 100)?;

        // Directories
        if let Some(dir) = non_empty_env("OUTPUT_DIR") {
            config.directories.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("LOG_DIR") {
            config.directories.log_dir = PathBuf::from(dir);
        }

        // Secondary validator
        config.secondary.api_key = non_empty_env("GEMINI_API_KEY");
        if let Some(model) = non_empty_env("GEMINI_MODEL") {
            config.secondary.model = model;
        }
        if let Some(url) = non_empty_env("GEMINI_BASE_URL") {
            config.secondary.base_url = url;
        }
        config.secondary.http_timeout_secs = parse_env("HTTP_CLIENT_TIMEOUT_SECS", 60)?;

        // Retry policy
        config.recovery.max_retries = parse_env("GEMINI_MAX_RETRIES", 2)?;
        config.recovery.base_retry_delay_ms = parse_env("RETRY_BASE_DELAY_MS", 1000)?;
        config.recovery.max_retry_delay_ms = parse_env("RETRY_MAX_DELAY_MS", 10000)?;

        config.processing.max_workers = parse_env("MAX_WORKERS", 5)?;

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.validation.validate()?;
        self.limits.validate()?;
        self.directories.validate()?;
        self.secondary.validate()?;
        self.recovery.validate()?;
        self.processing.validate()?;
        self.observability.validate().map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: database={}, threshold={}, strategy={}, phonetic={}, output_dir={}, log_dir={}, api_key={}, model={}, max_workers={}",
            self.validation
                .database_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.validation.match_threshold,
            self.validation.strategy,
            self.validation.enable_phonetic,
            self.directories.output_dir.display(),
            self.directories.log_dir.display(),
            if self.secondary.api_key.is_some() { "[REDACTED]" } else { "none" },
            self.secondary.model,
            self.processing.max_workers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation.match_threshold, 0.75);
        assert_eq!(config.limits.debug_response_chars, 5000);
        assert_eq!(config.processing.max_workers, 5);
    }

    #[test]
    fn test_validation_config_threshold_bounds() {
        let mut config = ValidationConfig::default();

        config.match_threshold = 0.0;
        assert!(config.validate().is_ok());
        config.match_threshold = 1.0;
        assert!(config.validate().is_ok());

        config.match_threshold = 1.01;
        assert!(config.validate().is_err());
        config.match_threshold = -0.1;
        assert!(config.validate().is_err());
        config.match_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(unused_assignments)]
    fn test_recovery_config_validation() {
        let mut config = RecoveryConfig::default();
        assert!(config.validate().is_ok());

        config.max_retries = 0;
        assert!(config.validate().is_err());
        config.max_retries = 2;

        config.base_retry_delay_ms = 0;
        assert!(config.validate().is_err());
        config.base_retry_delay_ms = 1000;

        config.max_retry_delay_ms = 500;
        assert!(config.validate().is_err());
        config.max_retry_delay_ms = 10000;

        config.operation_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.operation_timeout_secs = 60;
    }

    #[test]
    fn test_secondary_config_validation() {
        let mut config = SecondaryValidatorConfig::default();
        assert!(config.validate().is_ok());

        config.api_key = Some("   ".to_string());
        assert!(config.validate().is_err());
        config.api_key = Some("key".to_string());
        assert!(config.validate().is_ok());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_directory_config() {
        let mut config = DirectoryConfig::default();
        assert_eq!(config.debug_dir(), PathBuf::from("./logs").join("debug"));
        assert!(config.validate().is_ok());

        config.results_filename = "../escape.json".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limits_and_processing_validation() {
        let mut limits = LimitsConfig::default();
        limits.debug_response_chars = 0;
        assert!(limits.validate().is_err());

        let mut processing = ProcessingConfig::default();
        processing.max_workers = 0;
        assert!(processing.validate().is_err());
    }

    #[test]
    fn test_summary_redacts_api_key() {
        let mut config = AppConfig::default();
        config.secondary.api_key = Some("secret-key".to_string());
        let summary = config.summary();
        assert!(summary.contains("[REDACTED]"));
        assert!(!summary.contains("secret-key"));
    }
}
