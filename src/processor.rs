//! # Response Processor
//!
//! One raw model response in, one [`MedicineReport`] out: recover the payload,
//! reduce it to detected names, validate them. A response that cannot be
//! recovered or reduced leaves exactly one debug artifact behind and returns a
//! typed error for that item only.

use std::fmt;

use tracing::{info, Instrument};

use crate::debug_artifact::DebugArtifactWriter;
use crate::errors::error_logging;
use crate::observability;
use crate::payload::PayloadError;
use crate::pipeline::{MedicineReport, ValidationPipeline};
use crate::recovery_parser::{self, ParseFailure};

/// Per-response failure
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessError {
    /// No recovery strategy produced an object
    Parse(ParseFailure),
    /// The object could not be reduced to names
    Normalization(PayloadError),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Parse(e) => write!(f, "Invalid JSON response: {}", e),
            ProcessError::Normalization(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<ParseFailure> for ProcessError {
    fn from(err: ParseFailure) -> Self {
        ProcessError::Parse(err)
    }
}

impl From<PayloadError> for ProcessError {
    fn from(err: PayloadError) -> Self {
        ProcessError::Normalization(err)
    }
}

/// Runs raw responses through recovery and validation
#[derive(Debug, Clone)]
pub struct ResponseProcessor {
    pipeline: ValidationPipeline,
    artifacts: DebugArtifactWriter,
}

impl ResponseProcessor {
    pub fn new(pipeline: ValidationPipeline, artifacts: DebugArtifactWriter) -> Self {
        Self {
            pipeline,
            artifacts,
        }
    }

    pub fn pipeline(&self) -> &ValidationPipeline {
        &self.pipeline
    }

    /// Recover, reduce and validate one raw response
    pub async fn process(&self, raw: &str, source_file: &str) -> Result<MedicineReport, ProcessError> {
        let span = observability::parse_span(source_file);

        let names = {
            let _enter = span.enter();
            match self.detected_names(raw) {
                Ok(names) => names,
                Err(e) => {
                    let artifact = self.artifacts.write(raw, source_file, &e.to_string());
                    error_logging::log_parse_error(&e, source_file, raw.len(), artifact.as_deref());
                    return Err(e);
                }
            }
        };

        info!(
            source_file = %source_file,
            detected = names.len(),
            "Extracted detected names"
        );

        let result = self.pipeline.validate(&names).instrument(span).await;
        Ok(result.into_report())
    }

    fn detected_names(&self, raw: &str) -> Result<Vec<String>, ProcessError> {
        let payload = match recovery_parser::parse(raw) {
            Ok(payload) => {
                observability::record_parse_outcome(Some(payload.strategy()));
                payload
            }
            Err(e) => {
                observability::record_parse_outcome(None);
                return Err(e.into());
            }
        };
        Ok(payload.detected_names()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DirectoryConfig, LimitsConfig, ValidationConfig};
    use crate::inventory::{Inventory, InventoryIndex};
    use crate::secondary::PassthroughValidator;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn processor(log_dir: &TempDir) -> ResponseProcessor {
        let config = ValidationConfig::default();
        let index = InventoryIndex::from_names(["Paracetamol 500mg", "Amoxicillin 250mg"], &config);
        let pipeline =
            ValidationPipeline::new(Inventory::loaded(index), Arc::new(PassthroughValidator), &config);
        let directories = DirectoryConfig {
            log_dir: log_dir.path().to_path_buf(),
            ..DirectoryConfig::default()
        };
        ResponseProcessor::new(
            pipeline,
            DebugArtifactWriter::new(&directories, &LimitsConfig::default()),
        )
    }

    fn artifact_count(log_dir: &TempDir) -> usize {
        std::fs::read_dir(log_dir.path().join("debug"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_process_fenced_response() {
        let dir = TempDir::new().unwrap();
        let raw = "```json\n{\"medicines\": [\"paracetmol\", \"Unrelatedxyzdrug\"]}\n```";

        let report = processor(&dir).process(raw, "scan.jpg").await.unwrap();
        assert_eq!(report.medicines, vec!["Paracetamol 500mg"]);
        assert_eq!(report.not_in_stock.len(), 1);
        assert_eq!(report.not_in_stock[0].detected, "Unrelatedxyzdrug");
        assert_eq!(artifact_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_string_meta_is_normalization_failure() {
        let dir = TempDir::new().unwrap();
        let raw = r#"{"prescription_meta": "unreadable", "medicines": ["Aspirin"]}"#;

        let err = processor(&dir).process(raw, "scan.jpg").await.unwrap_err();
        assert!(matches!(err, ProcessError::Normalization(PayloadError::MalformedMeta(_))));
        assert_eq!(artifact_count(&dir), 1);
    }

    #[tokio::test]
    async fn test_prose_is_parse_failure() {
        let dir = TempDir::new().unwrap();

        let err = processor(&dir)
            .process("Sorry, I cannot read this prescription.", "scan.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Parse(_)));
        assert!(err.to_string().starts_with("Invalid JSON response"));
        assert_eq!(artifact_count(&dir), 1);
    }
}
