//! # Prescription Validator
//!
//! Turns raw, possibly malformed model transcriptions of prescriptions into a
//! trustworthy list of medicine names: the response is recovered into a JSON
//! payload, detected names are normalized and fuzzy-matched against a known
//! inventory, and anything the inventory cannot decide is handed to a secondary
//! validator.

pub mod batch;
pub mod config;
pub mod debug_artifact;
pub mod errors;
pub mod fuzzy;
pub mod inventory;
pub mod normalizer;
pub mod observability;
pub mod observability_config;
pub mod path_validation;
pub mod payload;
pub mod phonetic;
pub mod pipeline;
pub mod processor;
pub mod recovery_parser;
pub mod retry;
pub mod secondary;

// Re-export types for easier access
pub use config::AppConfig;
pub use fuzzy::{FuzzyScorer, MatchingStrategy};
pub use inventory::{Inventory, InventoryIndex};
pub use normalizer::normalize;
pub use pipeline::{MatchOutcome, MatchStatus, MedicineReport, ValidationPipeline, ValidationResult};
pub use processor::{ProcessError, ResponseProcessor};
pub use recovery_parser::{parse, ParseFailure};
