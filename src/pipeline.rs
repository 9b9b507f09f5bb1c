//! # Validation Pipeline
//!
//! Classifies detected names against the inventory and aggregates the result.
//!
//! - Inventory loaded: every name is looked up. Matches at or above the threshold
//!   contribute the inventory's spelling; the rest go to the not-in-stock audit
//!   list with their best score. A lookup that fails outright is delegated, for
//!   that name only, to the secondary validator.
//! - Inventory absent: the whole batch is delegated to the secondary validator
//!   and no audit entries are produced.
//!
//! A secondary validator failure never fails the batch: the affected names are
//! kept as detected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};

use crate::config::ValidationConfig;
use crate::errors::error_logging;
use crate::inventory::{Inventory, Lookup, MedicineLookup};
use crate::observability;
use crate::secondary::SecondaryValidator;

/// Classification of one detected name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    InStock,
    NotInStock,
    /// Lookup failed; resolved by the secondary validator
    Unknown,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::InStock => "in_stock",
            MatchStatus::NotInStock => "not_in_stock",
            MatchStatus::Unknown => "unknown",
        }
    }
}

/// Lookup result for a single detected name
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub detected: String,
    pub status: MatchStatus,
    /// Inventory spelling; present only for [`MatchStatus::InStock`]
    pub matched: Option<String>,
    pub score: f64,
}

/// Audit record for a name that did not reach the threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotInStockEntry {
    pub detected: String,
    pub best_match_score: f64,
}

/// Aggregate of a validated batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    /// Validated names, deduplicated in order of first occurrence
    pub medicines: Vec<String>,
    pub not_in_stock: Vec<NotInStockEntry>,
    /// Per-name lookups, in input order; empty when no inventory is loaded
    pub outcomes: Vec<MatchOutcome>,
}

impl ValidationResult {
    pub fn into_report(self) -> MedicineReport {
        MedicineReport {
            medicines: self.medicines,
            not_in_stock: self.not_in_stock,
        }
    }
}

/// Document written for a successfully processed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineReport {
    pub medicines: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_in_stock: Vec<NotInStockEntry>,
}

/// Insertion-ordered set of validated names
#[derive(Default)]
struct ValidatedNames {
    seen: HashSet<String>,
    names: Vec<String>,
}

impl ValidatedNames {
    fn push(&mut self, name: String) {
        if self.seen.insert(name.clone()) {
            self.names.push(name);
        }
    }

    fn extend(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.push(name);
        }
    }
}

/// Orchestrates lookups and delegation for batches of detected names
#[derive(Clone)]
pub struct ValidationPipeline {
    inventory: Inventory,
    secondary: Arc<dyn SecondaryValidator>,
    threshold: f64,
}

impl std::fmt::Debug for ValidationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPipeline")
            .field("inventory", &self.inventory)
            .field("secondary", &self.secondary.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl ValidationPipeline {
    pub fn new(
        inventory: Inventory,
        secondary: Arc<dyn SecondaryValidator>,
        config: &ValidationConfig,
    ) -> Self {
        Self {
            inventory,
            secondary,
            threshold: config.match_threshold,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify one name against a loaded inventory
    pub fn classify(&self, lookup: &dyn MedicineLookup, detected: &str) -> MatchOutcome {
        let outcome = match lookup.best_match(detected) {
            Ok(Lookup::Found { original, score }) if score >= self.threshold => MatchOutcome {
                detected: detected.to_string(),
                status: MatchStatus::InStock,
                matched: Some(original),
                score,
            },
            Ok(Lookup::Found { score, .. }) | Ok(Lookup::NotFound { best_score: score }) => {
                MatchOutcome {
                    detected: detected.to_string(),
                    status: MatchStatus::NotInStock,
                    matched: None,
                    score,
                }
            }
            Err(e) => {
                error_logging::log_database_error(&e, "best_match", None);
                MatchOutcome {
                    detected: detected.to_string(),
                    status: MatchStatus::Unknown,
                    matched: None,
                    score: 0.0,
                }
            }
        };

        debug!(
            detected = %outcome.detected,
            status = outcome.status.as_str(),
            matched = ?outcome.matched,
            score = outcome.score,
            "Classified detected name"
        );
        observability::record_match_outcome(outcome.status.as_str(), outcome.score);
        outcome
    }

    /// Validate a batch of detected names
    pub async fn validate(&self, detected: &[String]) -> ValidationResult {
        let span = observability::validation_span(detected.len(), self.inventory.is_loaded());
        let start = Instant::now();

        let result = async {
            match &self.inventory {
                Inventory::Absent { reason } => {
                    debug!(reason = %reason, "Inventory absent, delegating whole batch");
                    self.validate_without_inventory(detected).await
                }
                Inventory::Loaded(lookup) => self.validate_with_inventory(lookup.as_ref(), detected).await,
            }
        }
        .instrument(span)
        .await;

        observability::record_validation_batch(start.elapsed(), detected.len());
        info!(
            detected = detected.len(),
            validated = result.medicines.len(),
            not_in_stock = result.not_in_stock.len(),
            "Validation finished"
        );
        result
    }

    async fn validate_without_inventory(&self, detected: &[String]) -> ValidationResult {
        let mut validated = ValidatedNames::default();
        validated.extend(self.delegate(detected).await);
        ValidationResult {
            medicines: validated.names,
            not_in_stock: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    async fn validate_with_inventory(
        &self,
        lookup: &dyn MedicineLookup,
        detected: &[String],
    ) -> ValidationResult {
        let mut validated = ValidatedNames::default();
        let mut not_in_stock = Vec::new();
        let mut outcomes = Vec::with_capacity(detected.len());

        for name in detected {
            let outcome = self.classify(lookup, name);
            match outcome.status {
                MatchStatus::InStock => {
                    if let Some(original) = &outcome.matched {
                        validated.push(original.clone());
                    }
                }
                MatchStatus::NotInStock => not_in_stock.push(NotInStockEntry {
                    detected: outcome.detected.clone(),
                    best_match_score: outcome.score,
                }),
                MatchStatus::Unknown => {
                    validated.extend(self.delegate(std::slice::from_ref(name)).await);
                }
            }
            outcomes.push(outcome);
        }

        ValidationResult {
            medicines: validated.names,
            not_in_stock,
            outcomes,
        }
    }

    /// Ask the secondary validator; on failure keep the names as given
    async fn delegate(&self, names: &[String]) -> Vec<String> {
        if names.is_empty() {
            return Vec::new();
        }

        match self.secondary.validate_names(names).await {
            Ok(validated) => validated,
            Err(e) => {
                error_logging::log_validator_error(&e, "delegate", names.len(), None);
                names.to_vec()
            }
        }
    }
}
