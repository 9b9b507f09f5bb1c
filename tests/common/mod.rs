//! # Shared Test Collaborators
//!
//! Stub secondary validators and lookups used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use prescription_validator::config::ValidationConfig;
use prescription_validator::inventory::{Inventory, InventoryIndex, Lookup, LookupError, MedicineLookup};
use prescription_validator::secondary::{SecondaryValidator, ValidatorError};
use std::sync::{Arc, Mutex};

/// Inventory used across the pipeline tests
pub const SAMPLE_INVENTORY: [&str; 2] = ["Paracetamol 500mg", "Amoxicillin 250mg"];

pub fn sample_index() -> InventoryIndex {
    InventoryIndex::from_names(SAMPLE_INVENTORY, &ValidationConfig::default())
}

pub fn sample_inventory() -> Inventory {
    Inventory::loaded(sample_index())
}

pub fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Accepts every name and remembers each call
#[derive(Default)]
pub struct RecordingValidator {
    calls: Mutex<Vec<Vec<String>>>,
}

impl RecordingValidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecondaryValidator for RecordingValidator {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn validate_names(&self, names: &[String]) -> Result<Vec<String>, ValidatorError> {
        self.calls.lock().unwrap().push(names.to_vec());
        Ok(names.to_vec())
    }
}

/// Always fails, counting calls
#[derive(Default)]
pub struct FailingValidator {
    calls: Mutex<usize>,
}

impl FailingValidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SecondaryValidator for FailingValidator {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn validate_names(&self, _names: &[String]) -> Result<Vec<String>, ValidatorError> {
        *self.calls.lock().unwrap() += 1;
        Err(ValidatorError::RetriesExhausted {
            attempts: 2,
            last_error: "service unavailable".to_string(),
        })
    }
}

/// Returns a fixed correction for every name
pub struct CorrectingValidator(pub &'static str);

#[async_trait]
impl SecondaryValidator for CorrectingValidator {
    fn name(&self) -> &'static str {
        "correcting"
    }

    async fn validate_names(&self, names: &[String]) -> Result<Vec<String>, ValidatorError> {
        Ok(names.iter().map(|_| self.0.to_string()).collect())
    }
}

/// Lookup that fails for names in `broken` and defers to a real index otherwise
pub struct PartiallyBrokenLookup {
    pub index: InventoryIndex,
    pub broken: Vec<String>,
}

impl MedicineLookup for PartiallyBrokenLookup {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn best_match(&self, detected: &str) -> Result<Lookup, LookupError> {
        if self.broken.iter().any(|b| b == detected) {
            return Err(LookupError(format!("lookup failed for {}", detected)));
        }
        self.index.best_match(detected)
    }
}
