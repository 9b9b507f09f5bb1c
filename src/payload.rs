//! # Response Payload
//!
//! The recovered JSON object of a model response and its reduction to a list of
//! detected medicine names. Plain string entries are the current format; legacy
//! structured records (`identity` / `instructions` / `dispensing`) are reduced to
//! `identity.generic_name`; the other blocks are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::error_logging;
use crate::recovery_parser::RecoveryStrategy;

/// Payload-level failure: the response parsed but its shape is unusable
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// `prescription_meta` was returned as a string instead of an object
    MalformedMeta(String),
    /// `medicines` is present but is not a list
    MedicinesNotList(String),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::MalformedMeta(value) => write!(
                f,
                "Invalid response format: prescription_meta is a string '{}' instead of an object",
                value
            ),
            PayloadError::MedicinesNotList(kind) => write!(
                f,
                "Invalid response format: medicines must be a list, found {}",
                kind
            ),
        }
    }
}

impl std::error::Error for PayloadError {}

/// A single medicine entry that could not be reduced to a name
#[derive(Debug, Clone, PartialEq)]
pub enum EntryError {
    /// Legacy record did not match the expected structure
    MalformedRecord(String),
    /// Entry is neither a string nor a record
    UnsupportedType(&'static str),
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::MalformedRecord(msg) => write!(f, "Malformed medicine record: {}", msg),
            EntryError::UnsupportedType(kind) => {
                write!(f, "Unsupported medicine entry type: {}", kind)
            }
        }
    }
}

impl std::error::Error for EntryError {}

/// Prescription header fields, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionMeta {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_weight: Option<String>,
}

/// `identity` block of a legacy structured record; only the generic name is used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicineIdentity {
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
}

/// Reduce one `medicines` entry to a trimmed name; empty names yield `None`
pub fn entry_name(entry: &Value) -> Result<Option<String>, EntryError> {
    let name = match entry {
        Value::String(name) => name.trim().to_string(),
        Value::Object(record) => match record.get("identity") {
            None | Some(Value::Null) => String::new(),
            Some(identity) => {
                let identity: MedicineIdentity = serde_json::from_value(identity.clone())
                    .map_err(|e| EntryError::MalformedRecord(e.to_string()))?;
                identity.generic_name.unwrap_or_default().trim().to_string()
            }
        },
        Value::Null => return Err(EntryError::UnsupportedType("null")),
        Value::Bool(_) => return Err(EntryError::UnsupportedType("boolean")),
        Value::Number(_) => return Err(EntryError::UnsupportedType("number")),
        Value::Array(_) => return Err(EntryError::UnsupportedType("array")),
    };

    Ok((!name.is_empty()).then_some(name))
}

/// Recovered response object
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    object: Map<String, Value>,
    strategy: RecoveryStrategy,
}

impl ParsedPayload {
    pub fn new(object: Map<String, Value>, strategy: RecoveryStrategy) -> Self {
        Self { object, strategy }
    }

    /// Recovery step that produced this payload
    pub fn strategy(&self) -> RecoveryStrategy {
        self.strategy
    }

    /// Underlying JSON object
    pub fn as_object(&self) -> &Map<String, Value> {
        &self.object
    }

    /// Raw `medicines` entries; a missing key is an empty list
    pub fn medicine_entries(&self) -> Result<&[Value], PayloadError> {
        match self.object.get("medicines") {
            None | Some(Value::Null) => Ok(&[]),
            Some(Value::Array(entries)) => Ok(entries),
            Some(other) => Err(PayloadError::MedicinesNotList(kind_of(other).to_string())),
        }
    }

    /// Prescription header; non-object values other than strings are treated as absent
    pub fn prescription_meta(&self) -> Result<PrescriptionMeta, PayloadError> {
        match self.object.get("prescription_meta") {
            Some(Value::String(value)) => Err(PayloadError::MalformedMeta(value.clone())),
            Some(value @ Value::Object(_)) => {
                Ok(serde_json::from_value(value.clone()).unwrap_or_default())
            }
            _ => Ok(PrescriptionMeta::default()),
        }
    }

    /// Transcribed free text, when the model returned it
    pub fn ocr_text(&self) -> Option<&str> {
        self.object.get("ocr_text").and_then(Value::as_str)
    }

    /// Language codes the model reported
    pub fn languages_detected(&self) -> Vec<String> {
        self.object
            .get("languages_detected")
            .and_then(Value::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Detected medicine names in response order.
    ///
    /// Entries that cannot be reduced to a name are skipped with a warning;
    /// entries whose name is empty are dropped.
    pub fn detected_names(&self) -> Result<Vec<String>, PayloadError> {
        self.prescription_meta()?;
        let entries = self.medicine_entries()?;

        let mut names = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match entry_name(entry) {
                Ok(Some(name)) => names.push(name),
                Ok(None) => {}
                Err(e) => error_logging::log_entry_skipped(&e, index),
            }
        }
        Ok(names)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> ParsedPayload {
        match value {
            Value::Object(map) => ParsedPayload::new(map, RecoveryStrategy::Direct),
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn test_plain_string_names() {
        let p = payload(json!({"medicines": [" Aspirin ", "Ibuprofen", ""]}));
        assert_eq!(p.detected_names().unwrap(), vec!["Aspirin", "Ibuprofen"]);
    }

    #[test]
    fn test_missing_medicines_is_empty() {
        let p = payload(json!({"ocr_text": "illegible"}));
        assert!(p.detected_names().unwrap().is_empty());
        assert_eq!(p.ocr_text(), Some("illegible"));
    }

    #[test]
    fn test_legacy_records_reduce_to_generic_name() {
        let p = payload(json!({
            "medicines": [
                {
                    "identity": {"brand_name": "Panadol", "generic_name": "Paracetamol", "form": "tablet", "strength": "500mg"},
                    "instructions": {"route": "Oral", "frequency": "TID"},
                    "dispensing": {"refills": 1, "substitution_allowed": true}
                },
                {"identity": {"brand_name": "NoGeneric"}},
                "Amoxicillin"
            ]
        }));
        assert_eq!(p.detected_names().unwrap(), vec!["Paracetamol", "Amoxicillin"]);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let p = payload(json!({
            "medicines": [
                "Aspirin",
                42,
                null,
                {"identity": "not an object"},
                "Metformin"
            ]
        }));
        assert_eq!(p.detected_names().unwrap(), vec!["Aspirin", "Metformin"]);
    }

    #[test]
    fn test_string_meta_is_payload_error() {
        let p = payload(json!({"prescription_meta": "Dr. Smith", "medicines": ["A"]}));
        assert!(matches!(
            p.detected_names(),
            Err(PayloadError::MalformedMeta(ref v)) if v == "Dr. Smith"
        ));
    }

    #[test]
    fn test_meta_object_and_extras() {
        let p = payload(json!({
            "prescription_meta": {"date": "2024-01-05", "doctor_name": "Dr. Lee"},
            "languages_detected": ["en", "fr", 3],
            "medicines": []
        }));
        let meta = p.prescription_meta().unwrap();
        assert_eq!(meta.date.as_deref(), Some("2024-01-05"));
        assert_eq!(meta.doctor_name.as_deref(), Some("Dr. Lee"));
        assert_eq!(p.languages_detected(), vec!["en", "fr"]);
    }

    #[test]
    fn test_medicines_not_a_list() {
        let p = payload(json!({"medicines": "Aspirin"}));
        assert!(matches!(
            p.detected_names(),
            Err(PayloadError::MedicinesNotList(_))
        ));
    }
}
