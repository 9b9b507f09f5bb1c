//! # Name Normalizer
//!
//! Deterministic canonicalization of medicine names. The canonical form is used
//! only for comparison: lower-cased, dosage-stripped, punctuation-free, with common
//! pharmacy abbreviations expanded.
//!
//! ```rust
//! use prescription_validator::normalizer::normalize;
//!
//! assert_eq!(normalize("Paracetamol 500mg Tab"), "paracetamol tablet");
//! assert_eq!(normalize("  OTC  "), "");
//! ```

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// Numeric strength immediately followed by a unit, e.g. `500mg`, `2.5 ml`, `10%`
    static ref DOSAGE_PATTERN: Regex =
        Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:(?:mcg|mg|ml|iu|units?|g|l)\b|%)")
            .expect("Failed to compile dosage regex");

    /// Whole-word abbreviations and filler tokens
    static ref ABBREVIATION_PATTERN: Regex =
        Regex::new(r"\b(?:tabs?|caps|capsules|inj|syr|cre|otc|rx)\b")
            .expect("Failed to compile abbreviation regex");

    static ref WHITESPACE_PATTERN: Regex =
        Regex::new(r"\s+").expect("Failed to compile whitespace regex");
}

/// Expansion for a matched abbreviation; filler tokens expand to nothing
fn expand_abbreviation(token: &str) -> &'static str {
    match token {
        "tab" | "tabs" => "tablet",
        "caps" | "capsules" => "capsule",
        "inj" => "injection",
        "syr" => "syrup",
        "cre" => "cream",
        _ => "",
    }
}

fn normalize_once(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let without_dosage = DOSAGE_PATTERN.replace_all(&lowered, "");

    let alphanumeric: String = without_dosage
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let expanded = ABBREVIATION_PATTERN.replace_all(&alphanumeric, |caps: &Captures| {
        expand_abbreviation(&caps[0]).to_string()
    });

    WHITESPACE_PATTERN
        .replace_all(&expanded, " ")
        .trim()
        .to_string()
}

/// Canonicalize a medicine name for matching.
///
/// Pure and total. The pipeline is re-applied until the output is stable, so
/// tokens that only become strippable after punctuation or filler removal
/// (`"10-mg"`, `"5 rx mg"`) are handled and `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> String {
    let mut current = normalize_once(raw);
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Whitespace-delimited tokens of an already normalized name
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split_whitespace()
}
