//! # Recovery Parser
//!
//! Turns a raw model response into a [`ParsedPayload`], tolerating code fences,
//! surrounding prose and truncated output. Three strategies are attempted in
//! order and the first one yielding a JSON object wins:
//!
//! 1. Direct parse of the whole (fence-stripped) text.
//! 2. The span from the first `{` to the last `}`.
//! 3. Bracket repair: a depth-counting scan that records every point where the
//!    structure is balanced outside a string, then parses the longest such prefix
//!    that is valid.
//!
//! When every strategy fails the error from the direct parse is reported, since
//! it describes the response as it was actually received.

use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, trace};

use crate::payload::ParsedPayload;

/// Which recovery step produced the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStrategy {
    /// The whole text parsed as-is
    Direct,
    /// First `{` through last `}`
    BraceSpan,
    /// Truncated at a balanced position found by the bracket scan
    BracketRepair,
}

impl RecoveryStrategy {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Direct => "direct",
            RecoveryStrategy::BraceSpan => "brace_span",
            RecoveryStrategy::BracketRepair => "bracket_repair",
        }
    }
}

/// No strategy recovered a JSON object from the response
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    /// Message of the parser error on the unmodified text
    pub message: String,
    /// 1-based line of the original error (0 when the text parsed but was not an object)
    pub line: usize,
    /// 1-based column of the original error
    pub column: usize,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not parse JSON even after repair attempts. Original error: {} at line {} column {}",
            self.message, self.line, self.column
        )
    }
}

impl std::error::Error for ParseFailure {}

/// Remove surrounding whitespace and a Markdown code fence, if present
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a candidate and accept it only when the top level is an object
fn parse_object(candidate: &str) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::from_str::<Value>(candidate)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::de::Error>::custom(format!(
            "expected a JSON object at the top level, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First `{` through last `}` (greedy, across newlines)
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Byte offsets (exclusive end) at which both `{}` and `[]` depth return to zero
/// on a closing character outside a string.
///
/// A backslash escapes exactly the next character, so an escaped quote never
/// toggles the in-string flag.
pub fn balanced_positions(text: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut in_string = false;
    let mut escape_pending = false;
    let mut brace_depth: i64 = 0;
    let mut bracket_depth: i64 = 0;

    for (index, ch) in text.char_indices() {
        if escape_pending {
            escape_pending = false;
            continue;
        }

        match ch {
            '\\' => escape_pending = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => brace_depth += 1,
            '[' => bracket_depth += 1,
            '}' | ']' => {
                if ch == '}' {
                    brace_depth -= 1;
                } else {
                    bracket_depth -= 1;
                }
                if brace_depth == 0 && bracket_depth == 0 {
                    positions.push(index + ch.len_utf8());
                }
            }
            _ => {}
        }
    }

    positions
}

/// Bracket-repair recovery over the text starting at its first `{`
fn bracket_repair(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let body = &text[start..];
    let positions = balanced_positions(body);

    positions.iter().rev().find_map(|&end| {
        trace!(end = end, "Trying balanced prefix");
        parse_object(&body[..end]).ok()
    })
}

/// Recover the top-level JSON object of a raw response
pub fn recover_object(raw: &str) -> Result<(Map<String, Value>, RecoveryStrategy), ParseFailure> {
    let text = strip_code_fences(raw);

    let direct_error = match parse_object(text) {
        Ok(map) => return Ok((map, RecoveryStrategy::Direct)),
        Err(e) => e,
    };
    debug!(error = %direct_error, "Direct parse failed, trying brace span");

    if let Some(span) = brace_span(text) {
        if let Ok(map) = parse_object(span) {
            return Ok((map, RecoveryStrategy::BraceSpan));
        }
    }
    debug!("Brace span failed, trying bracket repair");

    if let Some(map) = bracket_repair(text) {
        return Ok((map, RecoveryStrategy::BracketRepair));
    }

    Err(ParseFailure {
        message: direct_error.to_string(),
        line: direct_error.line(),
        column: direct_error.column(),
    })
}

/// Parse a raw model response into a payload
///
/// # Examples
///
/// ```rust
/// use prescription_validator::recovery_parser::{parse, RecoveryStrategy};
///
/// let payload = parse("{\"medicines\": [\"Aspirin\"]} Hope this helps!").unwrap();
/// assert_eq!(payload.strategy(), RecoveryStrategy::BraceSpan);
/// ```
pub fn parse(raw: &str) -> Result<ParsedPayload, ParseFailure> {
    let (object, strategy) = recover_object(raw)?;
    debug!(strategy = strategy.as_str(), "Recovered response payload");
    Ok(ParsedPayload::new(object, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_parse() {
        let (map, strategy) = recover_object(r#"{"medicines": ["A", "B"]}"#).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Direct);
        assert_eq!(map["medicines"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let raw = "```json\n{\"medicines\": [\"A\"]}\n```";
        let (_, strategy) = recover_object(raw).unwrap();
        assert_eq!(strategy, RecoveryStrategy::Direct);

        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }

    #[test]
    fn test_brace_span_with_prose() {
        let raw = "Sure! Here is the data:\n{\"medicines\": [\"A\"]}\nLet me know.";
        let (map, strategy) = recover_object(raw).unwrap();
        assert_eq!(strategy, RecoveryStrategy::BraceSpan);
        assert_eq!(map["medicines"], serde_json::json!(["A"]));
    }

    #[test]
    fn test_bracket_repair_with_braces_in_trailing_prose() {
        let raw = r#"{"medicines": ["A", "B"]} note: {unclear}"#;
        let (map, strategy) = recover_object(raw).unwrap();
        assert_eq!(strategy, RecoveryStrategy::BracketRepair);
        assert_eq!(map["medicines"], serde_json::json!(["A", "B"]));
    }

    #[test]
    fn test_bracket_repair_with_truncated_tail() {
        let raw = r#"{"medicines": ["A"]} and then {"note": "cut off}"#;
        let (map, strategy) = recover_object(raw).unwrap();
        assert_eq!(strategy, RecoveryStrategy::BracketRepair);
        assert_eq!(map["medicines"], serde_json::json!(["A"]));
    }

    #[test]
    fn test_balanced_positions_ignore_strings_and_escapes() {
        let text = r#"{"a": "}{ \" ]"}"#;
        assert_eq!(balanced_positions(text), vec![text.len()]);

        let nested = r#"{"a": [1, {"b": 2}]} [3]"#;
        let positions = balanced_positions(nested);
        assert_eq!(positions, vec![20, nested.len()]);
    }

    #[test]
    fn test_balanced_positions_unterminated_string() {
        assert!(balanced_positions(r#"{"a": "never closed}"#).is_empty());
    }

    #[test]
    fn test_top_level_array_is_rejected() {
        let failure = recover_object(r#"["A", "B"]"#).unwrap_err();
        assert!(failure.message.contains("array"));
    }

    #[test]
    fn test_prose_only_fails_with_original_position() {
        let failure = recover_object("I could not read the prescription.").unwrap_err();
        assert_eq!(failure.line, 1);
        assert_eq!(failure.column, 1);
        assert!(failure.to_string().contains("Original error"));
    }

    #[test]
    fn test_multibyte_text_before_json() {
        let raw = "Résumé → {\"medicines\": [\"Doliprane\"]} ✓ {x}";
        let (map, _) = recover_object(raw).unwrap();
        assert_eq!(map["medicines"], serde_json::json!(["Doliprane"]));
    }
}
