//! # Inventory Index
//!
//! Immutable, once-loaded collection of known medicine names with a best-match
//! lookup. Every name is normalized once at load time and kept next to its
//! original spelling; lookups only normalize the query.
//!
//! ## Supported files
//!
//! - `.json`: a list of names, an object with a `medicines` list, or an object
//!   whose string values are the names
//! - `.csv` / `.tsv`: first field of every row
//! - anything else: one name per line
//!
//! A file that cannot be read or parsed does not abort the program: use
//! [`Inventory::load_or_absent`] to get an explicit [`Inventory::Absent`] state
//! that the validation pipeline handles by delegating to the secondary validator.

use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ValidationConfig;
use crate::errors::error_logging;
use crate::fuzzy::{weighted_ratio, FuzzyScorer, MatchingStrategy};
use crate::normalizer::normalize;

/// A known medicine: display spelling and canonical form
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    pub original: String,
    pub canonical: String,
}

impl InventoryEntry {
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        let canonical = normalize(&original);
        Self {
            original,
            canonical,
        }
    }
}

/// Errors raised while loading an inventory file
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryError {
    /// The file does not exist
    NotFound(PathBuf),
    /// The file exists but could not be read
    Io { path: PathBuf, message: String },
    /// The file was read but its content is not a supported layout
    Format { path: PathBuf, message: String },
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::NotFound(path) => {
                write!(f, "Medicine database not found: {}", path.display())
            }
            InventoryError::Io { path, message } => {
                write!(f, "Failed to read {}: {}", path.display(), message)
            }
            InventoryError::Format { path, message } => {
                write!(f, "Unsupported database layout in {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for InventoryError {}

/// Lookup failed for a reason other than "no good match"
#[derive(Debug, Clone, PartialEq)]
pub struct LookupError(pub String);

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inventory lookup failed: {}", self.0)
    }
}

impl std::error::Error for LookupError {}

/// Result of matching one detected name
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Best candidate reached the threshold
    Found { original: String, score: f64 },
    /// Nothing reached the threshold; `best_score` is the highest score observed
    NotFound { best_score: f64 },
}

/// Best-match lookup over a loaded inventory
pub trait MedicineLookup: Send + Sync {
    /// Number of known medicines
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Match a raw detected name against the inventory
    fn best_match(&self, detected: &str) -> Result<Lookup, LookupError>;
}

/// File layouts the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Delimited(char),
    Lines,
}

impl SourceFormat {
    /// Format implied by the file extension
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => SourceFormat::Json,
            Some("csv") => SourceFormat::Delimited(','),
            Some("tsv") => SourceFormat::Delimited('\t'),
            _ => SourceFormat::Lines,
        }
    }
}

fn scalar_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!name.is_empty()).then_some(name)
}

/// Names from a JSON document
pub fn names_from_json(content: &str) -> Result<Vec<String>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    match value {
        Value::Array(items) => Ok(items.iter().filter_map(scalar_name).collect()),
        Value::Object(map) => match map.get("medicines") {
            Some(Value::Array(items)) => Ok(items.iter().filter_map(scalar_name).collect()),
            Some(other) => Err(format!("'medicines' must be a list, found {}", other)),
            None => Ok(map
                .values()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()),
        },
        _ => Err("expected a list or an object at the top level".to_string()),
    }
}

/// First field of a delimited row; double-quoted fields may contain the delimiter
/// and `""` escapes
fn first_field(row: &str, delimiter: char) -> String {
    let row = row.trim_start();
    match row.strip_prefix('"') {
        Some(rest) => {
            let mut field = String::new();
            let mut chars = rest.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        field.push('"');
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    field.push(c);
                }
            }
            field
        }
        None => row.split(delimiter).next().unwrap_or_default().to_string(),
    }
}

/// Names from the first column of a delimited file
pub fn names_from_delimited(content: &str, delimiter: char) -> Vec<String> {
    content
        .lines()
        .map(|row| first_field(row, delimiter).trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Names from a plain text file, one per line
pub fn names_from_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Loaded inventory with its matching settings
#[derive(Debug, Clone)]
pub struct InventoryIndex {
    entries: Vec<InventoryEntry>,
    scorer: FuzzyScorer,
    threshold: f64,
    fast_path_min_entries: usize,
}

impl InventoryIndex {
    /// Build an index from names already in memory
    pub fn from_names<I, S>(names: I, config: &ValidationConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names.into_iter().map(InventoryEntry::new).collect();
        Self {
            entries,
            scorer: FuzzyScorer::new(config.strategy, config.enable_phonetic),
            threshold: config.match_threshold,
            fast_path_min_entries: config.fast_path_min_entries,
        }
    }

    /// Load an inventory file, choosing the layout from its extension
    pub fn load(path: &Path, config: &ValidationConfig) -> Result<Self, InventoryError> {
        if !path.exists() {
            return Err(InventoryError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| InventoryError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let content = content.trim_start_matches('\u{feff}');

        let format = SourceFormat::from_path(path);
        let names = match format {
            SourceFormat::Json => {
                names_from_json(content).map_err(|message| InventoryError::Format {
                    path: path.to_path_buf(),
                    message,
                })?
            }
            SourceFormat::Delimited(delimiter) => names_from_delimited(content, delimiter),
            SourceFormat::Lines => names_from_lines(content),
        };

        let index = Self::from_names(names, config);
        if index.entries.is_empty() {
            warn!(path = %path.display(), "Medicine database is empty, every lookup will be not in stock");
        }
        info!(
            path = %path.display(),
            format = ?format,
            entries = index.entries.len(),
            threshold = index.threshold,
            "Medicine database loaded"
        );
        Ok(index)
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &FuzzyScorer {
        &self.scorer
    }

    fn uses_fast_path(&self) -> bool {
        self.scorer.strategy() == MatchingStrategy::FullEnsemble
            && self.entries.len() > self.fast_path_min_entries
    }

    /// Highest weighted-ratio candidate at or above the threshold
    fn fast_path(&self, query: &str) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let score = weighted_ratio(query, &entry.canonical);
            if score < self.threshold {
                continue;
            }
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
                if score >= 1.0 {
                    break;
                }
            }
        }
        best
    }

    /// Full ensemble score against every entry; first entry wins ties
    fn full_scan(&self, query: &str) -> (Option<usize>, f64) {
        let mut best_index = None;
        let mut best_score = 0.0;
        for (index, entry) in self.entries.iter().enumerate() {
            let score = self.scorer.score(query, &entry.canonical);
            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }
        (best_index, best_score)
    }
}

impl MedicineLookup for InventoryIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn best_match(&self, detected: &str) -> Result<Lookup, LookupError> {
        let query = normalize(detected);
        if query.is_empty() || self.entries.is_empty() {
            return Ok(Lookup::NotFound { best_score: 0.0 });
        }

        let fast = if self.uses_fast_path() {
            self.fast_path(&query)
        } else {
            None
        };
        let (best_index, best_score) = match fast {
            Some((index, score)) => (Some(index), score),
            None => self.full_scan(&query),
        };

        if !best_score.is_finite() {
            return Err(LookupError(format!(
                "non-finite similarity score for '{}'",
                detected
            )));
        }

        debug!(
            detected = %detected,
            canonical = %query,
            best_score = best_score,
            "Inventory lookup finished"
        );

        match best_index {
            Some(index) if best_score >= self.threshold => Ok(Lookup::Found {
                original: self.entries[index].original.clone(),
                score: best_score,
            }),
            _ => Ok(Lookup::NotFound { best_score }),
        }
    }
}

/// Inventory state after startup: loaded and shareable, or explicitly absent
#[derive(Clone)]
pub enum Inventory {
    Loaded(Arc<dyn MedicineLookup>),
    Absent { reason: String },
}

impl fmt::Debug for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inventory::Loaded(lookup) => f
                .debug_struct("Loaded")
                .field("entries", &lookup.len())
                .finish(),
            Inventory::Absent { reason } => {
                f.debug_struct("Absent").field("reason", reason).finish()
            }
        }
    }
}

impl Inventory {
    /// Load the configured database; any failure yields [`Inventory::Absent`]
    pub fn load_or_absent(config: &ValidationConfig) -> Self {
        let Some(path) = config.database_path.as_deref() else {
            info!("No medicine database configured, names will be delegated to the secondary validator");
            return Inventory::Absent {
                reason: "no database configured".to_string(),
            };
        };

        match InventoryIndex::load(path, config) {
            Ok(index) => Inventory::Loaded(Arc::new(index)),
            Err(e) => {
                error_logging::log_database_error(&e, "load_inventory", Some(path));
                Inventory::Absent {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Wrap any lookup implementation
    pub fn loaded(lookup: impl MedicineLookup + 'static) -> Self {
        Inventory::Loaded(Arc::new(lookup))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Inventory::Loaded(_))
    }
}
