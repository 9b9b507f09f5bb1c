//! Path Validation module for safe file naming
//!
//! Response sources (image names, file stems) end up in the names of debug
//! artifacts and per-file output directories. This module turns them into
//! names that cannot escape their parent directory and validates names that
//! come from configuration.
//!
//! ## Usage Examples
//!
//! ```rust
//! use prescription_validator::path_validation::{sanitize_source_name, validate_filename};
//!
//! assert_eq!(sanitize_source_name("scan 01 (front).jpg", 50), "scan01front.jpg");
//! assert_eq!(sanitize_source_name("../../etc", 50), "....etc");
//! assert_eq!(sanitize_source_name("???", 50), "unknown");
//!
//! assert!(validate_filename("results.json").is_ok());
//! assert!(validate_filename("../results.json").is_err());
//! ```

use std::fmt;

/// Errors that can occur during path validation
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidationError {
    /// Name is a directory traversal component or contains a separator
    PathTraversal,
    /// Name contains null bytes
    NullByte,
    /// Name contains invalid characters
    InvalidCharacters,
    /// Filename is too long
    FilenameTooLong,
    /// Filename uses reserved name
    ReservedName,
    /// Empty name provided
    EmptyPath,
}

impl fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PathValidationError::PathTraversal => "path traversal is not allowed",
            PathValidationError::NullByte => "null bytes are not allowed",
            PathValidationError::InvalidCharacters => "contains invalid characters",
            PathValidationError::FilenameTooLong => "filename is too long",
            PathValidationError::ReservedName => "filename is reserved",
            PathValidationError::EmptyPath => "name is empty",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PathValidationError {}

/// Result type for path validation operations
pub type PathValidationResult<T> = Result<T, PathValidationError>;

/// Maximum allowed filename length (255 bytes on most filesystems)
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Name used when sanitizing leaves nothing usable
pub const UNKNOWN_SOURCE_NAME: &str = "unknown";

/// Reserved filenames that should not be used (Windows compatibility)
pub const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Characters that are not allowed in filenames
pub const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Validate a single file or directory name taken from configuration
pub fn validate_filename(filename: &str) -> PathValidationResult<()> {
    if filename.is_empty() {
        return Err(PathValidationError::EmptyPath);
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(PathValidationError::FilenameTooLong);
    }

    if filename.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    if filename == "." || filename == ".." || filename.contains('/') || filename.contains('\\') {
        return Err(PathValidationError::PathTraversal);
    }

    // Check for reserved names (case-insensitive)
    let filename_upper = filename.to_uppercase();
    let name_without_ext = filename_upper.split('.').next().unwrap_or("");
    if RESERVED_NAMES.contains(&name_without_ext) {
        return Err(PathValidationError::ReservedName);
    }

    if filename
        .chars()
        .any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c) || c.is_control())
    {
        return Err(PathValidationError::InvalidCharacters);
    }

    Ok(())
}

/// Reduce a source identifier to alphanumerics and `._-`, capped at `max_chars`.
///
/// Results made only of dots, or empty results, become [`UNKNOWN_SOURCE_NAME`]
/// so the name can always be joined under a parent directory.
pub fn sanitize_source_name(source: &str, max_chars: usize) -> String {
    let sanitized: String = source
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(max_chars)
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        return UNKNOWN_SOURCE_NAME.to_string();
    }

    sanitized
}
