//! # File Storage
//!
//! Loads annotation stores from disk and writes them back.
//!
//! ## Includes
//!
//! With `include_children`, every path listed in a store's `include`
//! attribute is resolved against the including file's directory and loaded
//! depth-first. Each child is merged underneath what is already loaded, so
//! the first file to define a field wins. A file that includes itself,
//! directly or through a chain, is a parse error.
//!
//! ## Limits
//!
//! Input files larger than `MAX_INPUT_FILE_SIZE` are rejected before being
//! read, and include chains deeper than `MAX_INCLUDE_DEPTH` are refused.

use crate::formats::{json, legacy};
use crate::primitives::{MAX_INCLUDE_DEPTH, MAX_INPUT_FILE_SIZE};
use crate::store::{SourceLocation, StoreFormat};
use crate::{AnnotationError, AnnotationStore, Symbol};
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// A symbol key anywhere in a JSON store, including compact one-line files.
static JSON_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(CONFIG_[A-Za-z0-9_]+)"\s*:"#).expect("static regex is valid")
});

/// A legacy store line defining a symbol.
static LEGACY_DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(CONFIG_[A-Za-z0-9_]+)\s+(policy|note)<").expect("static regex is valid")
});

// =============================================================================
// RAW I/O
// =============================================================================

/// Read a whole text file, refusing oversized inputs.
///
/// Content that is not valid UTF-8 is a parse error at the offending line.
pub fn read_text(path: &Path) -> Result<String, AnnotationError> {
    let metadata = std::fs::metadata(path).map_err(|e| AnnotationError::io(path, e))?;
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(AnnotationError::InvalidArgument(format!(
            "{}: file too large ({} bytes, max {})",
            path.display(),
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| AnnotationError::io(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|&&byte| byte == b'\n').count() + 1;
        AnnotationError::parse(path.display().to_string(), line, "invalid UTF-8")
    })
}

/// Replace a file's content.
pub fn write_text(path: &Path, text: &str) -> Result<(), AnnotationError> {
    std::fs::write(path, text).map_err(|e| AnnotationError::io(path, e))
}

// =============================================================================
// STORE LOADING
// =============================================================================

/// How `load_store` treats the file it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Follow `include` directives.
    pub include_children: bool,
    /// Require the primary file to be JSON. Included files may be either.
    pub strict_json: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            include_children: true,
            strict_json: false,
        }
    }
}

/// Load a store and, optionally, everything it includes.
pub fn load_store(path: &Path, options: LoadOptions) -> Result<AnnotationStore, AnnotationError> {
    let mut stack = Vec::new();
    load_recursive(path, options, &mut stack)
}

fn load_recursive(
    path: &Path,
    options: LoadOptions,
    stack: &mut Vec<PathBuf>,
) -> Result<AnnotationStore, AnnotationError> {
    let origin = path.display().to_string();
    let text = read_text(path)?;
    let mut store = decode(&text, &origin, options.strict_json)?;
    locate_definitions(&mut store, path, &text);

    if !options.include_children || store.attributes().include.is_empty() {
        return Ok(store);
    }

    if stack.len() >= MAX_INCLUDE_DEPTH {
        return Err(AnnotationError::parse(
            origin,
            0,
            format!("include depth exceeds {}", MAX_INCLUDE_DEPTH),
        ));
    }

    let canonical = std::fs::canonicalize(path).map_err(|e| AnnotationError::io(path, e))?;
    stack.push(canonical);

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let child_options = LoadOptions {
        strict_json: false,
        ..options
    };
    for include in store.attributes().include.clone() {
        let child_path = base.join(&include);
        let child_canonical =
            std::fs::canonicalize(&child_path).map_err(|e| AnnotationError::io(&child_path, e))?;
        if stack.contains(&child_canonical) {
            return Err(AnnotationError::parse(
                origin,
                include_line(&text, &include),
                format!("include cycle through '{}'", include),
            ));
        }
        let child = load_recursive(&child_path, child_options, stack)?;
        store.merge_included(&child);
    }

    stack.pop();
    Ok(store)
}

/// Decode store text, sniffing the format from the first non-blank character.
pub fn decode(text: &str, origin: &str, strict_json: bool) -> Result<AnnotationStore, AnnotationError> {
    if text.trim_start().starts_with('{') {
        json::store_from_json(text, origin)
    } else if strict_json {
        Err(AnnotationError::parse(origin, 1, "expected a JSON annotations file"))
    } else {
        legacy::parse(text, origin)
    }
}

fn locate_definitions(store: &mut AnnotationStore, path: &Path, text: &str) {
    let pattern: &Regex = match store.format() {
        StoreFormat::Json => &JSON_DEFINITION,
        StoreFormat::Legacy => &LEGACY_DEFINITION,
    };
    for (number, line) in text.lines().enumerate() {
        for caps in pattern.captures_iter(line) {
            if let Ok(symbol) = Symbol::new(&caps[1]) {
                store.record_location(
                    symbol,
                    SourceLocation {
                        path: path.to_path_buf(),
                        line: number + 1,
                    },
                );
            }
        }
    }
}

fn include_line(text: &str, include: &str) -> usize {
    text.lines()
        .position(|line| line.contains(include))
        .map_or(0, |index| index + 1)
}

// =============================================================================
// STORE SAVING
// =============================================================================

/// Write the primary layer of `store` in the format it was loaded from.
pub fn save_store(store: &AnnotationStore, path: &Path) -> Result<(), AnnotationError> {
    let text = match store.format() {
        StoreFormat::Json => json::store_to_json(store)?,
        StoreFormat::Legacy => legacy::write(store),
    };
    write_text(path, &text)
}

// =============================================================================
// TESTS
// =============================================================================
