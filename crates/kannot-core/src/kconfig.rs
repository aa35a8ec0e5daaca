//! # KConfig Module
//!
//! Parser for the kernel's native `.config` text format.
//!
//! Recognized lines:
//! - `CONFIG_X=value` (quoted string, bare word or number, kept verbatim)
//! - `# CONFIG_X is not set` (recorded as `n`)
//! - blank lines and any other `#` comment (ignored)
//!
//! Anything else makes the whole document invalid. A `ConfigDocument` is
//! read-only input to the engine; it is never the persisted source of truth.

use crate::primitives::DISABLED_VALUE;
use crate::storage::file::read_text;
use crate::{AnnotationError, Symbol};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static SET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(CONFIG_[A-Za-z0-9_]+)=(.*)$").expect("static regex is valid")
});

static UNSET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*(CONFIG_[A-Za-z0-9_]+) is not set$").expect("static regex is valid")
});

/// One parsed `.config` file: symbols in file order with their literal values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    entries: Vec<(Symbol, String)>,
    index: BTreeMap<Symbol, usize>,
}

impl ConfigDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a `.config` file.
    pub fn load(path: &Path) -> Result<Self, AnnotationError> {
        let text = read_text(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse `.config` text. `origin` names the source in error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self, AnnotationError> {
        let mut document = Self::new();

        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = UNSET_LINE.captures(line) {
                let symbol = Symbol::new(&caps[1])
                    .map_err(|e| AnnotationError::parse(origin, number + 1, e.to_string()))?;
                document.insert(symbol, DISABLED_VALUE);
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            let caps = SET_LINE.captures(line).ok_or_else(|| {
                AnnotationError::parse(origin, number + 1, format!("malformed config line '{}'", line))
            })?;
            let symbol = Symbol::new(&caps[1])
                .map_err(|e| AnnotationError::parse(origin, number + 1, e.to_string()))?;
            document.insert(symbol, &caps[2]);
        }

        Ok(document)
    }

    /// Set a symbol's value. A repeated symbol keeps its first position and
    /// takes the latest value.
    pub fn insert(&mut self, symbol: Symbol, value: impl Into<String>) {
        let value = value.into();
        match self.index.get(&symbol) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.index.insert(symbol.clone(), self.entries.len());
                self.entries.push((symbol, value));
            }
        }
    }

    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<&str> {
        self.index
            .get(symbol)
            .map(|&position| self.entries[position].1.as_str())
    }

    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.index.contains_key(symbol)
    }

    /// Symbols and values in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &str)> {
        self.entries
            .iter()
            .map(|(symbol, value)| (symbol, value.as_str()))
    }

    /// Symbols in file order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter().map(|(symbol, _)| symbol)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
