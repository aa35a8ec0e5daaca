//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every other module:
//! - Config symbol identifiers (`Symbol`)
//! - Policy values (`Policy`) and the scopes they live at (`Scope`)
//! - The per-scope record (`Annotation`)
//! - Error types (`AnnotationError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module implement `Ord` so they can key `BTreeMap`s,
//! which keeps every serialized output in a stable order.

use crate::primitives::{CONFIG_PREFIX, DISABLED_VALUE, GLOBAL_SCOPE_KEY, UNDEFINED_VALUE};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// SYMBOL
// =============================================================================

/// A kernel config symbol, always stored in its `CONFIG_` prefixed form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate a symbol name.
    ///
    /// `FOO` and `CONFIG_FOO` both produce `CONFIG_FOO`. The part after the
    /// prefix must be non-empty ASCII alphanumerics or underscores.
    pub fn new(name: &str) -> Result<Self, AnnotationError> {
        let name = name.trim();
        let full = if name.starts_with(CONFIG_PREFIX) {
            name.to_string()
        } else {
            format!("{}{}", CONFIG_PREFIX, name)
        };

        let body = &full[CONFIG_PREFIX.len()..];
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AnnotationError::InvalidArgument(format!(
                "invalid config symbol '{}'",
                name
            )));
        }

        Ok(Self(full))
    }

    /// The full `CONFIG_` prefixed name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// The value rule recorded for a symbol at one scope.
///
/// The vocabulary is open: anything that is not one of the well-known
/// tristate/undefined markers is kept verbatim as a `Literal` (quoted
/// strings keep their quotes, numbers and hex values their spelling).
/// "Inherit from the parent scope" is expressed by the *absence* of a
/// policy, never by a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Policy {
    /// `y`
    Builtin,
    /// `m`
    Module,
    /// `n`, rendered as `# CONFIG_X is not set`.
    Disabled,
    /// `-`: the symbol is unconstrained / must not appear.
    Undefined,
    /// Any other literal value.
    Literal(String),
}

impl Policy {
    /// Parse a raw policy value. Never fails: unknown spellings are literals.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "y" => Self::Builtin,
            "m" => Self::Module,
            DISABLED_VALUE => Self::Disabled,
            UNDEFINED_VALUE => Self::Undefined,
            other => Self::Literal(other.to_string()),
        }
    }

    /// The textual form used in every on-disk format.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Builtin => "y",
            Self::Module => "m",
            Self::Disabled => DISABLED_VALUE,
            Self::Undefined => UNDEFINED_VALUE,
            Self::Literal(value) => value,
        }
    }

    /// Whether this policy says the symbol should exist in a `.config`.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

impl From<&str> for Policy {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SCOPE
// =============================================================================

/// Where an annotation applies. Ordered from least to most specific.
///
/// The textual key is `*` for global, `<arch>` for an architecture and
/// `<arch>-<flavour>` for a flavour. Architecture names never contain `-`,
/// so the first `-` of a key always separates arch from flavour.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    /// Applies to every architecture and flavour.
    Global,
    /// Applies to one architecture.
    Arch(String),
    /// Applies to one flavour of one architecture.
    Flavour { arch: String, flavour: String },
}

impl Scope {
    /// Build a scope from optional qualifiers.
    ///
    /// A flavour without an architecture cannot be placed in the hierarchy
    /// and is reported as an ambiguous query.
    pub fn new(arch: Option<&str>, flavour: Option<&str>) -> Result<Self, AnnotationError> {
        match (arch, flavour) {
            (None, None) => Ok(Self::Global),
            (Some(arch), None) => {
                validate_arch(arch)?;
                Ok(Self::Arch(arch.to_string()))
            }
            (Some(arch), Some(flavour)) => {
                validate_arch(arch)?;
                validate_flavour(flavour)?;
                Ok(Self::Flavour {
                    arch: arch.to_string(),
                    flavour: flavour.to_string(),
                })
            }
            (None, Some(flavour)) => Err(AnnotationError::AmbiguousQuery {
                subject: format!("flavour '{}'", flavour),
                missing: "arch",
            }),
        }
    }

    /// Parse a scope key (`*`, `amd64`, `amd64-generic`).
    pub fn parse_key(key: &str) -> Result<Self, AnnotationError> {
        if key == GLOBAL_SCOPE_KEY {
            return Ok(Self::Global);
        }
        match key.split_once('-') {
            Some((arch, flavour)) => Self::new(Some(arch), Some(flavour)),
            None => Self::new(Some(key), None),
        }
    }

    /// The textual key of this scope.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Global => GLOBAL_SCOPE_KEY.to_string(),
            Self::Arch(arch) => arch.clone(),
            Self::Flavour { arch, flavour } => format!("{}-{}", arch, flavour),
        }
    }

    #[must_use]
    pub fn arch(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Arch(arch) | Self::Flavour { arch, .. } => Some(arch),
        }
    }

    #[must_use]
    pub fn flavour(&self) -> Option<&str> {
        match self {
            Self::Flavour { flavour, .. } => Some(flavour),
            _ => None,
        }
    }

    /// The next less specific scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Global => None,
            Self::Arch(_) => Some(Self::Global),
            Self::Flavour { arch, .. } => Some(Self::Arch(arch.clone())),
        }
    }

    /// Every scope consulted when resolving at this scope, least specific first.
    #[must_use]
    pub fn chain(&self) -> Vec<Self> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(Self::parent) {
            chain.push(parent);
        }
        chain.reverse();
        chain
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn validate_arch(arch: &str) -> Result<(), AnnotationError> {
    if arch.is_empty()
        || arch == GLOBAL_SCOPE_KEY
        || arch.contains('-')
        || arch.chars().any(char::is_whitespace)
    {
        return Err(AnnotationError::InvalidArgument(format!(
            "invalid architecture '{}'",
            arch
        )));
    }
    Ok(())
}

fn validate_flavour(flavour: &str) -> Result<(), AnnotationError> {
    if flavour.is_empty() || flavour.chars().any(char::is_whitespace) {
        return Err(AnnotationError::InvalidArgument(format!(
            "invalid flavour '{}'",
            flavour
        )));
    }
    Ok(())
}

// =============================================================================
// ANNOTATION
// =============================================================================

/// The record stored for one symbol at one scope.
///
/// Policy and note are independent: either may be set without the other,
/// and a more specific scope overrides them one field at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub policy: Option<Policy>,
    pub note: Option<String>,
}

impl Annotation {
    #[must_use]
    pub fn new(policy: Option<Policy>, note: Option<String>) -> Self {
        Self { policy, note }
    }

    /// True when neither field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policy.is_none() && self.note.is_none()
    }

    /// Fill the fields this record leaves unset from `other`.
    pub fn fill_from(&mut self, other: &Annotation) {
        if self.policy.is_none() {
            self.policy.clone_from(&other.policy);
        }
        if self.note.is_none() {
            self.note.clone_from(&other.note);
        }
    }
}

/// A symbol's fields spread over the scopes they are set at.
///
/// This is the shape both the JSON store and query results use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedEntry {
    pub policy: BTreeMap<Scope, Policy>,
    pub note: BTreeMap<Scope, String>,
}

impl ScopedEntry {
    /// Add the fields of `record` at `scope`.
    pub fn insert(&mut self, scope: &Scope, record: &Annotation) {
        if let Some(policy) = &record.policy {
            self.policy.insert(scope.clone(), policy.clone());
        }
        if let Some(note) = &record.note {
            self.note.insert(scope.clone(), note.clone());
        }
    }

    #[must_use]
    pub fn has_note(&self) -> bool {
        !self.note.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policy.is_empty() && self.note.is_empty()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading, querying or saving annotations.
///
/// Consistency mismatches are not errors: the reconciler collects them in a
/// `CheckReport` so one run can enumerate all of them.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// Malformed `.config` or annotations syntax.
    #[error("{origin}:{line}: {message}")]
    Parse {
        origin: String,
        line: usize,
        message: String,
    },

    /// A file could not be read or written.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required scope qualifier was omitted.
    #[error("ambiguous query for {subject}: {missing} is required")]
    AmbiguousQuery {
        subject: String,
        missing: &'static str,
    },

    /// No annotations file was given and none could be found.
    #[error("could not determine DEBIAN path, please specify the annotations file with --file")]
    AutodetectFailed,

    /// A caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Encoding an output document failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AnnotationError {
    /// Build a parse error for `origin` at a 1-based line number.
    pub fn parse(origin: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.into(),
            line,
            message: message.into(),
        }
    }

    /// Build an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
