//! # Query Module
//!
//! Structured lookups against an `AnnotationStore`.
//!
//! A query names an optional symbol and optional scope qualifiers. What
//! comes back depends on which of them are present; see
//! `Resolver::search` for the exact rules.

use crate::{AnnotationError, Scope, Symbol};

/// A `search_config` request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    /// Restrict results to one symbol.
    pub symbol: Option<Symbol>,
    /// Resolve at one scope. `None` means no arch or flavour was given,
    /// which is not the same as asking for the global scope.
    pub scope: Option<Scope>,
}

impl Query {
    /// Build a query from raw qualifiers.
    ///
    /// A flavour without an arch is rejected as ambiguous.
    pub fn new(
        symbol: Option<Symbol>,
        arch: Option<&str>,
        flavour: Option<&str>,
    ) -> Result<Self, AnnotationError> {
        let scope = match (arch, flavour) {
            (None, None) => None,
            (arch, flavour) => Some(Scope::new(arch, flavour)?),
        };
        Ok(Self { symbol, scope })
    }
}

// =============================================================================
// TESTS
// =============================================================================
