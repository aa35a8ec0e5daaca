//! # Resolver
//!
//! Walks the scope hierarchy to produce a symbol's effective policy and note.
//!
//! For a request at (arch, flavour) the walk consults global, then arch,
//! then arch+flavour. Each step overrides the fields it defines and leaves
//! the others alone, so policy and note are resolved independently. The
//! most specific scope always wins; there is no other priority.

use crate::primitives::UNDEFINED_VALUE;
use crate::query::Query;
use crate::{Annotation, AnnotationError, AnnotationStore, Policy, Scope, ScopedEntry, Symbol};
use std::collections::BTreeMap;

/// Result of `search_config`: symbol → fields per scope.
pub type SearchResult = BTreeMap<Symbol, ScopedEntry>;

/// A symbol's effective state at one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub symbol: Symbol,
    /// The scope resolution was requested at.
    pub scope: Scope,
    pub policy: Option<Policy>,
    /// The scope that supplied `policy`.
    pub policy_scope: Option<Scope>,
    pub note: Option<String>,
    /// The scope that supplied `note`.
    pub note_scope: Option<Scope>,
}

impl Resolved {
    /// The expected `.config` value; `-` when no policy applies.
    #[must_use]
    pub fn value(&self) -> &str {
        self.policy.as_ref().map_or(UNDEFINED_VALUE, Policy::as_str)
    }
}

/// Read-only resolution over a store.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    store: &'a AnnotationStore,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(store: &'a AnnotationStore) -> Self {
        Self { store }
    }

    /// Resolve one symbol at one scope.
    ///
    /// Returns `Ok(None)` when no scope in the chain defines anything.
    /// Asking a flavour-dependent store about a symbol with flavour records
    /// without naming a flavour, whether at its arch or globally, is an
    /// `AmbiguousQuery`.
    pub fn resolve(
        &self,
        symbol: &Symbol,
        scope: &Scope,
    ) -> Result<Option<Resolved>, AnnotationError> {
        self.ensure_unambiguous(symbol, scope)?;
        Ok(self.walk(symbol, scope))
    }

    /// Resolve every known symbol at `scope`, skipping undefined ones.
    pub fn resolve_all(
        &self,
        scope: &Scope,
    ) -> Result<BTreeMap<Symbol, Resolved>, AnnotationError> {
        let mut resolved = BTreeMap::new();
        for symbol in self.store.symbols() {
            if let Some(record) = self.resolve(&symbol, scope)? {
                resolved.insert(symbol, record);
            }
        }
        Ok(resolved)
    }

    /// Answer a `search_config` query.
    ///
    /// - no symbol, no scope: every symbol with the scopes it is declared at;
    /// - symbol, no scope: that symbol resolved at every scope the store
    ///   knows, plus its declared notes;
    /// - scope: every (or the given) symbol resolved at that scope.
    ///
    /// Nothing matching yields an empty result, never an error.
    pub fn search(&self, query: &Query) -> Result<SearchResult, AnnotationError> {
        let symbols: Vec<Symbol> = match &query.symbol {
            Some(symbol) if self.store.is_known(symbol) => vec![symbol.clone()],
            Some(_) => Vec::new(),
            None => self.store.symbols().into_iter().collect(),
        };

        let mut result = SearchResult::new();
        for symbol in symbols {
            let entry = match (&query.scope, &query.symbol) {
                (None, None) => self.declared_entry(&symbol),
                (None, Some(_)) => self.expanded_entry(&symbol),
                (Some(scope), _) => self.scoped_entry(&symbol, scope)?,
            };
            if !entry.is_empty() {
                result.insert(symbol, entry);
            }
        }
        Ok(result)
    }

    /// The three-step override walk, without the ambiguity check.
    pub(crate) fn walk(&self, symbol: &Symbol, scope: &Scope) -> Option<Resolved> {
        let mut resolved = Resolved {
            symbol: symbol.clone(),
            scope: scope.clone(),
            policy: None,
            policy_scope: None,
            note: None,
            note_scope: None,
        };

        for step in scope.chain() {
            let Some(record) = self.store.entry(symbol, &step) else {
                continue;
            };
            if let Some(policy) = record.policy {
                resolved.policy = Some(policy);
                resolved.policy_scope = Some(step.clone());
            }
            if let Some(note) = record.note {
                resolved.note = Some(note);
                resolved.note_scope = Some(step);
            }
        }

        (resolved.policy.is_some() || resolved.note.is_some()).then_some(resolved)
    }

    /// A flavour-dependent symbol asked about without a flavour has no
    /// single answer.
    fn ensure_unambiguous(&self, symbol: &Symbol, scope: &Scope) -> Result<(), AnnotationError> {
        if !self.store.attributes().flavour_dep {
            return Ok(());
        }
        let (arch, subject) = match scope {
            Scope::Flavour { .. } => return Ok(()),
            Scope::Arch(arch) => (Some(arch.as_str()), format!("{} on {}", symbol, arch)),
            Scope::Global => (None, symbol.to_string()),
        };
        if self.store.has_flavour_records(symbol, arch) {
            return Err(AnnotationError::AmbiguousQuery {
                subject,
                missing: "flavour",
            });
        }
        Ok(())
    }

    fn declared_entry(&self, symbol: &Symbol) -> ScopedEntry {
        let mut entry = ScopedEntry::default();
        for (scope, record) in self.store.declared(symbol) {
            entry.insert(&scope, &record);
        }
        entry
    }

    fn expanded_entry(&self, symbol: &Symbol) -> ScopedEntry {
        let mut entry = ScopedEntry::default();
        for scope in self.store.scopes() {
            let Some(resolved) = self.walk(symbol, &scope) else {
                continue;
            };
            if let Some(policy) = resolved.policy {
                entry.policy.insert(scope, policy);
            }
            if let (Some(note), Some(note_scope)) = (resolved.note, resolved.note_scope) {
                entry.note.insert(note_scope, note);
            }
        }
        entry
    }

    fn scoped_entry(&self, symbol: &Symbol, scope: &Scope) -> Result<ScopedEntry, AnnotationError> {
        let mut entry = ScopedEntry::default();
        if let Some(resolved) = self.resolve(symbol, scope)? {
            entry.insert(scope, &Annotation::new(resolved.policy, resolved.note));
        }
        Ok(entry)
    }
}

impl AnnotationStore {
    /// Search the store; see `Resolver::search`.
    pub fn search_config(
        &self,
        symbol: Option<&Symbol>,
        arch: Option<&str>,
        flavour: Option<&str>,
    ) -> Result<SearchResult, AnnotationError> {
        let query = Query::new(symbol.cloned(), arch, flavour)?;
        Resolver::new(self).search(&query)
    }
}

// =============================================================================
// TESTS
// =============================================================================
