//! # Annotation Store
//!
//! The hierarchical policy database.
//!
//! ## Layout
//!
//! A `ScopeTable` is an explicit three-level lookup structure:
//! - `global`: symbol → annotation
//! - `arch`: arch → symbol → annotation
//! - `full`: (arch, flavour) → symbol → annotation
//!
//! An `AnnotationStore` holds two tables. The *local* table is the primary
//! file's content and the only one ever written back. The *included* table
//! holds everything merged in from `include` directives. Reads see the local
//! fields first and fall back to the included ones field by field, so an
//! include can never override what the primary file says.

use crate::primitives::FORMAT_VERSION;
use crate::storage::file::{self, LoadOptions};
use crate::{Annotation, AnnotationError, Policy, Scope, ScopedEntry, Symbol};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// =============================================================================
// SCOPE TABLE
// =============================================================================

type Level = BTreeMap<Symbol, Annotation>;

/// Annotations indexed by scope, then symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeTable {
    global: Level,
    arch: BTreeMap<String, Level>,
    full: BTreeMap<(String, String), Level>,
}

impl ScopeTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn level(&self, scope: &Scope) -> Option<&Level> {
        match scope {
            Scope::Global => Some(&self.global),
            Scope::Arch(arch) => self.arch.get(arch),
            Scope::Flavour { arch, flavour } => self.full.get(&(arch.clone(), flavour.clone())),
        }
    }

    fn level_mut(&mut self, scope: &Scope) -> &mut Level {
        match scope {
            Scope::Global => &mut self.global,
            Scope::Arch(arch) => self.arch.entry(arch.clone()).or_default(),
            Scope::Flavour { arch, flavour } => self
                .full
                .entry((arch.clone(), flavour.clone()))
                .or_default(),
        }
    }

    /// Drop empty records and empty levels so equal content compares equal.
    fn prune(&mut self, symbol: &Symbol, scope: &Scope) {
        let level = self.level_mut(scope);
        if level.get(symbol).is_some_and(Annotation::is_empty) {
            level.remove(symbol);
        }
        match scope {
            Scope::Global => {}
            Scope::Arch(arch) => {
                if self.arch.get(arch).is_some_and(BTreeMap::is_empty) {
                    self.arch.remove(arch);
                }
            }
            Scope::Flavour { arch, flavour } => {
                let key = (arch.clone(), flavour.clone());
                if self.full.get(&key).is_some_and(BTreeMap::is_empty) {
                    self.full.remove(&key);
                }
            }
        }
    }

    /// The record declared for `symbol` at exactly `scope`.
    #[must_use]
    pub fn get(&self, symbol: &Symbol, scope: &Scope) -> Option<&Annotation> {
        self.level(scope).and_then(|level| level.get(symbol))
    }

    /// Write the given fields at `scope`; `None` fields are left untouched.
    pub fn set(
        &mut self,
        symbol: &Symbol,
        scope: &Scope,
        policy: Option<Policy>,
        note: Option<String>,
    ) {
        if policy.is_none() && note.is_none() {
            return;
        }
        let record = self.level_mut(scope).entry(symbol.clone()).or_default();
        if policy.is_some() {
            record.policy = policy;
        }
        if note.is_some() {
            record.note = note;
        }
    }

    fn existing_level_mut(&mut self, scope: &Scope) -> Option<&mut Level> {
        match scope {
            Scope::Global => Some(&mut self.global),
            Scope::Arch(arch) => self.arch.get_mut(arch),
            Scope::Flavour { arch, flavour } => self.full.get_mut(&(arch.clone(), flavour.clone())),
        }
    }

    /// Delete the record at `scope`. Removing an absent record is a no-op.
    pub fn remove(&mut self, symbol: &Symbol, scope: &Scope) -> Option<Annotation> {
        let removed = self.existing_level_mut(scope)?.remove(symbol)?;
        self.prune(symbol, scope);
        Some(removed)
    }

    /// Drop only the policy at `scope`, keeping any note.
    pub fn clear_policy(&mut self, symbol: &Symbol, scope: &Scope) {
        let Some(record) = self
            .existing_level_mut(scope)
            .and_then(|level| level.get_mut(symbol))
        else {
            return;
        };
        record.policy = None;
        self.prune(symbol, scope);
    }

    /// Copy in every field of `other` this table does not already define.
    pub fn fill_from(&mut self, other: &ScopeTable) {
        for (scope, symbol, record) in other.iter() {
            let own = self.level_mut(&scope).entry(symbol.clone()).or_default();
            own.fill_from(record);
        }
    }

    /// Every record with its scope, global first, then arches, then flavours.
    pub fn iter(&self) -> impl Iterator<Item = (Scope, &Symbol, &Annotation)> {
        let global = self
            .global
            .iter()
            .map(|(symbol, record)| (Scope::Global, symbol, record));
        let arch = self.arch.iter().flat_map(|(arch, level)| {
            level
                .iter()
                .map(move |(symbol, record)| (Scope::Arch(arch.clone()), symbol, record))
        });
        let full = self.full.iter().flat_map(|((arch, flavour), level)| {
            level.iter().map(move |(symbol, record)| {
                (
                    Scope::Flavour {
                        arch: arch.clone(),
                        flavour: flavour.clone(),
                    },
                    symbol,
                    record,
                )
            })
        });
        global.chain(arch).chain(full)
    }

    /// Records regrouped per symbol, each with its scoped fields.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<Symbol, ScopedEntry> {
        let mut entries: BTreeMap<Symbol, ScopedEntry> = BTreeMap::new();
        for (scope, symbol, record) in self.iter() {
            entries
                .entry(symbol.clone())
                .or_default()
                .insert(&scope, record);
        }
        entries
    }

    /// Every symbol with at least one record.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.iter().map(|(_, symbol, _)| symbol.clone()).collect()
    }

    /// Every scope holding at least one record.
    #[must_use]
    pub fn scopes(&self) -> BTreeSet<Scope> {
        let mut scopes = BTreeSet::new();
        if !self.global.is_empty() {
            scopes.insert(Scope::Global);
        }
        scopes.extend(self.arch.keys().map(|arch| Scope::Arch(arch.clone())));
        scopes.extend(self.full.keys().map(|(arch, flavour)| Scope::Flavour {
            arch: arch.clone(),
            flavour: flavour.clone(),
        }));
        scopes
    }

    /// Whether any flavour of `arch` carries a record for `symbol`.
    /// `None` asks about the flavours of every arch.
    #[must_use]
    pub fn has_flavour_records(&self, symbol: &Symbol, arch: Option<&str>) -> bool {
        self.full.iter().any(|((a, _), level)| {
            arch.is_none_or(|arch| a == arch) && level.contains_key(symbol)
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.arch.is_empty() && self.full.is_empty()
    }
}

// =============================================================================
// STORE ATTRIBUTES
// =============================================================================

/// On-disk format a store was loaded from and will be saved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    #[default]
    Json,
    Legacy,
}

/// Store-level attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAttributes {
    /// Architecture this file is dedicated to, if any.
    pub arch: Option<String>,
    /// Flavour this file is dedicated to, if any.
    pub flavour: Option<String>,
    /// Whether symbols may differ between flavours of one architecture.
    pub flavour_dep: bool,
    /// Included sub-stores, relative to this file's directory.
    pub include: Vec<String>,
    /// Format version.
    pub version: u32,
}

impl Default for StoreAttributes {
    fn default() -> Self {
        Self {
            arch: None,
            flavour: None,
            flavour_dep: false,
            include: Vec::new(),
            version: FORMAT_VERSION,
        }
    }
}

/// Where a symbol is first defined on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
}

// =============================================================================
// ANNOTATION STORE
// =============================================================================

/// The in-memory annotations database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationStore {
    attributes: StoreAttributes,
    format: StoreFormat,
    local: ScopeTable,
    included: ScopeTable,
    locations: BTreeMap<Symbol, SourceLocation>,
}

impl AnnotationStore {
    /// Create an empty store in the JSON format.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a store from decoded parts.
    #[must_use]
    pub fn from_parts(attributes: StoreAttributes, format: StoreFormat, local: ScopeTable) -> Self {
        Self {
            attributes,
            format,
            local,
            included: ScopeTable::new(),
            locations: BTreeMap::new(),
        }
    }

    /// Load a store from disk.
    ///
    /// With `include_children`, every `include` is loaded depth-first and
    /// merged underneath the fields already loaded. With `strict_json`, the
    /// primary file must be JSON.
    pub fn load(
        path: &Path,
        include_children: bool,
        strict_json: bool,
    ) -> Result<Self, AnnotationError> {
        file::load_store(
            path,
            LoadOptions {
                include_children,
                strict_json,
            },
        )
    }

    /// Write the primary layer back to `path` in the store's own format.
    pub fn save(&self, path: &Path) -> Result<(), AnnotationError> {
        file::save_store(self, path)
    }

    #[must_use]
    pub fn attributes(&self) -> &StoreAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut StoreAttributes {
        &mut self.attributes
    }

    #[must_use]
    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// The primary layer: what `save` writes.
    #[must_use]
    pub fn local(&self) -> &ScopeTable {
        &self.local
    }

    /// Everything merged in from includes.
    #[must_use]
    pub fn included(&self) -> &ScopeTable {
        &self.included
    }

    /// Merge an included store underneath this one. Fields already present
    /// in either layer win over the incoming ones.
    pub fn merge_included(&mut self, child: &AnnotationStore) {
        self.included.fill_from(&child.flattened());
        for (symbol, location) in &child.locations {
            self.locations
                .entry(symbol.clone())
                .or_insert_with(|| location.clone());
        }
    }

    /// Both layers collapsed into one table, local fields first.
    #[must_use]
    pub fn flattened(&self) -> ScopeTable {
        let mut table = self.local.clone();
        table.fill_from(&self.included);
        table
    }

    /// The effective record at exactly `scope`.
    #[must_use]
    pub fn entry(&self, symbol: &Symbol, scope: &Scope) -> Option<Annotation> {
        let mut record = self.local.get(symbol, scope).cloned().unwrap_or_default();
        if let Some(included) = self.included.get(symbol, scope) {
            record.fill_from(included);
        }
        (!record.is_empty()).then_some(record)
    }

    /// Every scope `symbol` is declared at, with its effective record.
    #[must_use]
    pub fn declared(&self, symbol: &Symbol) -> BTreeMap<Scope, Annotation> {
        self.scopes()
            .into_iter()
            .filter_map(|scope| self.entry(symbol, &scope).map(|record| (scope, record)))
            .collect()
    }

    /// Write policy and/or note at a scope; omitted fields stay as they are.
    pub fn set(
        &mut self,
        symbol: &Symbol,
        scope: &Scope,
        policy: Option<Policy>,
        note: Option<String>,
    ) {
        self.local.set(symbol, scope, policy, note);
    }

    /// Delete the primary-layer override at a scope. Idempotent.
    pub fn remove(&mut self, symbol: &Symbol, scope: &Scope) {
        self.local.remove(symbol, scope);
    }

    /// Delete only the primary-layer policy at a scope.
    pub fn clear_policy(&mut self, symbol: &Symbol, scope: &Scope) {
        self.local.clear_policy(symbol, scope);
    }

    /// The known set: symbols with some field defined somewhere.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        let mut symbols = self.local.symbols();
        symbols.extend(self.included.symbols());
        symbols
    }

    #[must_use]
    pub fn is_known(&self, symbol: &Symbol) -> bool {
        self.local.symbols().contains(symbol) || self.included.symbols().contains(symbol)
    }

    /// Every scope with at least one record in either layer.
    #[must_use]
    pub fn scopes(&self) -> BTreeSet<Scope> {
        let mut scopes = self.local.scopes();
        scopes.extend(self.included.scopes());
        scopes
    }

    /// Whether `symbol` has a flavour-level record under `arch`, or under
    /// any arch when `arch` is `None`.
    #[must_use]
    pub fn has_flavour_records(&self, symbol: &Symbol, arch: Option<&str>) -> bool {
        self.local.has_flavour_records(symbol, arch)
            || self.included.has_flavour_records(symbol, arch)
    }

    /// Remember where `symbol` is defined; the first location recorded wins.
    pub fn record_location(&mut self, symbol: Symbol, location: SourceLocation) {
        self.locations.entry(symbol).or_insert(location);
    }

    #[must_use]
    pub fn location(&self, symbol: &Symbol) -> Option<&SourceLocation> {
        self.locations.get(symbol)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Symbol {
        Symbol::new(name).expect("symbol")
    }

    fn arch(name: &str) -> Scope {
        Scope::Arch(name.to_string())
    }

    #[test]
    fn set_leaves_omitted_fields_alone() {
        let mut store = AnnotationStore::new();
        let foo = sym("FOO");

        store.set(&foo, &Scope::Global, Some(Policy::Builtin), Some("why".to_string()));
        store.set(&foo, &Scope::Global, Some(Policy::Module), None);

        let record = store.entry(&foo, &Scope::Global).expect("record");
        assert_eq!(record.policy, Some(Policy::Module));
        assert_eq!(record.note.as_deref(), Some("why"));
    }

    #[test]
    fn set_with_nothing_creates_nothing() {
        let mut store = AnnotationStore::new();
        store.set(&sym("FOO"), &arch("amd64"), None, None);
        assert!(store.local().is_empty());
        assert!(store.scopes().is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = AnnotationStore::new();
        let foo = sym("FOO");
        store.set(&foo, &Scope::Global, Some(Policy::Builtin), None);
        store.set(&foo, &arch("riscv64"), Some(Policy::Disabled), None);

        store.remove(&foo, &arch("riscv64"));
        let once = store.clone();
        store.remove(&foo, &arch("riscv64"));

        assert_eq!(store, once);
        assert!(!store.scopes().contains(&arch("riscv64")));
    }

    #[test]
    fn clear_policy_keeps_note() {
        let mut store = AnnotationStore::new();
        let foo = sym("FOO");
        store.set(&foo, &arch("amd64"), Some(Policy::Builtin), Some("keep".to_string()));

        store.clear_policy(&foo, &arch("amd64"));

        let record = store.entry(&foo, &arch("amd64")).expect("record");
        assert_eq!(record.policy, None);
        assert_eq!(record.note.as_deref(), Some("keep"));
    }

    #[test]
    fn included_fields_never_override_local() {
        let mut primary = AnnotationStore::new();
        let foo = sym("FOO");
        primary.set(&foo, &Scope::Global, Some(Policy::Builtin), None);

        let mut child = AnnotationStore::new();
        child.set(&foo, &Scope::Global, Some(Policy::Disabled), Some("base note".to_string()));
        child.set(&sym("BAR"), &Scope::Global, Some(Policy::Module), None);

        primary.merge_included(&child);

        let record = primary.entry(&foo, &Scope::Global).expect("foo");
        assert_eq!(record.policy, Some(Policy::Builtin));
        assert_eq!(record.note.as_deref(), Some("base note"));
        assert!(primary.is_known(&sym("BAR")));
        // Nothing from the include reaches the primary layer.
        assert!(primary.local().get(&sym("BAR"), &Scope::Global).is_none());
    }

    #[test]
    fn first_included_store_wins() {
        let foo = sym("FOO");
        let mut first = AnnotationStore::new();
        first.set(&foo, &Scope::Global, Some(Policy::Module), None);
        let mut second = AnnotationStore::new();
        second.set(&foo, &Scope::Global, Some(Policy::Disabled), None);

        let mut primary = AnnotationStore::new();
        primary.merge_included(&first);
        primary.merge_included(&second);

        assert_eq!(
            primary.entry(&foo, &Scope::Global).and_then(|r| r.policy),
            Some(Policy::Module)
        );
    }

    #[test]
    fn entries_group_records_per_symbol() {
        let mut table = ScopeTable::new();
        let foo = sym("FOO");
        table.set(&foo, &Scope::Global, Some(Policy::Disabled), None);
        table.set(&foo, &arch("riscv64"), Some(Policy::Builtin), None);
        table.set(
            &foo,
            &Scope::parse_key("riscv64-generic").expect("scope"),
            None,
            Some("flavour note".to_string()),
        );

        let entries = table.entries();
        let entry = entries.get(&foo).expect("entry");
        assert_eq!(entry.policy.len(), 2);
        assert_eq!(entry.note.len(), 1);
        assert!(table.has_flavour_records(&foo, Some("riscv64")));
        assert!(!table.has_flavour_records(&foo, Some("amd64")));
        assert!(table.has_flavour_records(&foo, None));
        assert!(!table.has_flavour_records(&sym("BAR"), None));
    }
}
