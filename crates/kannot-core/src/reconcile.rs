//! # Reconciler
//!
//! Compares and synchronizes an `AnnotationStore` with a `ConfigDocument`.
//!
//! - `check`: list every symbol whose resolved policy differs from the
//!   document. Mismatches are data, not errors.
//! - `import`: make one (arch, flavour) scope describe the document exactly.
//! - `update`: patch a subset of symbols at one scope from the document.
//!
//! Writes only ever add overrides that change the resolved value. A value
//! equal to what the scope already inherits is not recorded, and an existing
//! override that becomes redundant is dropped.

use crate::kconfig::ConfigDocument;
use crate::primitives::{UNDEFINED_VALUE, is_skipped};
use crate::resolver::Resolver;
use crate::{AnnotationError, AnnotationStore, Policy, Scope, Symbol};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CHECK REPORT
// =============================================================================

/// One symbol whose expected and actual values disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub symbol: Symbol,
    /// Resolved store value, `-` when none.
    pub expected: String,
    /// Document value, `-` when absent.
    pub actual: String,
    /// Scope the expected policy came from; `None` when the store has none.
    pub scope: Option<Scope>,
    /// Every policy the store declares for the symbol, for diagnostics.
    pub declared: BTreeMap<Scope, Policy>,
}

/// Outcome of a `check` run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub mismatches: Vec<Mismatch>,
    /// Number of symbols compared.
    pub total: usize,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    #[must_use]
    pub fn changed(&self) -> usize {
        self.mismatches.len()
    }
}

// =============================================================================
// RECONCILER
// =============================================================================

/// Stateless reconciliation operations.
pub struct Reconciler;

impl Reconciler {
    /// Compare `document` against the store resolved at `scope`.
    ///
    /// The compared set is the sorted union of store and document symbols,
    /// minus the toolchain version symbols.
    pub fn check(
        store: &AnnotationStore,
        document: &ConfigDocument,
        scope: &Scope,
    ) -> Result<CheckReport, AnnotationError> {
        let resolver = Resolver::new(store);
        let mut symbols: BTreeSet<Symbol> = store.symbols();
        symbols.extend(document.symbols().cloned());
        symbols.retain(|symbol| !is_skipped(symbol));

        let mut report = CheckReport {
            mismatches: Vec::new(),
            total: symbols.len(),
        };

        for symbol in symbols {
            let resolved = resolver.resolve(&symbol, scope)?;
            let expected = resolved
                .as_ref()
                .map_or(UNDEFINED_VALUE, |r| r.value());
            let actual = document.get(&symbol).unwrap_or(UNDEFINED_VALUE);

            if expected != actual {
                report.mismatches.push(Mismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                    scope: resolved.as_ref().and_then(|r| r.policy_scope.clone()),
                    declared: declared_policies(store, &symbol),
                    symbol,
                });
            }
        }

        Ok(report)
    }

    /// Replace the (arch, flavour) scope with the content of `document`.
    ///
    /// Both qualifiers are required. Afterwards every document symbol
    /// resolves to its document value at that scope and every other known
    /// symbol resolves to `-`. Returns the number of symbols whose resolved
    /// value changed.
    pub fn import(
        store: &mut AnnotationStore,
        document: &ConfigDocument,
        arch: Option<&str>,
        flavour: Option<&str>,
    ) -> Result<usize, AnnotationError> {
        let (Some(arch), Some(flavour)) = (arch, flavour) else {
            return Err(AnnotationError::AmbiguousQuery {
                subject: "import".to_string(),
                missing: if arch.is_none() { "arch" } else { "flavour" },
            });
        };
        let scope = Scope::new(Some(arch), Some(flavour))?;

        let mut changed = 0;
        for (symbol, value) in document.iter() {
            if !is_skipped(symbol) && Self::assign(store, symbol, &scope, Policy::parse(value)) {
                changed += 1;
            }
        }
        for symbol in store.symbols() {
            if !is_skipped(&symbol)
                && !document.contains(&symbol)
                && Self::assign(store, &symbol, &scope, Policy::Undefined)
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Patch `configs` (default: every document symbol) at the given scope.
    ///
    /// An arch is required; the flavour is optional. A listed symbol that the
    /// document lacks is set to `-`. Symbols outside the patch set are left
    /// untouched at every scope. Returns the number of symbols whose resolved
    /// value changed.
    pub fn update(
        store: &mut AnnotationStore,
        document: &ConfigDocument,
        arch: Option<&str>,
        flavour: Option<&str>,
        configs: Option<&[Symbol]>,
    ) -> Result<usize, AnnotationError> {
        if arch.is_none() {
            return Err(AnnotationError::AmbiguousQuery {
                subject: "update".to_string(),
                missing: "arch",
            });
        }
        let scope = Scope::new(arch, flavour)?;

        let targets: Vec<Symbol> = match configs {
            Some(configs) => configs.to_vec(),
            None => document
                .symbols()
                .filter(|symbol| !is_skipped(symbol))
                .cloned()
                .collect(),
        };

        let mut changed = 0;
        for symbol in targets {
            let desired = document
                .get(&symbol)
                .map_or(Policy::Undefined, Policy::parse);
            if Self::assign(store, &symbol, &scope, desired) {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Make `symbol` resolve to `desired` at `scope` with the fewest
    /// overrides. Returns whether the resolved value changed.
    fn assign(store: &mut AnnotationStore, symbol: &Symbol, scope: &Scope, desired: Policy) -> bool {
        let before = effective_policy(store, symbol, scope);

        store.clear_policy(symbol, scope);
        if effective_policy(store, symbol, scope) != desired {
            store.set(symbol, scope, Some(desired), None);
        }

        effective_policy(store, symbol, scope) != before
    }
}

/// The policy `symbol` resolves to at `scope`, with "nothing" read as `-`.
fn effective_policy(store: &AnnotationStore, symbol: &Symbol, scope: &Scope) -> Policy {
    Resolver::new(store)
        .walk(symbol, scope)
        .and_then(|resolved| resolved.policy)
        .unwrap_or(Policy::Undefined)
}

fn declared_policies(store: &AnnotationStore, symbol: &Symbol) -> BTreeMap<Scope, Policy> {
    store
        .declared(symbol)
        .into_iter()
        .filter_map(|(scope, record)| record.policy.map(|policy| (scope, policy)))
        .collect()
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

    fn doc(text: &str) -> ConfigDocument {
        ConfigDocument::parse(text, "test").expect("document")
    }

    fn flavour(arch: &str, flavour: &str) -> Scope {
        Scope::Flavour {
            arch: arch.to_string(),
            flavour: flavour.to_string(),
        }
    }

    #[test]
    fn check_reports_every_difference() {
        let mut store = AnnotationStore::new();
        store.set(&sym("A"), &Scope::Global, Some(Policy::Builtin), None);
        store.set(&sym("B"), &Scope::Global, Some(Policy::Module), None);
        store.set(&sym("GONE"), &Scope::Global, Some(Policy::Builtin), None);

        let document = doc("CONFIG_A=y\nCONFIG_B=y\nCONFIG_NEW=m\nCONFIG_GCC_VERSION=140200\n");
        let report =
            Reconciler::check(&store, &document, &Scope::Arch("amd64".to_string())).expect("check");

        assert_eq!(report.total, 4);
        let found: Vec<_> = report
            .mismatches
            .iter()
            .map(|m| (m.symbol.as_str(), m.expected.as_str(), m.actual.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("CONFIG_B", "m", "y"),
                ("CONFIG_GONE", "y", "-"),
                ("CONFIG_NEW", "-", "m"),
            ]
        );
        assert_eq!(report.mismatches[0].scope, Some(Scope::Global));
    }

    #[test]
    fn clean_check() {
        let mut store = AnnotationStore::new();
        store.set(&sym("A"), &Scope::Global, Some(Policy::Disabled), None);
        let report = Reconciler::check(&store, &doc("# CONFIG_A is not set\n"), &Scope::Global)
            .expect("check");
        assert!(report.is_clean());
        assert_eq!(report.changed(), 0);
    }

    #[test]
    fn check_without_flavour_on_flavour_dependent_store_is_ambiguous() {
        let mut store = AnnotationStore::new();
        store.attributes_mut().flavour_dep = true;
        let hz = sym("HZ");
        store.set(&hz, &Scope::Global, Some(Policy::parse("100")), None);
        store.set(&hz, &flavour("amd64", "generic"), Some(Policy::parse("250")), None);
        store.set(&hz, &flavour("amd64", "lowlatency"), Some(Policy::parse("1000")), None);
        let document = doc("CONFIG_HZ=250\n");

        for scope in [Scope::Global, Scope::Arch("amd64".to_string())] {
            let err = Reconciler::check(&store, &document, &scope).expect_err("ambiguous");
            assert!(matches!(
                err,
                AnnotationError::AmbiguousQuery {
                    missing: "flavour",
                    ..
                }
            ));
        }

        let report =
            Reconciler::check(&store, &document, &flavour("amd64", "generic")).expect("check");
        assert!(report.is_clean());
        // Arches without flavour records still resolve through the global policy.
        let arm64 = Scope::Arch("arm64".to_string());
        let report = Reconciler::check(&store, &doc("CONFIG_HZ=100\n"), &arm64).expect("check");
        assert!(report.is_clean());
    }

    #[test]
    fn import_requires_both_qualifiers() {
        let mut store = AnnotationStore::new();
        let err = Reconciler::import(&mut store, &doc("CONFIG_A=y\n"), Some("amd64"), None)
            .expect_err("needs flavour");
        assert!(matches!(
            err,
            AnnotationError::AmbiguousQuery {
                missing: "flavour",
                ..
            }
        ));
    }

    #[test]
    fn import_replaces_scope_and_elides_redundant_overrides() {
        let mut store = AnnotationStore::new();
        store.set(&sym("A"), &Scope::Global, Some(Policy::Builtin), None);
        store.set(&sym("OLD"), &Scope::Global, Some(Policy::Module), None);

        let document = doc("CONFIG_A=y\nCONFIG_B=m\n");
        Reconciler::import(&mut store, &document, Some("amd64"), Some("generic")).expect("import");

        let scope = flavour("amd64", "generic");
        // A already inherits y: no override recorded.
        assert!(store.local().get(&sym("A"), &scope).is_none());
        assert_eq!(
            store.entry(&sym("B"), &scope).and_then(|r| r.policy),
            Some(Policy::Module)
        );
        assert_eq!(
            store.entry(&sym("OLD"), &scope).and_then(|r| r.policy),
            Some(Policy::Undefined)
        );

        let report = Reconciler::check(&store, &document, &scope).expect("check");
        assert!(report.is_clean());
    }

    #[test]
    fn update_touches_only_listed_symbols() {
        let mut store = AnnotationStore::new();
        store.set(&sym("A"), &Scope::Global, Some(Policy::Builtin), None);
        store.set(&sym("B"), &Scope::Global, Some(Policy::Builtin), None);

        let document = doc("CONFIG_A=m\nCONFIG_B=m\n");
        let changed = Reconciler::update(
            &mut store,
            &document,
            Some("arm64"),
            None,
            Some(&[sym("A")][..]),
        )
        .expect("update");

        assert_eq!(changed, 1);
        let arm64 = Scope::Arch("arm64".to_string());
        assert_eq!(
            store.entry(&sym("A"), &arm64).and_then(|r| r.policy),
            Some(Policy::Module)
        );
        assert!(store.entry(&sym("B"), &arm64).is_none());
    }

    #[test]
    fn update_drops_override_that_becomes_redundant() {
        let mut store = AnnotationStore::new();
        let arm64 = Scope::Arch("arm64".to_string());
        store.set(&sym("A"), &Scope::Global, Some(Policy::Builtin), None);
        store.set(&sym("A"), &arm64, Some(Policy::Module), Some("keep".to_string()));

        Reconciler::update(&mut store, &doc("CONFIG_A=y\n"), Some("arm64"), None, None)
            .expect("update");

        let record = store.local().get(&sym("A"), &arm64).expect("note stays");
        assert_eq!(record.policy, None);
        assert_eq!(record.note.as_deref(), Some("keep"));
    }

    #[test]
    fn update_requires_arch() {
        let mut store = AnnotationStore::new();
        assert!(Reconciler::update(&mut store, &doc("CONFIG_A=y\n"), None, None, None).is_err());
    }
}
