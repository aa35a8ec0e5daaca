//! # Property-Based Tests
//!
//! Invariants of resolution, the codecs and reconciliation, checked over
//! randomly generated stores and `.config` documents.

use kannot_core::formats::legacy;
use kannot_core::{
    AnnotationStore, ConfigDocument, Policy, Reconciler, Resolver, Scope, Symbol,
    store_from_json, store_to_json,
};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::select;

// =============================================================================
// STRATEGIES
// =============================================================================

const NAMES: &[&str] = &["A", "B", "C", "DEBUG_INFO", "EXT4_FS"];
const ARCHES: &[&str] = &["amd64", "arm64"];
const FLAVOURS: &[&str] = &["generic", "lowlatency"];

fn symbol() -> impl Strategy<Value = Symbol> {
    select(NAMES).prop_map(|name| Symbol::new(name).expect("symbol"))
}

fn scope() -> impl Strategy<Value = Scope> {
    prop_oneof![
        Just(Scope::Global),
        select(ARCHES).prop_map(|arch| Scope::Arch(arch.to_string())),
        (select(ARCHES), select(FLAVOURS)).prop_map(|(arch, flavour)| Scope::Flavour {
            arch: arch.to_string(),
            flavour: flavour.to_string(),
        }),
    ]
}

fn policy() -> impl Strategy<Value = Policy> {
    select(vec!["y", "m", "n", "-", "\"lz4\"", "0x1000", "250"]).prop_map(Policy::parse)
}

fn config_value() -> impl Strategy<Value = &'static str> {
    select(vec!["y", "m", "n", "\"lz4\"", "250"])
}

fn note() -> impl Strategy<Value = String> {
    select(vec!["", "required", "it's \"quoted\"", "two\nlines", "back\\slash"])
        .prop_map(str::to_string)
}

type Record = (Symbol, Scope, Option<Policy>, Option<String>);

fn records() -> impl Strategy<Value = Vec<Record>> {
    vec(
        (symbol(), scope(), proptest::option::of(policy()), proptest::option::of(note())),
        0..24,
    )
}

fn build_store(records: &[Record]) -> AnnotationStore {
    let mut store = AnnotationStore::new();
    for (symbol, scope, policy, note) in records {
        store.set(symbol, scope, policy.clone(), note.clone());
    }
    store
}

fn document() -> impl Strategy<Value = ConfigDocument> {
    vec((symbol(), config_value()), 0..8).prop_map(|entries| {
        let mut document = ConfigDocument::new();
        for (symbol, value) in entries {
            document.insert(symbol, value);
        }
        document
    })
}

fn all_scopes() -> Vec<Scope> {
    let mut scopes = vec![Scope::Global];
    for arch in ARCHES {
        scopes.push(Scope::Arch((*arch).to_string()));
        for flavour in FLAVOURS {
            scopes.push(Scope::Flavour {
                arch: (*arch).to_string(),
                flavour: (*flavour).to_string(),
            });
        }
    }
    scopes
}

fn resolved_policy(store: &AnnotationStore, symbol: &Symbol, scope: &Scope) -> Option<Policy> {
    Resolver::new(store)
        .resolve(symbol, scope)
        .expect("resolve")
        .and_then(|resolved| resolved.policy)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The most specific scope defining a policy decides the resolved policy.
    #[test]
    fn resolution_is_monotonic(records in records(), symbol in symbol()) {
        let store = build_store(&records);

        for scope in all_scopes() {
            let expected = scope
                .chain()
                .iter()
                .rev()
                .find_map(|step| store.entry(&symbol, step).and_then(|r| r.policy));
            prop_assert_eq!(resolved_policy(&store, &symbol, &scope), expected);
        }
    }

    /// JSON decode(encode(store)) reproduces the store and the same text.
    #[test]
    fn json_roundtrip_is_a_fixed_point(records in records()) {
        let store = build_store(&records);

        let text = store_to_json(&store).expect("encode");
        let decoded = store_from_json(&text, "roundtrip").expect("decode");

        prop_assert_eq!(decoded.local(), store.local());
        prop_assert_eq!(store_to_json(&decoded).expect("encode"), text);
    }

    /// Legacy parse(write(store)) reproduces the store and the same text.
    #[test]
    fn legacy_roundtrip_is_a_fixed_point(records in records()) {
        let store = build_store(&records);

        let text = legacy::write(&store);
        let decoded = legacy::parse(&text, "roundtrip").expect("parse");

        prop_assert_eq!(decoded.local(), store.local());
        prop_assert_eq!(decoded.attributes(), store.attributes());
        prop_assert_eq!(legacy::write(&decoded), text);
    }

    /// Importing a document and checking against it finds no mismatch.
    #[test]
    fn import_then_check_is_clean(records in records(), document in document()) {
        let mut store = build_store(&records);

        Reconciler::import(&mut store, &document, Some("amd64"), Some("generic"))
            .expect("import");
        let report = Reconciler::check(&store, &document, &Scope::Flavour {
            arch: "amd64".to_string(),
            flavour: "generic".to_string(),
        })
        .expect("check");

        prop_assert!(report.is_clean(), "mismatches: {:?}", report.mismatches);
    }

    /// Updating a subset leaves every other symbol resolving as before.
    #[test]
    fn update_is_non_destructive(
        records in records(),
        document in document(),
        patch in vec(symbol(), 0..3),
    ) {
        let mut store = build_store(&records);
        let before = store.clone();

        Reconciler::update(&mut store, &document, Some("arm64"), None, Some(patch.as_slice()))
            .expect("update");

        for name in NAMES {
            let symbol = Symbol::new(name).expect("symbol");
            if patch.contains(&symbol) {
                continue;
            }
            for scope in all_scopes() {
                prop_assert_eq!(
                    resolved_policy(&store, &symbol, &scope),
                    resolved_policy(&before, &symbol, &scope)
                );
            }
        }
    }

    /// Removing twice is the same as removing once.
    #[test]
    fn removal_is_idempotent(records in records(), symbol in symbol(), scope in scope()) {
        let mut store = build_store(&records);

        store.remove(&symbol, &scope);
        let once = store.clone();
        store.remove(&symbol, &scope);

        prop_assert_eq!(store, once);
    }
}
