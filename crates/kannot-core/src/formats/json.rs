//! # JSON Store Format
//!
//! ```text
//! {
//!     "attributes": {"arch": .., "flavour": .., "flavour_dep": .., "include": [..], "_version": 5},
//!     "config": {
//!         "CONFIG_X": {"policy": {"*": "n", "riscv64": "y"}, "note": "reason"}
//!     }
//! }
//! ```
//!
//! A field set only at the global scope is written as a bare string; any
//! other field is an object keyed by scope key. Entries carrying a note are
//! written first, then the rest, each group in symbol order. Output uses
//! four-space indentation and ends with a newline, so saving an unchanged
//! store reproduces it byte for byte.

use crate::primitives::FORMAT_VERSION;
use crate::resolver::SearchResult;
use crate::store::{ScopeTable, StoreAttributes, StoreFormat};
use crate::{AnnotationError, AnnotationStore, Policy, Scope, ScopedEntry, Symbol};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    attributes: RawAttributes,
    #[serde(default)]
    config: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawAttributes {
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    flavour: Option<String>,
    #[serde(default)]
    flavour_dep: bool,
    #[serde(default)]
    include: Vec<String>,
    #[serde(rename = "_version", default = "current_version")]
    version: u32,
}

impl Default for RawAttributes {
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

fn current_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    policy: Option<RawField>,
    #[serde(default)]
    note: Option<RawField>,
}

/// Either a bare global value or a scope-keyed object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawField {
    Global(String),
    Scoped(BTreeMap<String, String>),
}

impl RawField {
    fn into_scoped(self) -> Result<Vec<(Scope, String)>, AnnotationError> {
        match self {
            Self::Global(value) => Ok(vec![(Scope::Global, value)]),
            Self::Scoped(values) => values
                .into_iter()
                .map(|(key, value)| Ok((Scope::parse_key(&key)?, value)))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct OutDocument<'a> {
    attributes: OutAttributes<'a>,
    config: OrderedMap<OutEntry>,
}

#[derive(Serialize)]
struct OutAttributes<'a> {
    arch: Option<&'a str>,
    flavour: Option<&'a str>,
    flavour_dep: bool,
    include: &'a [String],
    #[serde(rename = "_version")]
    version: u32,
}

#[derive(Serialize)]
struct OutEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<OutField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<OutField>,
}

/// A field as written: bare string for global-only, else keyed by scope.
enum OutField {
    Global(String),
    Scoped(OrderedMap<String>),
}

impl Serialize for OutField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Global(value) => serializer.serialize_str(value),
            Self::Scoped(values) => values.serialize(serializer),
        }
    }
}

/// A JSON object whose key order is fixed by construction.
struct OrderedMap<V>(Vec<(String, V)>);

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Decode a JSON annotations document. Includes are not followed here.
pub fn store_from_json(text: &str, origin: &str) -> Result<AnnotationStore, AnnotationError> {
    let raw: RawDocument = serde_json::from_str(text)
        .map_err(|e| AnnotationError::parse(origin, e.line(), e.to_string()))?;

    if raw.attributes.version > FORMAT_VERSION {
        return Err(AnnotationError::parse(
            origin,
            1,
            format!(
                "unsupported format version {} (max {})",
                raw.attributes.version, FORMAT_VERSION
            ),
        ));
    }

    let mut table = ScopeTable::new();
    for (name, entry) in raw.config {
        let symbol = Symbol::new(&name)
            .map_err(|e| AnnotationError::parse(origin, line_of(text, &name), e.to_string()))?;
        let in_origin = |e: AnnotationError| {
            AnnotationError::parse(origin, line_of(text, &name), e.to_string())
        };

        if let Some(policy) = entry.policy {
            for (scope, value) in policy.into_scoped().map_err(in_origin)? {
                table.set(&symbol, &scope, Some(Policy::parse(&value)), None);
            }
        }
        if let Some(note) = entry.note {
            for (scope, value) in note.into_scoped().map_err(in_origin)? {
                table.set(&symbol, &scope, None, Some(value));
            }
        }
    }

    let attributes = StoreAttributes {
        arch: raw.attributes.arch,
        flavour: raw.attributes.flavour,
        flavour_dep: raw.attributes.flavour_dep,
        include: raw.attributes.include,
        version: raw.attributes.version,
    };
    Ok(AnnotationStore::from_parts(attributes, StoreFormat::Json, table))
}

fn line_of(text: &str, key: &str) -> usize {
    let quoted = format!("\"{}\"", key);
    text.lines()
        .position(|line| line.contains(&quoted))
        .map_or(1, |index| index + 1)
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode the primary layer of `store`. Included layers are never written.
pub fn store_to_json(store: &AnnotationStore) -> Result<String, AnnotationError> {
    let attributes = store.attributes();
    let entries = store.local().entries();

    let (with_notes, without_notes): (Vec<_>, Vec<_>) =
        entries.iter().partition(|(_, entry)| entry.has_note());
    let config = with_notes
        .into_iter()
        .chain(without_notes)
        .map(|(symbol, entry)| (symbol.to_string(), encode_entry(entry)))
        .collect();

    let document = OutDocument {
        attributes: OutAttributes {
            arch: attributes.arch.as_deref(),
            flavour: attributes.flavour.as_deref(),
            flavour_dep: attributes.flavour_dep,
            include: &attributes.include,
            version: attributes.version,
        },
        config: OrderedMap(config),
    };
    to_pretty(&document)
}

/// Encode a query result, symbols in order.
pub fn search_to_json(result: &SearchResult) -> Result<String, AnnotationError> {
    let map = OrderedMap(
        result
            .iter()
            .map(|(symbol, entry)| (symbol.to_string(), encode_entry(entry)))
            .collect(),
    );
    to_pretty(&map)
}

fn encode_entry(entry: &ScopedEntry) -> OutEntry {
    OutEntry {
        policy: encode_field(&entry.policy, Policy::as_str),
        note: encode_field(&entry.note, String::as_str),
    }
}

fn encode_field<V>(values: &BTreeMap<Scope, V>, text: fn(&V) -> &str) -> Option<OutField> {
    match values.iter().next() {
        None => None,
        Some((Scope::Global, value)) if values.len() == 1 => {
            Some(OutField::Global(text(value).to_string()))
        }
        Some(_) => Some(OutField::Scoped(OrderedMap(
            values
                .iter()
                .map(|(scope, value)| (scope.key(), text(value).to_string()))
                .collect(),
        ))),
    }
}

fn to_pretty<T: Serialize>(value: &T) -> Result<String, AnnotationError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| AnnotationError::Serialization(e.to_string()))?;
    let mut text =
        String::from_utf8(buffer).map_err(|e| AnnotationError::Serialization(e.to_string()))?;
    text.push('\n');
    Ok(text)
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

    const SAMPLE: &str = r#"{
    "attributes": {
        "arch": "riscv64",
        "flavour": "generic",
        "flavour_dep": true,
        "include": [
            "../base/annotations"
        ],
        "_version": 5
    },
    "config": {
        "CONFIG_ZED": {
            "policy": "y",
            "note": "kept first"
        },
        "CONFIG_ALPHA": {
            "policy": {
                "*": "n",
                "riscv64": "y",
                "riscv64-generic": "m"
            }
        },
        "CONFIG_BETA": {
            "policy": "\"lz4\""
        }
    }
}
"#;

    #[test]
    fn decodes_attributes_and_scopes() {
        let store = store_from_json(SAMPLE, "sample").expect("decode");
        let attributes = store.attributes();
        assert_eq!(attributes.arch.as_deref(), Some("riscv64"));
        assert!(attributes.flavour_dep);
        assert_eq!(attributes.include, vec!["../base/annotations".to_string()]);

        let alpha = store
            .entry(&sym("ALPHA"), &Scope::parse_key("riscv64-generic").expect("scope"))
            .expect("alpha");
        assert_eq!(alpha.policy, Some(Policy::Module));
        let beta = store.entry(&sym("BETA"), &Scope::Global).expect("beta");
        assert_eq!(beta.policy, Some(Policy::Literal("\"lz4\"".to_string())));
    }

    #[test]
    fn encoding_is_a_fixed_point() {
        let store = store_from_json(SAMPLE, "sample").expect("decode");
        let text = store_to_json(&store).expect("encode");
        assert_eq!(text, SAMPLE);
    }

    #[test]
    fn unset_qualifiers_are_written_as_null() {
        let text = r#"{
    "attributes": {
        "arch": null,
        "flavour": null,
        "flavour_dep": false,
        "include": [],
        "_version": 5
    },
    "config": {
        "CONFIG_A": {
            "policy": "y"
        }
    }
}
"#;
        let store = store_from_json(text, "null").expect("decode");
        assert_eq!(store.attributes().arch, None);
        assert_eq!(store_to_json(&store).expect("encode"), text);

        let empty = store_to_json(&AnnotationStore::new()).expect("encode");
        let value: serde_json::Value = serde_json::from_str(&empty).expect("json");
        assert_eq!(value["attributes"]["arch"], serde_json::Value::Null);
        assert_eq!(value["attributes"]["flavour"], serde_json::Value::Null);
    }

    #[test]
    fn noted_entries_come_first() {
        let mut store = AnnotationStore::new();
        store.set(&sym("AAA"), &Scope::Global, Some(Policy::Builtin), None);
        store.set(&sym("ZZZ"), &Scope::Global, Some(Policy::Builtin), Some("n".to_string()));

        let text = store_to_json(&store).expect("encode");
        let zzz = text.find("CONFIG_ZZZ").expect("zzz");
        let aaa = text.find("CONFIG_AAA").expect("aaa");
        assert!(zzz < aaa);
    }

    #[test]
    fn newer_version_is_rejected() {
        let err = store_from_json(r#"{"attributes": {"_version": 99}}"#, "new")
            .expect_err("too new");
        assert!(matches!(err, AnnotationError::Parse { .. }));
    }

    #[test]
    fn syntax_error_carries_line() {
        let err = store_from_json("{\n  \"config\": {\n    oops\n}", "bad.json").expect_err("bad");
        match err {
            AnnotationError::Parse { origin, line, .. } => {
                assert_eq!(origin, "bad.json");
                assert_eq!(line, 3);
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_scope_key_is_a_parse_error() {
        let err = store_from_json(
            r#"{"config": {"CONFIG_A": {"policy": {"": "y"}}}}"#,
            "bad",
        )
        .expect_err("bad key");
        assert!(matches!(err, AnnotationError::Parse { .. }));
    }

    #[test]
    fn search_result_shape() {
        let mut store = AnnotationStore::new();
        store.set(&sym("FOO"), &Scope::Global, Some(Policy::Builtin), None);
        let result = store.search_config(None, None, None).expect("search");

        let value: serde_json::Value =
            serde_json::from_str(&search_to_json(&result).expect("encode")).expect("json");
        assert_eq!(value, serde_json::json!({"CONFIG_FOO": {"policy": "y"}}));
    }
}
