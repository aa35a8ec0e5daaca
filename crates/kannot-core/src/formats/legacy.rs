//! # Legacy Annotations Format
//!
//! The line-oriented text format that predates JSON stores:
//!
//! ```text
//! # Menu: HEADER
//! # FORMAT: 5
//! # ARCH: riscv64
//! # FLAVOUR: generic
//! # FLAVOUR_DEP: true
//!
//! include "../../debian.master/config/annotations"
//!
//! CONFIG_FOO                                      policy<{'*': 'n', 'riscv64': 'y'}>
//! CONFIG_FOO                                      note<'reason'>
//!
//! # ---- Annotations without notes ----
//!
//! CONFIG_BAR                                      policy<'y'>
//! ```
//!
//! Attribute headers are recognized comments; every other comment and blank
//! line is ignored. Several lines may describe the same symbol and are
//! merged. Values are quoted with `'` (or `"`) and escape `\\`, `\'`, `\"`
//! and `\n`.

use crate::primitives::{FORMAT_VERSION, LEGACY_NO_NOTES_MARKER, LEGACY_SYMBOL_WIDTH};
use crate::store::{ScopeTable, StoreAttributes, StoreFormat};
use crate::{AnnotationError, AnnotationStore, Policy, Scope, Symbol};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

static ENTRY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(CONFIG_[A-Za-z0-9_]+)\s+(policy|note)<(.*)>$").expect("static regex is valid")
});

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#\s*(Menu|FORMAT|ARCH|FLAVOUR|FLAVOUR_DEP):\s*(.*)$")
        .expect("static regex is valid")
});

// =============================================================================
// PARSING
// =============================================================================

/// Parse a legacy annotations document. Includes are not followed here.
pub fn parse(text: &str, origin: &str) -> Result<AnnotationStore, AnnotationError> {
    let mut attributes = StoreAttributes::default();
    let mut table = ScopeTable::new();

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let fail = |message: String| AnnotationError::parse(origin, number + 1, message);

        if line.is_empty() {
            continue;
        }

        if line.starts_with('#') {
            if let Some(caps) = HEADER_LINE.captures(line) {
                apply_header(&mut attributes, &caps[1], caps[2].trim()).map_err(fail)?;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("include") {
            if rest.starts_with(char::is_whitespace) {
                let path = unquote_path(rest.trim()).map_err(fail)?;
                attributes.include.push(path);
                continue;
            }
        }

        let caps = ENTRY_LINE
            .captures(line)
            .ok_or_else(|| fail(format!("unknown directive '{}'", line)))?;
        let symbol = Symbol::new(&caps[1]).map_err(|e| fail(e.to_string()))?;
        let values = parse_field(&caps[3]).map_err(fail)?;

        for (scope, value) in values {
            if &caps[2] == "policy" {
                table.set(&symbol, &scope, Some(Policy::parse(&value)), None);
            } else {
                table.set(&symbol, &scope, None, Some(value));
            }
        }
    }

    Ok(AnnotationStore::from_parts(
        attributes,
        StoreFormat::Legacy,
        table,
    ))
}

fn apply_header(
    attributes: &mut StoreAttributes,
    name: &str,
    value: &str,
) -> Result<(), String> {
    match name {
        "FORMAT" => {
            let version: u32 = value
                .parse()
                .map_err(|_| format!("invalid format version '{}'", value))?;
            if version > FORMAT_VERSION {
                return Err(format!(
                    "unsupported format version {} (max {})",
                    version, FORMAT_VERSION
                ));
            }
            attributes.version = version;
        }
        "ARCH" if !value.is_empty() => attributes.arch = Some(value.to_string()),
        "FLAVOUR" if !value.is_empty() => attributes.flavour = Some(value.to_string()),
        "FLAVOUR_DEP" => attributes.flavour_dep = value.eq_ignore_ascii_case("true"),
        _ => {}
    }
    Ok(())
}

fn unquote_path(raw: &str) -> Result<String, String> {
    if raw.starts_with('"') || raw.starts_with('\'') {
        let mut chars = raw.chars().peekable();
        let path = parse_quoted(&mut chars)?;
        if chars.next().is_some() {
            return Err(format!("trailing text after include path '{}'", raw));
        }
        Ok(path)
    } else if raw.is_empty() {
        Err("include without a path".to_string())
    } else {
        Ok(raw.to_string())
    }
}

/// Parse the inside of `policy<...>` / `note<...>`: a quoted value for the
/// global scope, or a `{'scope': 'value', ...}` map.
fn parse_field(raw: &str) -> Result<Vec<(Scope, String)>, String> {
    let mut chars = raw.trim().chars().peekable();
    let values = match chars.peek() {
        Some('{') => {
            chars.next();
            parse_map(&mut chars)?
        }
        Some('\'' | '"') => vec![(Scope::Global, parse_quoted(&mut chars)?)],
        _ => return Err(format!("expected a quoted value or a map, got '{}'", raw)),
    };
    skip_whitespace(&mut chars);
    if chars.next().is_some() {
        return Err(format!("trailing text in '{}'", raw));
    }
    Ok(values)
}

fn parse_map(chars: &mut Peekable<Chars<'_>>) -> Result<Vec<(Scope, String)>, String> {
    let mut values = Vec::new();
    loop {
        skip_whitespace(chars);
        if chars.peek() == Some(&'}') {
            chars.next();
            return Ok(values);
        }

        let key = parse_quoted(chars)?;
        skip_whitespace(chars);
        if chars.next() != Some(':') {
            return Err(format!("expected ':' after '{}'", key));
        }
        skip_whitespace(chars);
        let value = parse_quoted(chars)?;
        let scope = Scope::parse_key(&key).map_err(|e| e.to_string())?;
        values.push((scope, value));

        skip_whitespace(chars);
        match chars.next() {
            Some(',') => {}
            Some('}') => return Ok(values),
            _ => return Err("expected ',' or '}'".to_string()),
        }
    }
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
    let quote = match chars.next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err("expected a quoted string".to_string()),
    };
    let mut value = String::new();
    loop {
        match chars.next() {
            None => return Err("unterminated string".to_string()),
            Some(c) if c == quote => return Ok(value),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(c) => value.push(c),
                None => return Err("unterminated escape".to_string()),
            },
            Some(c) => value.push(c),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

// =============================================================================
// WRITING
// =============================================================================

/// Render the primary layer of `store`. Included layers are never written.
#[must_use]
pub fn write(store: &AnnotationStore) -> String {
    let attributes = store.attributes();
    let mut lines = vec![
        "# Menu: HEADER".to_string(),
        format!("# FORMAT: {}", attributes.version),
    ];
    if let Some(arch) = &attributes.arch {
        lines.push(format!("# ARCH: {}", arch));
    }
    if let Some(flavour) = &attributes.flavour {
        lines.push(format!("# FLAVOUR: {}", flavour));
    }
    if attributes.flavour_dep {
        lines.push("# FLAVOUR_DEP: true".to_string());
    }
    lines.push(String::new());

    if !attributes.include.is_empty() {
        for include in &attributes.include {
            lines.push(format!("include \"{}\"", escape(include, '"')));
        }
        lines.push(String::new());
    }

    let entries = store.local().entries();
    let (with_notes, without_notes): (Vec<_>, Vec<_>) =
        entries.iter().partition(|(_, entry)| entry.has_note());

    for (symbol, entry) in with_notes {
        if !entry.policy.is_empty() {
            lines.push(entry_line(symbol, "policy", &render_policy(&entry.policy)));
        }
        lines.push(entry_line(symbol, "note", &render_field(&entry.note, String::as_str)));
        lines.push(String::new());
    }

    if !without_notes.is_empty() {
        lines.push(LEGACY_NO_NOTES_MARKER.to_string());
        lines.push(String::new());
        for (symbol, entry) in without_notes {
            lines.push(entry_line(symbol, "policy", &render_policy(&entry.policy)));
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Render a policy map the way `policy<...>` lines carry it.
#[must_use]
pub fn render_policy(values: &BTreeMap<Scope, Policy>) -> String {
    render_field(values, Policy::as_str)
}

fn entry_line(symbol: &Symbol, field: &str, value: &str) -> String {
    format!(
        "{:<width$} {}<{}>",
        symbol.as_str(),
        field,
        value,
        width = LEGACY_SYMBOL_WIDTH
    )
}

fn render_field<V>(values: &BTreeMap<Scope, V>, text: fn(&V) -> &str) -> String {
    if let (1, Some(value)) = (values.len(), values.get(&Scope::Global)) {
        return quote(text(value));
    }
    let items: Vec<String> = values
        .iter()
        .map(|(scope, value)| format!("{}: {}", quote(&scope.key()), quote(text(value))))
        .collect();
    format!("{{{}}}", items.join(", "))
}

fn quote(value: &str) -> String {
    format!("'{}'", escape(value, '\''))
}

fn escape(value: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            c if c == quote => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

// =============================================================================
// TESTS
// =============================================================================
