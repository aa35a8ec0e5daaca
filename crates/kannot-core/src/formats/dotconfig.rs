//! # `.config` Export
//!
//! Renders policies as kernel `.config` lines, sorted by symbol:
//! - `n` becomes `# CONFIG_X is not set`
//! - `-` is omitted
//! - anything else becomes `CONFIG_X=value`

use crate::resolver::Resolved;
use crate::{Policy, Symbol};
use std::collections::BTreeMap;

/// Render a symbol → policy mapping.
#[must_use]
pub fn to_config(values: &BTreeMap<Symbol, Policy>) -> String {
    render(values.iter().map(|(symbol, policy)| (symbol, Some(policy))))
}

/// Render resolution results; symbols resolved to no policy are omitted.
#[must_use]
pub fn resolved_to_config(resolved: &BTreeMap<Symbol, Resolved>) -> String {
    render(
        resolved
            .iter()
            .map(|(symbol, record)| (symbol, record.policy.as_ref())),
    )
}

fn render<'a>(values: impl Iterator<Item = (&'a Symbol, Option<&'a Policy>)>) -> String {
    let mut out = String::new();
    for (symbol, policy) in values {
        match policy {
            None | Some(Policy::Undefined) => {}
            Some(Policy::Disabled) => {
                out.push_str(&format!("# {} is not set\n", symbol));
            }
            Some(policy) => {
                out.push_str(&format!("{}={}\n", symbol, policy));
            }
        }
    }
    out
}
