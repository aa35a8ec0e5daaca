//! # CLI Command Implementations
//!
//! One function per action. Each loads the store, runs one engine
//! operation, prints its result and, for mutating actions, saves the store
//! once every change has been applied.

use super::{Settings, WriteValue};
use kannot_core::formats::legacy::render_policy;
use kannot_core::{
    AnnotationError, AnnotationStore, ConfigDocument, Reconciler, Resolver, Scope, Symbol,
    resolved_to_config, search_to_json,
};
use std::path::Path;
use std::process::ExitCode;

// =============================================================================
// HELPERS
// =============================================================================

fn load_store(path: &Path, settings: &Settings) -> Result<AnnotationStore, AnnotationError> {
    let store = AnnotationStore::load(path, settings.include, settings.strict_json)?;
    tracing::debug!(
        path = %path.display(),
        symbols = store.symbols().len(),
        includes = store.attributes().include.len(),
        "loaded annotations"
    );
    Ok(store)
}

fn save_store(store: &AnnotationStore, path: &Path) -> Result<(), AnnotationError> {
    store.save(path)?;
    tracing::info!(path = %path.display(), "saved annotations");
    Ok(())
}

/// Arch and flavour from the flags, falling back to the store's attributes.
fn qualifiers(settings: &Settings, store: &AnnotationStore) -> (Option<String>, Option<String>) {
    let attributes = store.attributes();
    (
        settings.arch.clone().or_else(|| attributes.arch.clone()),
        settings.flavour.clone().or_else(|| attributes.flavour.clone()),
    )
}

fn target_scope(settings: &Settings, store: &AnnotationStore) -> Result<Scope, AnnotationError> {
    let (arch, flavour) = qualifiers(settings, store);
    Scope::new(arch.as_deref(), flavour.as_deref())
}

fn load_document(source: &Path) -> Result<ConfigDocument, AnnotationError> {
    let document = ConfigDocument::load(source)?;
    tracing::debug!(path = %source.display(), symbols = document.len(), "loaded config");
    Ok(document)
}

// =============================================================================
// READ-ONLY COMMANDS
// =============================================================================

/// Print the annotations matching the query as JSON.
pub fn cmd_query(
    path: &Path,
    settings: &Settings,
    config: Option<&Symbol>,
) -> Result<ExitCode, AnnotationError> {
    let store = load_store(path, settings)?;
    let (arch, flavour) = qualifiers(settings, &store);

    let result = store.search_config(config, arch.as_deref(), flavour.as_deref())?;
    print!("{}", search_to_json(&result)?);
    Ok(ExitCode::SUCCESS)
}

/// Print the resolved scope as a `.config`.
pub fn cmd_export(
    path: &Path,
    settings: &Settings,
    configs: &[Symbol],
) -> Result<ExitCode, AnnotationError> {
    let store = load_store(path, settings)?;
    let scope = target_scope(settings, &store)?;

    let mut resolved = Resolver::new(&store).resolve_all(&scope)?;
    if !configs.is_empty() {
        resolved.retain(|symbol, _| configs.contains(symbol));
    }
    print!("{}", resolved_to_config(&resolved));
    Ok(ExitCode::SUCCESS)
}

/// Compare a `.config` against the annotations. Exits 1 on any mismatch.
pub fn cmd_check(
    path: &Path,
    settings: &Settings,
    source: &Path,
) -> Result<ExitCode, AnnotationError> {
    let store = load_store(path, settings)?;
    let document = load_document(source)?;
    let scope = target_scope(settings, &store)?;

    let report = Reconciler::check(&store, &document, &scope)?;
    for mismatch in &report.mismatches {
        println!(
            "check-config: {} changed from {} to {}: policy<{}>",
            mismatch.symbol,
            mismatch.expected,
            mismatch.actual,
            render_policy(&mismatch.declared)
        );
    }
    println!(
        "check-config: {} changed of {}",
        report.changed(),
        report.total
    );
    tracing::info!(
        scope = %scope,
        changed = report.changed(),
        total = report.total,
        "check finished"
    );

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Print `path:line` of the config's first definition.
pub fn cmd_source(
    path: &Path,
    settings: &Settings,
    config: &Symbol,
) -> Result<ExitCode, AnnotationError> {
    let store = load_store(path, settings)?;
    let location = store.location(config).ok_or_else(|| {
        AnnotationError::InvalidArgument(format!("{} is not defined in {}", config, path.display()))
    })?;
    println!("{}:{}", location.path.display(), location.line);
    Ok(ExitCode::SUCCESS)
}

// =============================================================================
// MUTATING COMMANDS
// =============================================================================

/// Attach a note to a config at the selected scope.
pub fn cmd_note(
    path: &Path,
    settings: &Settings,
    config: &Symbol,
    note: String,
) -> Result<ExitCode, AnnotationError> {
    let mut store = load_store(path, settings)?;
    let scope = target_scope(settings, &store)?;

    store.set(config, &scope, None, Some(note));
    save_store(&store, path)?;
    Ok(ExitCode::SUCCESS)
}

/// Set or remove a config's policy at the selected scope.
pub fn cmd_write(
    path: &Path,
    settings: &Settings,
    config: &Symbol,
    value: WriteValue,
    note: Option<String>,
) -> Result<ExitCode, AnnotationError> {
    let mut store = load_store(path, settings)?;
    let scope = target_scope(settings, &store)?;

    match value {
        WriteValue::Remove => {
            store.remove(config, &scope);
            store.set(config, &scope, None, note);
        }
        WriteValue::Set(policy) => store.set(config, &scope, Some(policy), note),
        WriteValue::Keep => store.set(config, &scope, None, note),
    }
    tracing::debug!(config = %config, scope = %scope, "wrote annotation");

    save_store(&store, path)?;
    Ok(ExitCode::SUCCESS)
}

/// Replace the arch/flavour scope with a `.config`.
pub fn cmd_import(
    path: &Path,
    settings: &Settings,
    source: &Path,
) -> Result<ExitCode, AnnotationError> {
    let mut store = load_store(path, settings)?;
    let document = load_document(source)?;
    let (arch, flavour) = qualifiers(settings, &store);

    let changed = Reconciler::import(&mut store, &document, arch.as_deref(), flavour.as_deref())?;
    tracing::info!(changed, "imported config");

    save_store(&store, path)?;
    Ok(ExitCode::SUCCESS)
}

/// Patch the selected scope from a `.config`.
pub fn cmd_update(
    path: &Path,
    settings: &Settings,
    source: &Path,
    configs: Option<&[Symbol]>,
) -> Result<ExitCode, AnnotationError> {
    let mut store = load_store(path, settings)?;
    let document = load_document(source)?;
    let (arch, flavour) = qualifiers(settings, &store);

    let changed = Reconciler::update(
        &mut store,
        &document,
        arch.as_deref(),
        flavour.as_deref(),
        configs,
    )?;
    tracing::info!(changed, "updated config");

    save_store(&store, path)?;
    Ok(ExitCode::SUCCESS)
}
