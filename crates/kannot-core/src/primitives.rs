//! # Engine Primitives
//!
//! Hardcoded constants shared by the store, the codecs and the reconciler.
//! These are compiled into the binary and are immutable at runtime.

use crate::Symbol;

/// Prefix every config symbol carries once normalized.
pub const CONFIG_PREFIX: &str = "CONFIG_";

/// Current annotations format version (`_version` in JSON, `# FORMAT:` in
/// the legacy text format).
///
/// Files declaring a newer version are rejected; older versions are loaded
/// and written back with their own number.
pub const FORMAT_VERSION: u32 = 5;

/// Scope key of the global scope.
pub const GLOBAL_SCOPE_KEY: &str = "*";

/// Value meaning "unconstrained / absent".
pub const UNDEFINED_VALUE: &str = "-";

/// Value written as `# CONFIG_X is not set`.
pub const DISABLED_VALUE: &str = "n";

/// Symbols whose value depends on the build environment or toolchain.
///
/// These never take part in consistency checks, whatever the store or the
/// document say about them.
pub const SKIP_CONFIGS: &[&str] = &[
    // Set dynamically during the build
    "CONFIG_VERSION_SIGNATURE",
    // Toolchain versions may legitimately differ between builders
    "CONFIG_GCC_VERSION",
    "CONFIG_CC_VERSION_TEXT",
    "CONFIG_AS_VERSION",
    "CONFIG_LD_VERSION",
    "CONFIG_LLD_VERSION",
    "CONFIG_CLANG_VERSION",
    "CONFIG_PAHOLE_VERSION",
    "CONFIG_RUSTC_VERSION",
    "CONFIG_RUSTC_VERSION_TEXT",
    "CONFIG_BINDGEN_VERSION_TEXT",
    "CONFIG_RUSTC_LLVM_VERSION",
];

/// Whether `symbol` is on the `SKIP_CONFIGS` list.
#[must_use]
pub fn is_skipped(symbol: &Symbol) -> bool {
    SKIP_CONFIGS.contains(&symbol.as_str())
}

// =============================================================================
// LEGACY TEXT FORMAT
// =============================================================================

/// Column width of the symbol field in legacy annotations lines.
pub const LEGACY_SYMBOL_WIDTH: usize = 47;

/// Separator between annotated and plain entries in the legacy format.
pub const LEGACY_NO_NOTES_MARKER: &str = "# ---- Annotations without notes ----";

// =============================================================================
// FILE LOCATIONS & LIMITS
// =============================================================================

/// Annotations file path relative to a packaging directory.
pub const ANNOTATIONS_RELATIVE_PATH: &str = "config/annotations";

/// File naming the packaging directory (`DEBIAN=debian.master`).
pub const DEBIAN_ENV_FILE: &str = "debian/debian.env";

/// Packaging directory tried when nothing else names one.
pub const DEFAULT_DEBIAN_DIR: &str = "debian.master";

/// Maximum include nesting before loading gives up.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Maximum size of an annotations or `.config` file (64 MB).
///
/// Files are read whole; this bounds memory use on a corrupted path.
pub const MAX_INPUT_FILE_SIZE: u64 = 64 * 1024 * 1024;
