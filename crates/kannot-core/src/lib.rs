//! # kannot-core
//!
//! The deterministic annotation engine for kannot.
//!
//! An annotations store records, for every kernel config symbol, the policy
//! it must have and an optional note explaining it. Records live at one of
//! three scopes: global, one architecture, or one flavour of one
//! architecture. This crate loads such stores, resolves what they require at
//! a given scope, and reconciles them against concrete `.config` files.
//!
//! ## Module Map
//!
//! - `types`: `Symbol`, `Policy`, `Scope`, `Annotation`, `AnnotationError`
//! - `store`: the layered `AnnotationStore`
//! - `resolver`: the global → arch → flavour override walk and queries
//! - `reconcile`: check / import / update against a `ConfigDocument`
//! - `kconfig`: the `.config` parser
//! - `formats`: JSON, legacy text and `.config` codecs
//! - `storage`: file loading with includes, and annotations discovery
//!
//! ## Architectural Constraints
//!
//! - No async, no network, no logging: callers decide what to report
//! - Deterministic: `BTreeMap`/`BTreeSet` only, so every output is stable
//! - Persistence happens only on an explicit `save`

// =============================================================================
// MODULES
// =============================================================================

pub mod formats;
pub mod kconfig;
pub mod primitives;
pub mod query;
pub mod reconcile;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Annotation, AnnotationError, Policy, Scope, ScopedEntry, Symbol};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use kconfig::ConfigDocument;
pub use query::Query;
pub use reconcile::{CheckReport, Mismatch, Reconciler};
pub use resolver::{Resolved, Resolver, SearchResult};
pub use store::{AnnotationStore, ScopeTable, SourceLocation, StoreAttributes, StoreFormat};

// =============================================================================
// RE-EXPORTS: Formats and Storage
// =============================================================================

pub use formats::{resolved_to_config, search_to_json, store_from_json, store_to_json, to_config};
pub use storage::{LoadOptions, locate_annotations};
