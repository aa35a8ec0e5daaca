//! # Formats Module
//!
//! Pure text codecs; no file I/O happens here.
//!
//! - `json`: the annotations store as JSON (current format)
//! - `legacy`: the line-oriented annotations text format
//! - `dotconfig`: resolved policies rendered as a kernel `.config`

pub mod dotconfig;
pub mod json;
pub mod legacy;

pub use dotconfig::{resolved_to_config, to_config};
pub use json::{search_to_json, store_from_json, store_to_json};
