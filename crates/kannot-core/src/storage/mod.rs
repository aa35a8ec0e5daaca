//! # Storage Module
//!
//! File-backed loading and saving of annotation stores.
//!
//! - `file`: read/write with format sniffing and include resolution
//! - `discovery`: locating the annotations file of a kernel tree

pub mod discovery;
pub mod file;

pub use discovery::locate_annotations;
pub use file::{LoadOptions, load_store, read_text, save_store, write_text};
