//! # kannot
//!
//! Command line driver for the kannot annotation engine.
//!
//! The binary in `main.rs` only sets up logging and hands over to `cli`;
//! everything else lives here so it can be tested in-process.

pub mod cli;
