//! # kannot - kernel config annotations
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              apps/kannot (THE BINARY)         │
//! │                                               │
//! │   ┌──────────────┐      ┌──────────────────┐  │
//! │   │     CLI      │ ───▶ │ Settings+Command │  │
//! │   │   (clap)     │      └────────┬─────────┘  │
//! │   └──────────────┘               ▼            │
//! │                         ┌──────────────────┐  │
//! │                         │   kannot-core    │  │
//! │                         │   (THE ENGINE)   │  │
//! │                         └──────────────────┘  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # What does the tree say about CONFIG_EXT4_FS?
//! kannot --config EXT4_FS
//!
//! # Verify a build
//! kannot --arch amd64 --flavour generic --check build/.config
//!
//! # Record a new policy with its justification
//! kannot -c DEBUG_INFO --write --value y --note "needed for crash dumps"
//! ```

use clap::Parser;
use kannot::cli::{self, Cli, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_cli(&cli, std::env::var("DEBIAN").ok(), PathBuf::from("."));
    let result = cli
        .into_command()
        .and_then(|command| cli::execute(command, &settings));

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. KANNOT_LOG_FORMAT=json enables machine-parseable output.
fn init_tracing(verbose: bool) {
    let log_format = std::env::var("KANNOT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if verbose {
        "kannot=debug"
    } else {
        "kannot=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
