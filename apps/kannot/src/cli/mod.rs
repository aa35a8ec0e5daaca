//! # kannot CLI Module
//!
//! Argument parsing and dispatch.
//!
//! Every invocation performs exactly one action, selected by a flag:
//!
//! - `--query` (default) - print what the annotations say
//! - `--note NOTE` - attach a note to a config
//! - `--write` - set (`--value`) or remove (`--value null`) a policy
//! - `--export` - print the resolved scope as a `.config`
//! - `--import FILE` - make a scope describe a `.config` exactly
//! - `--update FILE` - patch a scope from a `.config`
//! - `--check FILE` - compare a `.config` against the annotations
//! - `--autocomplete` - print a bash completion script
//! - `--source` - print where a config is defined
//!
//! Parsed flags are turned once into a closed `Command` plus a `Settings`
//! struct; nothing downstream looks at raw arguments again.

mod commands;
mod complete;

use clap::{ArgGroup, Parser};
use kannot_core::{AnnotationError, Policy, Symbol, locate_annotations};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

pub use commands::*;

/// Value of `--value` that removes an override.
const REMOVE_VALUE: &str = "null";

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kannot - kernel config annotations manager
///
/// Queries and maintains the per-architecture, per-flavour policy recorded
/// for every kernel config symbol, and checks `.config` files against it.
#[derive(Parser, Debug)]
#[command(name = "kannot")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("action").multiple(false)))]
pub struct Cli {
    /// Annotations file (auto-detected from the packaging tree when omitted)
    #[arg(short, long, env = "KANNOT_FILE")]
    pub file: Option<PathBuf>,

    /// Architecture
    #[arg(short, long)]
    pub arch: Option<String>,

    /// Flavour (requires an architecture)
    #[arg(short = 'l', long)]
    pub flavour: Option<String>,

    /// Config symbol(s), comma separated; the CONFIG_ prefix is optional
    #[arg(short, long, value_delimiter = ',')]
    pub config: Vec<String>,

    /// Value to write; `null` removes the override
    #[arg(long)]
    pub value: Option<String>,

    /// Note to attach; alone it is the note action, with --write it is written too
    #[arg(short, long)]
    pub note: Option<String>,

    /// Do not follow include directives
    #[arg(long)]
    pub no_include: bool,

    /// Require the annotations file to be JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Query annotations (default action)
    #[arg(short, long, group = "action")]
    pub query: bool,

    /// Write a value and/or note
    #[arg(short, long, group = "action")]
    pub write: bool,

    /// Export the resolved annotations as a .config
    #[arg(short, long, group = "action")]
    pub export: bool,

    /// Import a .config into the arch/flavour scope
    #[arg(short, long, value_name = "FILE", group = "action")]
    pub import: Option<PathBuf>,

    /// Update the annotations from a .config
    #[arg(short, long, value_name = "FILE", group = "action")]
    pub update: Option<PathBuf>,

    /// Check a .config against the annotations
    #[arg(short = 'k', long, value_name = "FILE", group = "action")]
    pub check: Option<PathBuf>,

    /// Print a bash completion script
    #[arg(long, group = "action")]
    pub autocomplete: bool,

    /// Print the file and line defining a config
    #[arg(short, long, group = "action")]
    pub source: bool,
}

/// What `--write` does to the selected scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteValue {
    /// Leave the policy alone (only a note is written).
    Keep,
    Set(Policy),
    /// Delete the override at the scope.
    Remove,
}

/// The closed set of actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query {
        config: Option<Symbol>,
    },
    Note {
        config: Symbol,
        note: String,
    },
    Write {
        config: Symbol,
        value: WriteValue,
        note: Option<String>,
    },
    Export {
        configs: Vec<Symbol>,
    },
    Import {
        source: PathBuf,
    },
    Update {
        source: PathBuf,
        configs: Option<Vec<Symbol>>,
    },
    Check {
        source: PathBuf,
    },
    Autocomplete,
    Source {
        config: Symbol,
    },
}

impl Cli {
    /// Turn the parsed flags into one `Command`.
    pub fn into_command(&self) -> Result<Command, AnnotationError> {
        let configs = self
            .config
            .iter()
            .map(|name| Symbol::new(name))
            .collect::<Result<Vec<_>, _>>()?;

        if self.note.is_some() && self.has_action() && !self.write {
            return Err(AnnotationError::InvalidArgument(
                "--note can only be combined with --write".to_string(),
            ));
        }
        if self.value.is_some() && !self.write {
            return Err(AnnotationError::InvalidArgument(
                "--value requires --write".to_string(),
            ));
        }

        if self.write {
            let config = single_config(&configs, "--write")?;
            let value = match self.value.as_deref() {
                Some(REMOVE_VALUE) => WriteValue::Remove,
                Some(value) => WriteValue::Set(Policy::parse(value)),
                None if self.note.is_some() => WriteValue::Keep,
                None => {
                    return Err(AnnotationError::InvalidArgument(
                        "--write requires --value and/or --note".to_string(),
                    ));
                }
            };
            return Ok(Command::Write {
                config,
                value,
                note: self.note.clone(),
            });
        }
        if let Some(note) = &self.note {
            return Ok(Command::Note {
                config: single_config(&configs, "--note")?,
                note: note.clone(),
            });
        }
        if self.export {
            return Ok(Command::Export { configs });
        }
        if let Some(source) = &self.import {
            return Ok(Command::Import {
                source: source.clone(),
            });
        }
        if let Some(source) = &self.update {
            return Ok(Command::Update {
                source: source.clone(),
                configs: (!configs.is_empty()).then_some(configs),
            });
        }
        if let Some(source) = &self.check {
            return Ok(Command::Check {
                source: source.clone(),
            });
        }
        if self.autocomplete {
            return Ok(Command::Autocomplete);
        }
        if self.source {
            return Ok(Command::Source {
                config: single_config(&configs, "--source")?,
            });
        }

        if configs.len() > 1 {
            return Err(AnnotationError::InvalidArgument(
                "--query takes at most one --config".to_string(),
            ));
        }
        Ok(Command::Query {
            config: configs.into_iter().next(),
        })
    }

    fn has_action(&self) -> bool {
        self.query
            || self.write
            || self.export
            || self.import.is_some()
            || self.update.is_some()
            || self.check.is_some()
            || self.autocomplete
            || self.source
    }
}

fn single_config(configs: &[Symbol], action: &str) -> Result<Symbol, AnnotationError> {
    match configs {
        [config] => Ok(config.clone()),
        _ => Err(AnnotationError::InvalidArgument(format!(
            "{} requires exactly one --config",
            action
        ))),
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Everything a command needs besides the command itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// `--file`, if given.
    pub file: Option<PathBuf>,
    /// `$DEBIAN`, used for auto-detection.
    pub debian: Option<String>,
    /// Directory auto-detection starts from.
    pub root: PathBuf,
    pub arch: Option<String>,
    pub flavour: Option<String>,
    /// Follow include directives.
    pub include: bool,
    /// Require JSON annotations.
    pub strict_json: bool,
}

impl Settings {
    /// Collect settings from parsed flags and the environment.
    pub fn from_cli(cli: &Cli, debian: Option<String>, root: PathBuf) -> Self {
        Self {
            file: cli.file.clone(),
            debian,
            root,
            arch: cli.arch.clone(),
            flavour: cli.flavour.clone(),
            include: !cli.no_include,
            strict_json: cli.json,
        }
    }

    /// The annotations file to operate on.
    pub fn annotations_path(&self) -> Result<PathBuf, AnnotationError> {
        locate_annotations(self.file.as_deref(), self.debian.as_deref(), &self.root)
    }

    /// Directory auto-detection starts from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Run one command. Returns the process exit code.
///
/// Completion works without an annotations file; every other action needs
/// one and fails when it cannot be found.
pub fn execute(command: Command, settings: &Settings) -> Result<ExitCode, AnnotationError> {
    let annotations = || {
        let path = settings.annotations_path()?;
        tracing::debug!(path = %path.display(), root = %settings.root().display(), "using annotations");
        Ok::<_, AnnotationError>(path)
    };

    match command {
        Command::Autocomplete => {
            let path = settings.annotations_path().ok();
            print!("{}", complete::bash_script(path.as_deref()));
            Ok(ExitCode::SUCCESS)
        }
        Command::Query { config } => cmd_query(&annotations()?, settings, config.as_ref()),
        Command::Note { config, note } => cmd_note(&annotations()?, settings, &config, note),
        Command::Write {
            config,
            value,
            note,
        } => cmd_write(&annotations()?, settings, &config, value, note),
        Command::Export { configs } => cmd_export(&annotations()?, settings, &configs),
        Command::Import { source } => cmd_import(&annotations()?, settings, &source),
        Command::Update { source, configs } => {
            cmd_update(&annotations()?, settings, &source, configs.as_deref())
        }
        Command::Check { source } => cmd_check(&annotations()?, settings, &source),
        Command::Source { config } => cmd_source(&annotations()?, settings, &config),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, AnnotationError> {
        let mut argv = vec!["kannot"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("clap").into_command()
    }

    fn sym(name: &str) -> Symbol {
        Symbol::new(name).expect("symbol")
    }

    #[test]
    fn query_is_the_default() {
        assert_eq!(parse(&[]).expect("cmd"), Command::Query { config: None });
        assert_eq!(
            parse(&["-c", "FOO"]).expect("cmd"),
            Command::Query {
                config: Some(sym("FOO"))
            }
        );
    }

    #[test]
    fn note_alone_is_the_note_action() {
        assert_eq!(
            parse(&["--config", "CONFIG_FOO", "--note", "why"]).expect("cmd"),
            Command::Note {
                config: sym("FOO"),
                note: "why".to_string()
            }
        );
    }

    #[test]
    fn write_value_and_note() {
        assert_eq!(
            parse(&["-c", "FOO", "--write", "--value", "m", "--note", "why"]).expect("cmd"),
            Command::Write {
                config: sym("FOO"),
                value: WriteValue::Set(Policy::Module),
                note: Some("why".to_string())
            }
        );
        assert_eq!(
            parse(&["-c", "FOO", "-w", "--value", "null"]).expect("cmd"),
            Command::Write {
                config: sym("FOO"),
                value: WriteValue::Remove,
                note: None
            }
        );
    }

    #[test]
    fn write_needs_something_to_write() {
        assert!(parse(&["-c", "FOO", "--write"]).is_err());
        assert!(parse(&["--write", "--value", "y"]).is_err());
    }

    #[test]
    fn note_with_other_action_is_rejected() {
        assert!(parse(&["-c", "FOO", "--export", "--note", "x"]).is_err());
        assert!(parse(&["-c", "FOO", "--value", "y"]).is_err());
    }

    #[test]
    fn actions_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["kannot", "--export", "--query"]).expect_err("conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn configs_split_on_commas() {
        assert_eq!(
            parse(&["--update", "x.config", "-c", "A,CONFIG_B"]).expect("cmd"),
            Command::Update {
                source: PathBuf::from("x.config"),
                configs: Some(vec![sym("A"), sym("B")])
            }
        );
        assert_eq!(
            parse(&["--update", "x.config"]).expect("cmd"),
            Command::Update {
                source: PathBuf::from("x.config"),
                configs: None
            }
        );
    }

    #[test]
    fn settings_follow_flags() {
        let cli = Cli::try_parse_from(["kannot", "-a", "amd64", "--no-include", "--json"])
            .expect("clap");
        let settings = Settings::from_cli(&cli, None, PathBuf::from("."));
        assert_eq!(settings.arch.as_deref(), Some("amd64"));
        assert!(!settings.include);
        assert!(settings.strict_json);
    }
}
