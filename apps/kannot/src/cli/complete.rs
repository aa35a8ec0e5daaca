//! # Bash Completion
//!
//! Builds the `--autocomplete` script from the clap definition, so new
//! flags are picked up without touching this file. Config names are read
//! from the annotations file each time completion runs.

use super::Cli;
use clap::CommandFactory;
use std::path::Path;

/// Fallback annotations path when none can be detected.
const DEFAULT_ANNOTATIONS: &str = "debian.master/config/annotations";

/// Render the completion script.
pub fn bash_script(annotations: Option<&Path>) -> String {
    let command = Cli::command();

    let mut flags = Vec::new();
    let mut file_flags = Vec::new();
    for arg in command.get_arguments() {
        let takes_file = arg
            .get_value_names()
            .is_some_and(|names| names.iter().any(|name| name.to_string() == "FILE"));
        if let Some(short) = arg.get_short() {
            if takes_file {
                file_flags.push(format!("-{}", short));
            }
        }
        if let Some(long) = arg.get_long() {
            flags.push(format!("--{}", long));
            if takes_file {
                file_flags.push(format!("--{}", long));
            }
        }
    }
    flags.push("--help".to_string());
    flags.push("--version".to_string());

    let annotations = annotations.map_or_else(
        || DEFAULT_ANNOTATIONS.to_string(),
        |path| path.display().to_string(),
    );

    format!(
        r#"# bash completion for kannot
_kannot() {{
    local cur="${{COMP_WORDS[COMP_CWORD]}}"
    local prev="${{COMP_WORDS[COMP_CWORD-1]}}"
    case "${{prev}}" in
        -c|--config)
            COMPREPLY=($(compgen -W "$(grep -oE 'CONFIG_[A-Za-z0-9_]+' {annotations} 2>/dev/null | sort -u)" -- "${{cur}}"))
            return 0
            ;;
        {file_flags})
            COMPREPLY=($(compgen -f -- "${{cur}}"))
            return 0
            ;;
    esac
    COMPREPLY=($(compgen -W "{flags}" -- "${{cur}}"))
}}
complete -F _kannot kannot
"#,
        annotations = shell_quote(&annotations),
        file_flags = file_flags.join("|"),
        flags = flags.join(" "),
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
