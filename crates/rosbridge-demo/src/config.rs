//! Separation of configuration flags from program arguments.
//!
//! Configuration flags must precede the program name; everything from the
//! first other token onwards belongs to the program parser.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use rosbridge_config::Config;

use crate::cli::CONFIG_FLAGS;
use crate::error::DemoError;

/// Process arguments split between the configuration loader and the
/// program parser. Both halves keep the binary name first.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SplitArguments {
    pub(crate) config: Vec<OsString>,
    pub(crate) program: Vec<OsString>,
}

/// How a leading token is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// A configuration flag, with or without an inline `=value`.
    Flag { inline_value: bool },
    /// The first program token.
    Program,
}

fn classify(argument: &OsStr) -> Token {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_FLAGS.contains(&flag) {
        Token::Flag { inline_value }
    } else {
        Token::Program
    }
}

/// Splits `args` at the first token that is not a configuration flag or
/// its value.
pub(crate) fn split_arguments(args: &[OsString]) -> SplitArguments {
    let mut tokens = args.iter();
    let binary: Vec<OsString> = tokens.next().cloned().into_iter().collect();
    let mut config = binary.clone();
    let mut program = binary;

    while let Some(argument) = tokens.next() {
        match classify(argument) {
            Token::Flag { inline_value } => {
                config.push(argument.clone());
                if !inline_value && let Some(value) = tokens.next() {
                    config.push(value.clone());
                }
            }
            Token::Program => {
                program.push(argument.clone());
                program.extend(tokens.by_ref().cloned());
                break;
            }
        }
    }

    SplitArguments { config, program }
}

/// Resolves configuration from defaults, file, environment, and `args`.
///
/// # Errors
///
/// Returns [`DemoError::Configuration`] when a layer cannot be merged.
pub(crate) fn load(args: Vec<OsString>) -> Result<Config, DemoError> {
    Config::load_from_iter(args).map_err(DemoError::Configuration)
}
