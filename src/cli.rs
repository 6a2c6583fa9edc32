// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Flags override the `[options]` of a config file; positional commands are
//! added after the config file's `[[command]]` entries.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::PrefixAlign;

/// Command-line arguments for `tandem`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tandem",
    version,
    about = "Run several commands at once with prefixed output and dependency chaining.",
    long_about = None
)]
pub struct CliArgs {
    /// Commands to run, each handed to the shell as one string.
    #[arg(value_name = "COMMAND")]
    pub commands: Vec<String>,

    /// Path to a config file (TOML).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Comma-separated names for the positional commands, in order.
    #[arg(short = 'n', long, value_name = "NAMES", value_delimiter = ',')]
    pub names: Vec<String>,

    /// Run only the members of these groups.
    #[arg(short = 'g', long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Prefix template with one of {index}, {pid}, {command}, {timestamp},
    /// {group}.
    #[arg(short = 'p', long, value_name = "TEMPLATE")]
    pub prefix: Option<String>,

    /// Minimum width of `command`/`group` labels.
    #[arg(long, value_name = "N")]
    pub prefix_min: Option<usize>,

    /// Maximum width of the whole prefix.
    #[arg(short = 'l', long, value_name = "N")]
    pub prefix_max: Option<usize>,

    #[arg(long, value_enum, value_name = "ALIGN")]
    pub prefix_align: Option<AlignArg>,

    /// Character used to pad labels.
    #[arg(long, value_name = "CHAR")]
    pub prefix_fill: Option<char>,

    /// chrono format for {timestamp}.
    #[arg(short = 't', long, value_name = "FORMAT")]
    pub timestamp_format: Option<String>,

    /// Prefix color for commands without their own, e.g. "bold.cyan".
    #[arg(long, value_name = "COLOR")]
    pub default_color: Option<String>,

    /// Drop blank lines from every command's output.
    #[arg(long)]
    pub condensed: bool,

    /// Pass output through untouched.
    #[arg(short = 'r', long)]
    pub raw: bool,

    /// Forward our stdin to this command.
    #[arg(long, value_name = "NAME")]
    pub pipe_input: Option<String>,

    /// Do not forward SIGINT/SIGHUP/SIGTERM to the commands.
    #[arg(long)]
    pub no_signals: bool,

    /// Include the exit code in exit notices.
    #[arg(long)]
    pub output_exit_code: bool,

    /// Exit once nothing is running or waiting to run.
    #[arg(long)]
    pub exit_when_idle: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TANDEM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum AlignArg {
    Left,
    Right,
    Center,
}

impl From<AlignArg> for PrefixAlign {
    fn from(arg: AlignArg) -> Self {
        match arg {
            AlignArg::Left => PrefixAlign::Left,
            AlignArg::Right => PrefixAlign::Right,
            AlignArg::Center => PrefixAlign::Center,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
