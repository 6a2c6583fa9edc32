// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::command::CommandSpec;
use crate::idle::IdleConfig;
use crate::orchestrator::{DEFAULT_PREFIX, DEFAULT_TIMESTAMP_FORMAT, OrchestratorOptions};
use crate::probe::ProbeConfig;
use crate::types::PrefixAlign;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [options]
/// prefix = "[{command}]"
/// prefix_align = "center"
///
/// [[command]]
/// name = "api"
/// cmd = "cargo run -p api"
/// probe = { port = 8080, attempts = 30, target = "web" }
///
/// [[command]]
/// name = "web"
/// cmd = "npm run dev"
/// runnable = false
/// ```
///
/// Commands keep their file order; it is also their start order.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub options: OptionsSection,

    #[serde(default)]
    pub command: Vec<CommandSection>,
}

/// A config that passed validation. Built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub options: OptionsSection,
    pub command: Vec<CommandSection>,
}

impl ConfigFile {
    /// Wrap sections without validating them.
    pub(crate) fn new_unchecked(options: OptionsSection, command: Vec<CommandSection>) -> Self {
        Self { options, command }
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        self.options.to_orchestrator_options()
    }

    pub fn command_specs(&self) -> Vec<CommandSpec> {
        self.command.iter().map(CommandSection::to_spec).collect()
    }
}

/// `[options]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OptionsSection {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub prefix_min: Option<usize>,
    #[serde(default)]
    pub prefix_max: Option<usize>,
    #[serde(default)]
    pub prefix_align: Option<PrefixAlign>,
    /// Exactly one character.
    #[serde(default)]
    pub prefix_fill: Option<String>,
    #[serde(default)]
    pub timestamp_format: Option<String>,
    #[serde(default)]
    pub default_color: Option<String>,
    #[serde(default)]
    pub condensed: bool,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub max_processes: Option<usize>,
    /// Name (or command line) of the command that receives our stdin.
    #[serde(default)]
    pub pipe_input: Option<String>,
    /// Defaults to `true`.
    #[serde(default)]
    pub handle_signals: Option<bool>,
    #[serde(default)]
    pub output_exit_code: bool,
    #[serde(default)]
    pub exit_when_idle: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl OptionsSection {
    pub fn to_orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            prefix: self
                .prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            prefix_min: self.prefix_min.unwrap_or(0),
            prefix_max: self.prefix_max,
            prefix_align: self.prefix_align.unwrap_or_default(),
            prefix_fill: self
                .prefix_fill
                .as_deref()
                .and_then(|s| s.chars().next())
                .unwrap_or(' '),
            timestamp_format: self
                .timestamp_format
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMESTAMP_FORMAT.to_string()),
            default_color: self.default_color.clone(),
            condensed: self.condensed,
            raw: self.raw,
            max_processes: self.max_processes,
            pipe_input: self.pipe_input.clone(),
            handle_signals: self.handle_signals.unwrap_or(true),
            output_exit_code: self.output_exit_code,
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            transform: None,
        }
    }
}

/// One `[[command]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSection {
    /// Command line handed to the shell.
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Registry name; defaults to the full command line.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,

    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub condensed: bool,

    /// Start delay in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,

    /// Started by a plain `run`; `false` for dependency-only commands.
    #[serde(default = "default_true")]
    pub runnable: bool,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub probe: Option<ProbeSection>,

    #[serde(default)]
    pub idle: Option<IdleSection>,

    /// Feed output lines into the idle timer.
    #[serde(default = "default_true")]
    pub track_output: bool,
}

fn default_true() -> bool {
    true
}

impl CommandSection {
    /// The name this command is registered under.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.command_line(),
        }
    }

    pub fn command_line(&self) -> String {
        let mut line = self.cmd.trim().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub fn to_spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.cmd.clone())
            .args(self.args.iter().cloned())
            .muted(self.muted)
            .condensed(self.condensed)
            .delay(Duration::from_millis(self.delay_ms))
            .runnable(self.runnable)
            .track_output(self.track_output);

        spec.alias = self.name.clone().filter(|n| !n.is_empty());
        spec.cwd = self.cwd.clone();
        spec.env = self.env.clone();
        spec.uid = self.uid;
        spec.gid = self.gid;
        spec.color = self.color.clone();
        spec.groups = self.groups.clone();
        spec.probe = self.probe.as_ref().map(ProbeSection::to_config);
        spec.idle = self.idle.as_ref().map(IdleSection::to_config);
        spec
    }
}

/// `probe = { ... }` on a command.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSection {
    #[serde(default = "default_probe_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_probe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_probe_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Command started once the port accepts connections.
    #[serde(default)]
    pub target: Option<String>,
}

fn default_probe_host() -> String {
    "127.0.0.1".to_string()
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_retry_delay_ms() -> u64 {
    1000
}

impl ProbeSection {
    pub fn to_config(&self) -> ProbeConfig {
        let mut config = ProbeConfig::new(self.host.clone(), self.port)
            .attempts(self.attempts)
            .retry_delay(Duration::from_millis(self.retry_delay_ms));
        if let Some(target) = &self.target {
            config = config.target(target.clone());
        }
        config
    }
}

/// `idle = { ... }` on a command.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleSection {
    pub tick_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Command started once this command's output goes quiet.
    #[serde(default)]
    pub target: Option<String>,
}

impl IdleSection {
    pub fn to_config(&self) -> IdleConfig {
        let mut config = IdleConfig::new(Duration::from_millis(self.tick_ms));
        if let Some(timeout) = self.timeout_ms {
            config = config.timeout(Duration::from_millis(timeout));
        }
        if let Some(target) = &self.target {
            config = config.target(target.clone());
        }
        config
    }
}
