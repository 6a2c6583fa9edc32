// src/command/spec.rs

//! Declarative description of one command, consumed by
//! `Orchestrator::add`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::exec::join_shell_line;
use crate::idle::IdleConfig;
use crate::probe::ProbeConfig;

/// Per-line transform applied before formatting.
pub type LineTransform = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    /// Shell command line as written. Inline arguments and shell syntax
    /// stay part of it.
    pub command: String,
    /// Extra arguments, quoted for the shell when appended to `command`.
    pub args: Vec<String>,
    /// Registry name; the full command line is used when absent.
    pub alias: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Color chain for the prefix, e.g. `"bold.blue"`.
    pub color: Option<String>,
    pub muted: bool,
    /// Drop blank lines from this command's output.
    pub condensed: bool,
    pub transform: Option<LineTransform>,
    pub delay: Duration,
    /// Started by an argument-less `run()`.
    pub runnable: bool,
    pub groups: Vec<String>,
    pub probe: Option<ProbeConfig>,
    pub idle: Option<IdleConfig>,
    /// Feed output lines into the idle timer.
    pub track_output: bool,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into().trim().to_string(),
            args: Vec::new(),
            alias: None,
            cwd: None,
            env: BTreeMap::new(),
            uid: None,
            gid: None,
            color: None,
            muted: false,
            condensed: false,
            transform: None,
            delay: Duration::ZERO,
            runnable: true,
            groups: Vec::new(),
            probe: None,
            idle: None,
            track_output: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn condensed(mut self, condensed: bool) -> Self {
        self.condensed = condensed;
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn runnable(mut self, runnable: bool) -> Self {
        self.runnable = runnable;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    pub fn probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn idle(mut self, idle: IdleConfig) -> Self {
        self.idle = Some(idle);
        self
    }

    pub fn track_output(mut self, track: bool) -> Self {
        self.track_output = track;
        self
    }

    /// The full command line handed to the shell, `args` quoted.
    pub fn command_line(&self) -> String {
        join_shell_line(&self.command, &self.args)
    }

    /// Registry key: the alias, falling back to the command line.
    pub fn name(&self) -> String {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias.clone(),
            _ => self.command_line(),
        }
    }
}

impl From<&str> for CommandSpec {
    fn from(command: &str) -> Self {
        CommandSpec::new(command)
    }
}

impl From<String> for CommandSpec {
    fn from(command: String) -> Self {
        CommandSpec::new(command)
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("alias", &self.alias)
            .field("cwd", &self.cwd)
            .field("color", &self.color)
            .field("muted", &self.muted)
            .field("condensed", &self.condensed)
            .field("transform", &self.transform.is_some())
            .field("delay", &self.delay)
            .field("runnable", &self.runnable)
            .field("groups", &self.groups)
            .field("probe", &self.probe)
            .field("idle", &self.idle)
            .finish_non_exhaustive()
    }
}
