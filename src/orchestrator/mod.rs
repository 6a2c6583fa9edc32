// src/orchestrator/mod.rs

//! The command registry.
//!
//! The [`Orchestrator`] owns every [`Command`], the group membership table,
//! the prefix width of the current run and the shared output writer. It is
//! driven from a single task (the `Runtime`), so none of this state is
//! behind a lock.
//!
//! Lookups accept either a command's name or, when not strict, its raw
//! command line. The first match in registration order wins.

pub mod output;
pub mod prefix;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::color::ColorChain;
use crate::command::{Command, CommandSpec, LineTransform, RunIds, SpawnEnv};
use crate::engine::{RuntimeEvent, RuntimeSender, TriggerReason};
use crate::errors::{Result, TandemError};
use crate::exec::{ExecutorBackend, ExitInfo, ProcessReader, RealExecutorBackend};
use crate::observer::SubscriptionId;
use crate::probe::{SocketConnector, TcpConnector};
use crate::signals::spawn_signal_listener;
use crate::types::{PrefixAlign, PrefixKey, StreamKind, TeardownSignal};

pub use output::{ChunkStyle, LogMessage, OutputSink, SinkWriter, StdoutSink, format_chunk};
pub use prefix::{PrefixTemplate, compute_max_prefix, derive_label, fit_label};

pub const DEFAULT_PREFIX: &str = "[{index}]";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Orchestrator-wide options.
#[derive(Clone)]
pub struct OrchestratorOptions {
    /// Prefix template with at most one placeholder.
    pub prefix: String,
    pub prefix_min: usize,
    /// Upper bound on the whole prefix, decoration included.
    pub prefix_max: Option<usize>,
    pub prefix_align: PrefixAlign,
    pub prefix_fill: char,
    /// chrono format string for `{timestamp}`.
    pub timestamp_format: String,
    pub default_color: Option<String>,
    pub condensed: bool,
    /// Pass output through untouched: no prefixes, no notices.
    pub raw: bool,
    /// Advisory only; a larger run set is logged, not throttled.
    pub max_processes: Option<usize>,
    /// Command whose stdin receives our own stdin.
    pub pipe_input: Option<String>,
    pub handle_signals: bool,
    pub output_exit_code: bool,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Fallback for commands without their own transform.
    pub transform: Option<LineTransform>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            prefix_min: 0,
            prefix_max: None,
            prefix_align: PrefixAlign::default(),
            prefix_fill: ' ',
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            default_color: None,
            condensed: false,
            raw: false,
            max_processes: None,
            pipe_input: None,
            handle_signals: true,
            output_exit_code: false,
            cwd: None,
            env: BTreeMap::new(),
            transform: None,
        }
    }
}

impl fmt::Debug for OrchestratorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorOptions")
            .field("prefix", &self.prefix)
            .field("prefix_min", &self.prefix_min)
            .field("prefix_max", &self.prefix_max)
            .field("prefix_align", &self.prefix_align)
            .field("prefix_fill", &self.prefix_fill)
            .field("timestamp_format", &self.timestamp_format)
            .field("default_color", &self.default_color)
            .field("condensed", &self.condensed)
            .field("raw", &self.raw)
            .field("max_processes", &self.max_processes)
            .field("pipe_input", &self.pipe_input)
            .field("handle_signals", &self.handle_signals)
            .field("output_exit_code", &self.output_exit_code)
            .field("cwd", &self.cwd)
            .field("transform", &self.transform.is_some())
            .finish_non_exhaustive()
    }
}

/// What [`Orchestrator::ensure`] registers or re-aliases.
pub enum Ensure {
    /// A new command, inserted (or replacing one with the same name).
    Command(Command),
    /// A name or raw command line that must already resolve.
    Name(String),
}

impl From<Command> for Ensure {
    fn from(command: Command) -> Self {
        Ensure::Command(command)
    }
}

impl From<&str> for Ensure {
    fn from(name: &str) -> Self {
        Ensure::Name(name.to_string())
    }
}

impl From<String> for Ensure {
    fn from(name: String) -> Self {
        Ensure::Name(name)
    }
}

pub struct Orchestrator {
    options: OrchestratorOptions,
    template: PrefixTemplate,
    default_color: Option<ColorChain>,
    commands: Vec<Command>,
    groups: BTreeMap<String, Vec<String>>,
    indexes: Vec<String>,
    max_prefix: usize,
    writer: SinkWriter,
    executor: Arc<dyn ExecutorBackend>,
    connector: Arc<dyn SocketConnector>,
    bus: RuntimeSender,
    run_ids: RunIds,
    input_source: Option<ProcessReader>,
    input_reader: Option<JoinHandle<()>>,
    signal_listener: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Validate `options` and build an empty registry.
    ///
    /// With `handle_signals` set this spawns the signal listener, so it must
    /// be called from within a Tokio runtime.
    pub fn new(options: OrchestratorOptions, bus: RuntimeSender) -> Result<Self> {
        let template = PrefixTemplate::parse(&options.prefix)?;
        let default_color = options
            .default_color
            .as_deref()
            .map(str::parse::<ColorChain>)
            .transpose()
            .map_err(TandemError::ConfigError)?;
        if StrftimeItems::new(&options.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(TandemError::ConfigError(format!(
                "invalid timestamp_format \"{}\"",
                options.timestamp_format
            )));
        }

        let signal_listener = options
            .handle_signals
            .then(|| spawn_signal_listener(bus.clone()));

        Ok(Self {
            options,
            template,
            default_color,
            commands: Vec::new(),
            groups: BTreeMap::new(),
            indexes: Vec::new(),
            max_prefix: 0,
            writer: SinkWriter::new(Box::new(StdoutSink)),
            executor: Arc::new(RealExecutorBackend::new()),
            connector: Arc::new(TcpConnector::default()),
            bus,
            run_ids: RunIds::default(),
            input_source: None,
            input_reader: None,
            signal_listener,
        })
    }

    pub fn with_executor(mut self, executor: Arc<dyn ExecutorBackend>) -> Self {
        self.executor = executor;
        self
    }

    /// Connector used by probes of commands added after this call.
    pub fn with_connector(mut self, connector: Arc<dyn SocketConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.writer = SinkWriter::new(Box::new(sink));
        self
    }

    /// Source forwarded to the `pipe_input` command instead of our stdin.
    pub fn with_input(mut self, input: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.input_source = Some(Box::new(input));
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn bus(&self) -> &RuntimeSender {
        &self.bus
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(Command::name).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Nothing running, no delayed start pending, no probe or idle timer
    /// in flight.
    pub fn is_idle(&self) -> bool {
        self.commands.iter().all(|c| !c.is_busy())
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<String>> {
        &self.groups
    }

    pub fn group(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    pub fn max_prefix(&self) -> usize {
        self.max_prefix
    }

    fn position(&self, name: &str, strict: bool) -> Option<usize> {
        self.commands
            .iter()
            .position(|c| c.name() == name)
            .or_else(|| {
                if strict {
                    None
                } else {
                    self.commands.iter().position(|c| c.command_line() == name)
                }
            })
    }

    fn resolve_name(&self, name: &str) -> Result<String> {
        self.position(name, false)
            .map(|i| self.commands[i].name().to_string())
            .ok_or_else(|| TandemError::CommandNotFound(name.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.position(name, false).map(|i| &self.commands[i])
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Command> {
        self.position(name, false).map(move |i| &mut self.commands[i])
    }

    pub fn get(&self, name: &str, strict: bool) -> Result<&Command> {
        self.position(name, strict)
            .map(|i| &self.commands[i])
            .ok_or_else(|| TandemError::CommandNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str, strict: bool) -> Result<&mut Command> {
        match self.position(name, strict) {
            Some(i) => Ok(&mut self.commands[i]),
            None => Err(TandemError::CommandNotFound(name.to_string())),
        }
    }

    /// Build a command from `spec` and register it. Does not start it.
    pub fn add(&mut self, spec: impl Into<CommandSpec>) -> Result<&mut Command> {
        let command = Command::new(spec.into(), Arc::clone(&self.connector))?;
        self.ensure(command, None)
    }

    /// Register `target` under `alias` (or its own name).
    ///
    /// A name that resolves to nothing fails with `Validation`. Registering
    /// a command whose name is taken replaces the existing entry in place.
    pub fn ensure(&mut self, target: impl Into<Ensure>, alias: Option<&str>) -> Result<&mut Command> {
        let alias = alias.filter(|a| !a.is_empty());

        let index = match target.into() {
            Ensure::Command(mut command) => {
                if let Some(alias) = alias {
                    command.set_alias(alias);
                }
                match self.position(command.name(), true) {
                    Some(existing) => {
                        debug!(command = %command.name(), "replacing registered command");
                        self.commands[existing] = command;
                        existing
                    }
                    None => {
                        debug!(command = %command.name(), "command registered");
                        self.commands.push(command);
                        self.commands.len() - 1
                    }
                }
            }
            Ensure::Name(name) => {
                let mut index = self.position(&name, false).ok_or_else(|| {
                    TandemError::Validation(format!("'{name}' does not resolve to a registered command"))
                })?;
                if let Some(alias) = alias {
                    let old = self.commands[index].name().to_string();
                    if old != alias {
                        if let Some(clash) = self.position(alias, true) {
                            self.remove_at(clash);
                            if clash < index {
                                index -= 1;
                            }
                        }
                        self.commands[index].set_alias(alias);
                        self.rename_refs(&old, alias);
                    }
                }
                index
            }
        };

        self.assign_groups(index);
        if self.indexes.is_empty() {
            self.recompute_max_prefix();
        }
        Ok(&mut self.commands[index])
    }

    fn assign_groups(&mut self, index: usize) {
        let command = &self.commands[index];
        let name = command.name().to_string();
        for group in command.groups() {
            let members = self.groups.entry(group).or_default();
            if !members.contains(&name) {
                members.push(name.clone());
            }
        }
    }

    fn rename_refs(&mut self, old: &str, new: &str) {
        for members in self.groups.values_mut() {
            for member in members.iter_mut().filter(|m| m.as_str() == old) {
                *member = new.to_string();
            }
        }
        for entry in self.indexes.iter_mut().filter(|m| m.as_str() == old) {
            *entry = new.to_string();
        }
    }

    fn remove_at(&mut self, index: usize) -> Command {
        let command = self.commands.remove(index);
        let name = command.name();
        for members in self.groups.values_mut() {
            members.retain(|m| m != name);
        }
        self.groups.retain(|_, members| !members.is_empty());
        self.indexes.retain(|m| m != name);
        command
    }

    /// Start `targets`, or every runnable command when `targets` is empty.
    ///
    /// Commands start in registration order. A command that fails to spawn
    /// is reported in the output and does not stop the others.
    pub fn run<S: AsRef<str>>(&mut self, targets: &[S]) -> Result<()> {
        let selected: Vec<usize> = if targets.is_empty() {
            (0..self.commands.len())
                .filter(|&i| self.commands[i].is_runnable())
                .collect()
        } else {
            let mut picked = Vec::with_capacity(targets.len());
            for target in targets {
                let target = target.as_ref();
                let index = self
                    .position(target, false)
                    .ok_or_else(|| TandemError::CommandNotFound(target.to_string()))?;
                if !picked.contains(&index) {
                    picked.push(index);
                }
            }
            picked.sort_unstable();
            picked
        };

        let names: Vec<String> = selected
            .iter()
            .map(|&i| self.commands[i].name().to_string())
            .collect();
        for &index in &selected {
            self.assign_groups(index);
        }
        self.indexes = names.clone();
        self.recompute_max_prefix();

        if let Some(limit) = self.options.max_processes {
            if names.len() > limit {
                warn!(
                    requested = names.len(),
                    limit, "more commands requested than max_processes; starting all of them"
                );
            }
        }

        self.wire_input()?;

        info!(commands = ?names, "starting commands");
        for name in &names {
            self.start_command(name)?;
        }
        Ok(())
    }

    /// Run every member of `groups`.
    pub fn run_group<S: AsRef<str>>(&mut self, groups: &[S]) -> Result<()> {
        let mut targets: Vec<String> = Vec::new();
        for group in groups {
            let group = group.as_ref();
            let members = self
                .groups
                .get(group)
                .filter(|m| !m.is_empty())
                .ok_or_else(|| TandemError::GroupNotFound(group.to_string()))?;
            for member in members {
                if !targets.contains(member) {
                    targets.push(member.clone());
                }
            }
        }
        if targets.is_empty() {
            return Ok(());
        }
        self.run(&targets)
    }

    /// Start one command on behalf of a dependency edge. Unlike
    /// [`Orchestrator::run`] this extends the current run set instead of
    /// replacing it.
    pub fn trigger(&mut self, target: &str, reason: TriggerReason) -> Result<()> {
        let index = self
            .position(target, false)
            .ok_or_else(|| TandemError::CommandNotFound(target.to_string()))?;
        let name = self.commands[index].name().to_string();

        self.assign_groups(index);
        if !self.indexes.contains(&name) {
            self.indexes.push(name.clone());
            self.recompute_max_prefix();
        }
        info!(command = %name, ?reason, "dependency triggered");
        self.start_command(&name)
    }

    fn start_command(&mut self, name: &str) -> Result<()> {
        self.prepare(name)?;
        let index = self
            .position(name, true)
            .ok_or_else(|| TandemError::CommandNotFound(name.to_string()))?;

        if self.commands[index].is_muted() {
            self.write_notice(name, format!("{name} is muted"))?;
        }

        let result = {
            let Self {
                commands,
                executor,
                bus,
                options,
                run_ids,
                ..
            } = self;
            let env = SpawnEnv {
                executor: &**executor,
                ids: run_ids,
                bus,
                cwd: options.cwd.as_deref(),
                env: &options.env,
            };
            commands[index].schedule(&env)
        };
        self.report_spawn(name, result)
    }

    fn report_spawn(&mut self, name: &str, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(command = %name, error = %err, "failed to start command");
                self.write_notice(name, format!("{name} errored: {err}"))
            }
        }
    }

    /// Attach run handlers for the command's configured probe/idle targets.
    /// Runs before every start; already wired edges are skipped.
    fn prepare(&mut self, name: &str) -> Result<()> {
        let index = self
            .position(name, true)
            .ok_or_else(|| TandemError::CommandNotFound(name.to_string()))?;

        if let Some(target) = self.commands[index].unwired_probe_target() {
            let target = self.resolve_name(&target)?;
            let tx = self.bus.clone();
            let command = &mut self.commands[index];
            let id = command.on_connect(move || {
                let _ = tx.send(RuntimeEvent::RunRequested {
                    target: target.clone(),
                    reason: TriggerReason::ProbeConnected,
                });
            })?;
            command.mark_probe_wired(id);
        }

        if let Some(target) = self.commands[index].unwired_idle_target() {
            let target = self.resolve_name(&target)?;
            let tx = self.bus.clone();
            let command = &mut self.commands[index];
            let id = command.on_timeout(move |_| {
                let _ = tx.send(RuntimeEvent::RunRequested {
                    target: target.clone(),
                    reason: TriggerReason::IdleCondition,
                });
            })?;
            command.mark_idle_wired(id);
        }
        Ok(())
    }

    /// Run `target` once `command`'s readiness probe connects.
    pub fn on_connect(&mut self, command: &str, target: &str) -> Result<SubscriptionId> {
        let target = self.resolve_name(target)?;
        let tx = self.bus.clone();
        self.get_mut(command, false)?.on_connect(move || {
            let _ = tx.send(RuntimeEvent::RunRequested {
                target: target.clone(),
                reason: TriggerReason::ProbeConnected,
            });
        })
    }

    /// Run `target` once `command`'s output goes idle.
    pub fn on_timeout(&mut self, command: &str, target: &str) -> Result<SubscriptionId> {
        let target = self.resolve_name(target)?;
        let tx = self.bus.clone();
        self.get_mut(command, false)?.on_timeout(move |_| {
            let _ = tx.send(RuntimeEvent::RunRequested {
                target: target.clone(),
                reason: TriggerReason::IdleCondition,
            });
        })
    }

    /// Kill `targets` (the current run set when empty) and drop them from
    /// the registry. Returns whether the registry is now empty.
    pub fn kill<S: AsRef<str>>(&mut self, targets: &[S], signal: TeardownSignal) -> Result<bool> {
        let names: Vec<String> = if targets.is_empty() {
            self.indexes.clone()
        } else {
            targets
                .iter()
                .map(|t| self.resolve_name(t.as_ref()))
                .collect::<Result<_>>()?
        };

        for name in &names {
            let Some(index) = self.position(name, true) else {
                continue;
            };
            let mut command = self.remove_at(index);
            if let Err(err) = command.kill(self.executor.as_ref(), signal) {
                warn!(command = %name, error = %err, "failed to signal command");
            }
        }

        debug!(remaining = self.commands.len(), "kill complete");
        Ok(self.commands.is_empty())
    }

    /// Kill every registered command with `signal`.
    pub fn kill_all(&mut self, signal: TeardownSignal) -> Result<bool> {
        let names: Vec<String> = self.commands.iter().map(|c| c.name().to_string()).collect();
        info!(%signal, count = names.len(), "killing all commands");
        self.kill(&names, signal)
    }

    /// Format `message` for `command` and write it to the sink.
    ///
    /// `LogMessage::Error` is returned as the error instead of being written.
    pub fn log(&mut self, message: impl Into<LogMessage>, command: Option<&str>) -> Result<()> {
        let text = match message.into() {
            LogMessage::Text(text) => text,
            LogMessage::Error(err) => return Err(err),
        };

        let (prefix, condensed) = match command {
            Some(name) => {
                let prefix = self.prefix(name)?;
                let condensed = self.find(name).is_some_and(Command::is_condensed);
                (prefix, condensed)
            }
            None => (String::new(), false),
        };

        let style = ChunkStyle {
            raw: self.options.raw,
            condensed: self.options.condensed || condensed,
            at_line_start: self.writer.at_line_start(),
        };
        if let Some(chunk) = format_chunk(&text, &prefix, style) {
            self.writer.write(&chunk)?;
        }
        Ok(())
    }

    /// Orchestrator-generated line (exit notice, error, muted notice).
    /// Suppressed in raw mode.
    fn write_notice(&mut self, command: &str, text: String) -> Result<()> {
        if self.options.raw {
            return Ok(());
        }
        let lead = if self.writer.at_line_start() { "" } else { "\n" };
        self.log(format!("{lead}{text}\n"), Some(command))
    }

    /// The formatted, colored prefix for `name`.
    pub fn prefix(&mut self, name: &str) -> Result<String> {
        let index = self
            .position(name, false)
            .ok_or_else(|| TandemError::CommandNotFound(name.to_string()))?;

        let Some(key) = self.template.key() else {
            return Ok(self.colorize(index, self.template.as_str()));
        };
        if let Some(cached) = self.commands[index].cached_prefix(key) {
            return Ok(cached.to_string());
        }

        let fill = self.options.prefix_fill;
        let align = self.options.prefix_align;
        let command = &self.commands[index];
        let value = match key {
            PrefixKey::Index => self.index_of(index).to_string(),
            PrefixKey::Pid => command.pid().map(|p| p.to_string()).unwrap_or_default(),
            PrefixKey::Timestamp => chrono::Local::now()
                .format(&self.options.timestamp_format)
                .to_string(),
            PrefixKey::Command => fit_label(&derive_label(command), self.max_prefix, fill, align),
            PrefixKey::Group => fit_label(command.primary_group(), self.max_prefix, fill, align),
        };

        let rendered = self.colorize(index, &self.template.render(&value));
        self.commands[index].cache_prefix(key, rendered.clone());
        Ok(rendered)
    }

    fn colorize(&self, index: usize, text: &str) -> String {
        match self.commands[index].color().or(self.default_color.as_ref()) {
            Some(chain) => chain.apply(text),
            None => text.to_string(),
        }
    }

    /// Position in the current run set, else in the registry.
    fn index_of(&self, index: usize) -> usize {
        let name = self.commands[index].name();
        self.indexes
            .iter()
            .position(|n| n == name)
            .unwrap_or(index)
    }

    fn recompute_max_prefix(&mut self) {
        let Some(key) = self.template.key().filter(PrefixKey::is_width_bound) else {
            return;
        };

        let members: Vec<&Command> = if self.indexes.is_empty() {
            self.commands.iter().collect()
        } else {
            self.indexes.iter().filter_map(|n| self.find(n)).collect()
        };
        let lens = members.iter().map(|c| match key {
            PrefixKey::Group => c.primary_group().chars().count(),
            _ => derive_label(c).chars().count(),
        });

        let width = compute_max_prefix(
            lens,
            self.options.prefix_min,
            self.options.prefix_max,
            self.template.decoration_len(),
        );
        if width != self.max_prefix {
            for command in &mut self.commands {
                command.clear_prefix_cache();
            }
            self.max_prefix = width;
        }
        debug!(max_prefix = self.max_prefix, "prefix width computed");
    }

    /// One line of process output.
    pub fn handle_output(&mut self, command: &str, run_id: u64, stream: StreamKind, line: &str) -> Result<()> {
        let Some(index) = self.position(command, true) else {
            debug!(command, ?stream, "output for unregistered command dropped");
            return Ok(());
        };
        let cmd = &self.commands[index];
        if cmd.run_id() != Some(run_id) {
            debug!(command, run_id, "output from stale process dropped");
            return Ok(());
        }

        cmd.record_output(line);
        if cmd.is_muted() {
            return Ok(());
        }
        let text = cmd.transform_line(line, self.options.transform.as_ref());
        self.log(text, Some(command))
    }

    /// A process exited. Signal exits from teardown are silent.
    pub fn handle_exit(&mut self, command: &str, run_id: u64, exit: ExitInfo) -> Result<()> {
        let Some(index) = self.position(command, true) else {
            debug!(command, "exit of unregistered command ignored");
            return Ok(());
        };
        if !self.commands[index].finish(run_id) {
            debug!(command, run_id, "exit of stale process ignored");
            return Ok(());
        }

        if let Some(signal) = exit.teardown_signal() {
            info!(command, %signal, "command terminated by signal");
            return Ok(());
        }
        info!(command, code = ?exit.code, "command exited");
        if self.commands[index].is_muted() {
            return Ok(());
        }

        let notice = match (self.options.output_exit_code, exit.code) {
            (true, Some(code)) => format!("{command} exited with code {code}"),
            (true, None) => format!(
                "{command} exited with signal {}",
                exit.signal.unwrap_or_default()
            ),
            (false, _) => format!("{command} exited"),
        };
        self.write_notice(command, notice)
    }

    /// Waiting on a process failed. Always reported, muted or not.
    pub fn handle_process_error(&mut self, command: &str, run_id: u64, message: &str) -> Result<()> {
        let Some(index) = self.position(command, true) else {
            return Ok(());
        };
        if !self.commands[index].finish(run_id) {
            return Ok(());
        }
        error!(command, error = message, "command errored");
        self.write_notice(command, format!("{command} errored: {message}"))
    }

    pub fn handle_delay_elapsed(&mut self, command: &str, ticket: u64) -> Result<()> {
        let Some(index) = self.position(command, true) else {
            return Ok(());
        };
        let result = {
            let Self {
                commands,
                executor,
                bus,
                options,
                run_ids,
                ..
            } = self;
            let env = SpawnEnv {
                executor: &**executor,
                ids: run_ids,
                bus,
                cwd: options.cwd.as_deref(),
                env: &options.env,
            };
            commands[index].start_delayed(ticket, &env)
        };
        match result {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(command, ticket, "stale delayed start ignored");
                Ok(())
            }
            Err(err) => self.report_spawn(command, Err(err)),
        }
    }

    fn wire_input(&mut self) -> Result<()> {
        let Some(target) = self.options.pipe_input.clone() else {
            return Ok(());
        };
        if self.input_reader.is_some() {
            return Ok(());
        }
        let target = self.resolve_name(&target)?;

        let source: ProcessReader = match self.input_source.take() {
            Some(source) => source,
            None => Box::new(tokio::io::stdin()),
        };
        debug!(command = %target, "forwarding stdin");
        self.input_reader = Some(spawn_input_forwarder(source, self.bus.clone()));
        Ok(())
    }

    /// Bytes from our stdin, for the `pipe_input` command.
    pub fn forward_input(&mut self, bytes: Vec<u8>) {
        let Some(target) = self.options.pipe_input.as_deref() else {
            return;
        };
        match self.find(target) {
            Some(command) if command.write_input(bytes) => {}
            _ => debug!(command = target, "stdin target not accepting input"),
        }
    }

    pub fn close_input(&mut self) {
        let Some(target) = self.options.pipe_input.clone() else {
            return;
        };
        if let Some(command) = self.find_mut(&target) {
            command.close_input();
        }
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("commands", &self.commands)
            .field("groups", &self.groups)
            .field("indexes", &self.indexes)
            .field("max_prefix", &self.max_prefix)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(listener) = self.signal_listener.take() {
            listener.abort();
        }
        if let Some(reader) = self.input_reader.take() {
            reader.abort();
        }
    }
}

fn spawn_input_forwarder(mut source: ProcessReader, bus: RuntimeSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if bus.send(RuntimeEvent::Input(buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
        let _ = bus.send(RuntimeEvent::InputClosed);
    })
}
