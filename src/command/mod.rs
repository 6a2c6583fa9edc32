// src/command/mod.rs

//! One supervised command.
//!
//! A [`Command`] owns at most one live process at a time, the stream
//! subscriptions feeding that process's output into the runtime channel,
//! and the optional [`Prober`] / [`IdleTimer`] that chain other commands
//! off this one. Name resolution (targets, groups) belongs to the
//! `Orchestrator`; a `Command` only knows about itself.

pub mod spec;
pub mod subscribe;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::color::ColorChain;
use crate::engine::{RuntimeEvent, RuntimeSender};
use crate::errors::{Result, TandemError};
use crate::exec::{ExecutorBackend, SpawnRequest};
use crate::idle::{IdleState, IdleTimer};
use crate::observer::SubscriptionId;
use crate::probe::{ProbeState, Prober, SocketConnector};
use crate::types::{PrefixKey, TeardownSignal};

pub use spec::{CommandSpec, LineTransform};
use subscribe::{subscribe, Subscriptions};

/// Group used for commands that declare none.
pub const DEFAULT_GROUP: &str = "default";

/// Registry-wide source of run ids and delay tickets. A command that is
/// killed and registered again never sees an id from its earlier life.
#[derive(Debug, Default)]
pub struct RunIds(AtomicU64);

impl RunIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Orchestrator-wide spawn inputs, borrowed for the duration of a spawn.
pub struct SpawnEnv<'a> {
    pub executor: &'a dyn ExecutorBackend,
    pub ids: &'a RunIds,
    pub bus: &'a RuntimeSender,
    pub cwd: Option<&'a Path>,
    pub env: &'a BTreeMap<String, String>,
}

#[derive(Debug)]
struct LiveProcess {
    pid: Option<u32>,
    run_id: u64,
    subscriptions: Subscriptions,
}

pub struct Command {
    name: String,
    spec: CommandSpec,
    color: Option<ColorChain>,
    process: Option<LiveProcess>,
    prefix_cache: Option<(PrefixKey, String)>,
    delay_timer: Option<(u64, JoinHandle<()>)>,
    prober: Option<Prober>,
    idle: Option<IdleTimer>,
    probe_wiring: Option<SubscriptionId>,
    idle_wiring: Option<SubscriptionId>,
}

impl Command {
    /// Build a command from its spec. Fails if the color chain is invalid.
    pub fn new(spec: CommandSpec, connector: Arc<dyn SocketConnector>) -> Result<Self> {
        let color = parse_color(spec.color.as_deref())?;
        let prober = spec.probe.clone().map(|cfg| Prober::new(cfg, connector));
        let idle = spec.idle.clone().map(IdleTimer::new);

        Ok(Self {
            name: spec.name(),
            spec,
            color,
            process: None,
            prefix_cache: None,
            delay_timer: None,
            prober,
            idle,
            probe_wiring: None,
            idle_wiring: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_alias(&mut self, alias: &str) {
        self.name = alias.to_string();
        self.spec.alias = Some(alias.to_string());
    }

    /// Whether the name was chosen explicitly rather than derived.
    pub fn has_alias(&self) -> bool {
        self.spec.alias.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn command_line(&self) -> String {
        self.spec.command_line()
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Mutable options. Color changes must go through [`Command::set_color`]
    /// and renames through `Orchestrator::ensure`.
    pub fn options_mut(&mut self) -> &mut CommandSpec {
        &mut self.spec
    }

    pub fn color(&self) -> Option<&ColorChain> {
        self.color.as_ref()
    }

    pub fn set_color(&mut self, color: Option<&str>) -> Result<()> {
        self.color = parse_color(color)?;
        self.spec.color = color.map(str::to_string);
        Ok(())
    }

    pub fn groups(&self) -> Vec<String> {
        if self.spec.groups.is_empty() {
            vec![DEFAULT_GROUP.to_string()]
        } else {
            self.spec.groups.clone()
        }
    }

    pub fn primary_group(&self) -> &str {
        self.spec
            .groups
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_GROUP)
    }

    pub fn is_runnable(&self) -> bool {
        self.spec.runnable
    }

    pub fn is_muted(&self) -> bool {
        self.spec.muted
    }

    pub fn mute(&mut self) {
        self.spec.muted = true;
    }

    pub fn unmute(&mut self) {
        self.spec.muted = false;
    }

    pub fn is_condensed(&self) -> bool {
        self.spec.condensed
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    pub fn run_id(&self) -> Option<u64> {
        self.process.as_ref().map(|p| p.run_id)
    }

    pub fn has_pending_delay(&self) -> bool {
        self.delay_timer.is_some()
    }

    /// Anything still in flight: a process, a delayed start, a probe chain
    /// or a running idle timer.
    pub fn is_busy(&self) -> bool {
        let probing = self.prober.as_ref().is_some_and(|p| {
            matches!(p.state(), ProbeState::Probing | ProbeState::RetryScheduled)
        });
        let idling = self
            .idle
            .as_ref()
            .is_some_and(|i| i.state() == IdleState::Running);
        self.is_running() || self.has_pending_delay() || probing || idling
    }

    pub fn prober(&self) -> Option<&Prober> {
        self.prober.as_ref()
    }

    pub fn prober_mut(&mut self) -> Option<&mut Prober> {
        self.prober.as_mut()
    }

    pub fn idle_timer(&self) -> Option<&IdleTimer> {
        self.idle.as_ref()
    }

    pub fn idle_timer_mut(&mut self) -> Option<&mut IdleTimer> {
        self.idle.as_mut()
    }

    /// Attach a handler to the probe's `Connected` event and enable the probe.
    pub fn on_connect<F>(&mut self, handler: F) -> Result<SubscriptionId>
    where
        F: FnMut() + Send + 'static,
    {
        let name = self.name.clone();
        let prober = self.prober.as_mut().ok_or_else(|| {
            TandemError::Validation(format!("command '{name}' has no readiness probe configured"))
        })?;
        let id = prober.on_connected(handler);
        prober.enable();
        Ok(id)
    }

    /// Attach a handler to the idle timer's `Condition` event and enable it.
    pub fn on_timeout<F>(&mut self, handler: F) -> Result<SubscriptionId>
    where
        F: FnMut(Option<&str>) + Send + 'static,
    {
        let name = self.name.clone();
        let idle = self.idle.as_mut().ok_or_else(|| {
            TandemError::Validation(format!("command '{name}' has no idle timer configured"))
        })?;
        let id = idle.on_condition(handler);
        idle.enable();
        Ok(id)
    }

    /// Probe target that still needs its run handler attached.
    pub(crate) fn unwired_probe_target(&self) -> Option<String> {
        if self.probe_wiring.is_some() {
            return None;
        }
        self.spec.probe.as_ref()?.target.clone()
    }

    pub(crate) fn unwired_idle_target(&self) -> Option<String> {
        if self.idle_wiring.is_some() {
            return None;
        }
        self.spec.idle.as_ref()?.target.clone()
    }

    pub(crate) fn mark_probe_wired(&mut self, id: SubscriptionId) {
        self.probe_wiring = Some(id);
    }

    pub(crate) fn mark_idle_wired(&mut self, id: SubscriptionId) {
        self.idle_wiring = Some(id);
    }

    pub fn cached_prefix(&self, key: PrefixKey) -> Option<&str> {
        match &self.prefix_cache {
            Some((cached_key, value)) if *cached_key == key => Some(value),
            _ => None,
        }
    }

    pub(crate) fn clear_prefix_cache(&mut self) {
        self.prefix_cache = None;
    }

    pub(crate) fn cache_prefix(&mut self, key: PrefixKey, value: String) {
        if key != PrefixKey::Timestamp {
            self.prefix_cache = Some((key, value));
        }
    }

    /// Count one line of activity for the idle timer.
    pub fn record_output(&self, line: &str) {
        if !self.spec.track_output {
            return;
        }
        if let Some(idle) = &self.idle {
            idle.update(Some(line.trim_end_matches(['\r', '\n'])));
        }
    }

    /// Apply this command's transform, else the fallback, else nothing.
    pub fn transform_line(&self, line: &str, fallback: Option<&LineTransform>) -> String {
        match self.spec.transform.as_ref().or(fallback) {
            Some(transform) => transform(line),
            None => line.to_string(),
        }
    }

    /// Spawn now, or arm the delayed start.
    pub(crate) fn schedule(&mut self, env: &SpawnEnv<'_>) -> Result<()> {
        if self.spec.delay.is_zero() {
            return self.spawn_process(env);
        }

        if let Some((_, timer)) = self.delay_timer.take() {
            timer.abort();
        }
        let ticket = env.ids.next();
        let delay = self.spec.delay;
        let name = self.name.clone();
        let tx = env.bus.clone();

        let timer = tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(RuntimeEvent::DelayElapsed {
                command: name,
                ticket,
            });
        });
        debug!(command = %self.name, ?delay, ticket, "delayed start armed");
        self.delay_timer = Some((ticket, timer));
        Ok(())
    }

    /// Handle a due delayed start. Returns `false` for a stale ticket.
    pub(crate) fn start_delayed(&mut self, ticket: u64, env: &SpawnEnv<'_>) -> Result<bool> {
        match &self.delay_timer {
            Some((current, _)) if *current == ticket => {
                self.delay_timer = None;
                self.spawn_process(env)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn spawn_process(&mut self, env: &SpawnEnv<'_>) -> Result<()> {
        if self.is_running() {
            debug!(command = %self.name, "process already running; not starting another");
            return Ok(());
        }

        let mut merged_env = env.env.clone();
        merged_env.extend(self.spec.env.clone());
        let request = SpawnRequest {
            name: self.name.clone(),
            command_line: self.spec.command.clone(),
            args: self.spec.args.clone(),
            cwd: self
                .spec
                .cwd
                .clone()
                .or_else(|| env.cwd.map(Path::to_path_buf)),
            env: merged_env,
            uid: self.spec.uid,
            gid: self.spec.gid,
        };

        let process = env.executor.spawn(&request)?;

        let run_id = env.ids.next();
        if matches!(self.prefix_cache, Some((PrefixKey::Pid, _))) {
            self.prefix_cache = None;
        }

        let pid = process.pid;
        let subscriptions = subscribe(&self.name, run_id, process, env.bus);
        self.process = Some(LiveProcess {
            pid,
            run_id,
            subscriptions,
        });
        info!(command = %self.name, run_id, pid = ?pid, "command started");

        if let Some(prober) = &mut self.prober {
            prober.start();
        }
        if let Some(idle) = &mut self.idle {
            idle.start();
        }
        Ok(())
    }

    /// Clear the process handle if `run_id` is the live one. Returns `false`
    /// for events from an earlier process instance.
    pub(crate) fn finish(&mut self, run_id: u64) -> bool {
        match &self.process {
            Some(live) if live.run_id == run_id => {
                if let Some(live) = self.process.take() {
                    live.subscriptions.release();
                }
                true
            }
            _ => false,
        }
    }

    /// Forward bytes to the process's stdin.
    pub fn write_input(&self, bytes: Vec<u8>) -> bool {
        self.process
            .as_ref()
            .and_then(|p| p.subscriptions.stdin.as_ref())
            .is_some_and(|stdin| stdin.send(bytes).is_ok())
    }

    /// Close the process's stdin so it sees end of file.
    pub fn close_input(&mut self) {
        if let Some(live) = &mut self.process {
            live.subscriptions.stdin = None;
        }
    }

    /// Cancel pending work and terminate the process tree.
    pub fn kill(&mut self, executor: &dyn ExecutorBackend, signal: TeardownSignal) -> Result<()> {
        if let Some((_, timer)) = self.delay_timer.take() {
            timer.abort();
            debug!(command = %self.name, "delayed start cancelled");
        }
        if let Some(idle) = &mut self.idle {
            idle.stop();
        }
        if let Some(prober) = &mut self.prober {
            prober.stop();
        }

        match self.pid() {
            Some(pid) => {
                info!(command = %self.name, pid, %signal, "killing process tree");
                executor.kill_tree(pid, signal)
            }
            None => {
                if self.is_running() {
                    warn!(command = %self.name, "running process has no pid; cannot signal it");
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("command_line", &self.command_line())
            .field("pid", &self.pid())
            .field("run_id", &self.run_id())
            .field("muted", &self.spec.muted)
            .field("pending_delay", &self.has_pending_delay())
            .finish_non_exhaustive()
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        if let Some((_, timer)) = self.delay_timer.take() {
            timer.abort();
        }
    }
}

fn parse_color(color: Option<&str>) -> Result<Option<ColorChain>> {
    color
        .map(|c| c.parse::<ColorChain>())
        .transpose()
        .map_err(TandemError::ConfigError)
}
