// src/engine/mod.rs

//! Orchestration engine for tandem.
//!
//! Every asynchronous notification in the system (process output and exit,
//! probe and idle-timer completions, delayed spawns, stdin input, teardown
//! signals) is turned into a [`RuntimeEvent`] and sent over one unbounded
//! channel. The [`Runtime`] loop owns the `Orchestrator` and applies those
//! events one at a time, so registry state is only ever touched from a
//! single task.

use tokio::sync::mpsc;

use crate::exec::ExitInfo;
use crate::types::{StreamKind, TeardownSignal};

/// Canonical command name type used throughout the engine.
pub type CommandName = String;

/// Sending half of the runtime channel, shared by every producer.
pub type RuntimeSender = mpsc::UnboundedSender<RuntimeEvent>;
pub type RuntimeReceiver = mpsc::UnboundedReceiver<RuntimeEvent>;

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested through the API.
    Manual,
    /// The readiness probe of another command connected.
    ProbeConnected,
    /// The output of another command went idle.
    IdleCondition,
}

/// Runtime options for the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Exit once no command has a live process, a pending delayed start,
    /// or an active probe/idle timer.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// One line (newline included, if any) read from a command's pipe.
    Output {
        command: CommandName,
        run_id: u64,
        stream: StreamKind,
        line: String,
    },
    /// A command's process exited.
    Exited {
        command: CommandName,
        run_id: u64,
        exit: ExitInfo,
    },
    /// Waiting on a command's process failed.
    ProcessError {
        command: CommandName,
        run_id: u64,
        error: String,
    },
    /// A delayed start is due.
    DelayElapsed { command: CommandName, ticket: u64 },
    /// Run `target` (dependency chaining).
    RunRequested {
        target: CommandName,
        reason: TriggerReason,
    },
    /// Kill these commands (all current ones when empty).
    KillRequested {
        targets: Vec<CommandName>,
        signal: TeardownSignal,
    },
    /// Bytes read from our own stdin, for the pipe-input command.
    Input(Vec<u8>),
    /// Our stdin reached end of file.
    InputClosed,
    /// A teardown signal was delivered to this process.
    Signal(TeardownSignal),
    /// Graceful shutdown requested through the API.
    ShutdownRequested,
}

/// Create the runtime channel.
pub fn channel() -> (RuntimeSender, RuntimeReceiver) {
    mpsc::unbounded_channel()
}

pub mod runtime;

pub use runtime::Runtime;
