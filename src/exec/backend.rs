// src/exec/backend.rs

//! Pluggable process-execution backend.
//!
//! Commands never touch `tokio::process` directly; they go through an
//! [`ExecutorBackend`]. This makes it easy to swap in a fake executor in
//! tests while keeping the production implementation here.
//!
//! - [`RealExecutorBackend`] runs the command line through the platform
//!   shell with piped stdio. On unix each child leads its own process group
//!   so that [`ExecutorBackend::kill_tree`] reaches grandchildren too.
//! - Tests provide their own backend that hands out in-memory pipes and
//!   records kill requests.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{Result, TandemError};
use crate::types::TeardownSignal;

pub type ProcessReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ProcessWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type ExitFuture = Pin<Box<dyn Future<Output = io::Result<ExitInfo>> + Send>>;

/// Everything needed to start one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Name of the owning command, for diagnostics.
    pub name: String,
    /// Shell command line, handed to the shell as-is.
    pub command_line: String,
    /// Arguments appended to `command_line`, each passed as one word.
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl SpawnRequest {
    /// The line the shell runs: `command_line` plus the quoted `args`.
    pub fn shell_line(&self) -> String {
        join_shell_line(&self.command_line, &self.args)
    }
}

/// Append `args` to a shell command line, each quoted as one word.
pub fn join_shell_line(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let quoted = shell_words::join(args);
    if command.is_empty() {
        return quoted;
    }
    format!("{command} {quoted}")
}

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    /// Raw signal number, when the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signalled(signal: TeardownSignal) -> Self {
        Self {
            code: None,
            signal: Some(signal.as_raw()),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The handled teardown signal that ended the process, if any.
    pub fn teardown_signal(&self) -> Option<TeardownSignal> {
        self.signal.and_then(TeardownSignal::from_raw)
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// A started process: its pipes plus a future resolving on exit.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub stdout: Option<ProcessReader>,
    pub stderr: Option<ProcessReader>,
    pub stdin: Option<ProcessWriter>,
    pub exit: ExitFuture,
}

impl std::fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

/// Trait abstracting how command processes are started and stopped.
pub trait ExecutorBackend: Send + Sync {
    /// Start a process. Must be called from within a Tokio runtime.
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess>;

    /// Deliver `signal` to the process and all of its descendants.
    fn kill_tree(&self, pid: u32, signal: TeardownSignal) -> Result<()>;
}

/// Real executor backend used in production.
#[derive(Debug, Clone, Default)]
pub struct RealExecutorBackend;

impl RealExecutorBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(request: &SpawnRequest) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&request.command_line).args(&request.args);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(request.shell_line());
        c
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess> {
        let mut cmd = shell_command(request);

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped())
            .envs(&request.env)
            .kill_on_drop(true);

        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        #[cfg(unix)]
        {
            cmd.process_group(0);
            if let Some(uid) = request.uid {
                cmd.uid(uid);
            }
            if let Some(gid) = request.gid {
                cmd.gid(gid);
            }
        }

        let mut child = cmd.spawn().map_err(|source| TandemError::Spawn {
            command: request.name.clone(),
            source,
        })?;

        let pid = child.id();
        info!(
            command = %request.name,
            pid = ?pid,
            cmd = %request.shell_line(),
            "process started"
        );

        let stdout = child.stdout.take().map(|s| Box::new(s) as ProcessReader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as ProcessReader);
        let stdin = child.stdin.take().map(|s| Box::new(s) as ProcessWriter);

        let exit: ExitFuture = Box::pin(async move { child.wait().await.map(ExitInfo::from) });

        Ok(SpawnedProcess {
            pid,
            stdout,
            stderr,
            stdin,
            exit,
        })
    }

    #[cfg(unix)]
    fn kill_tree(&self, pid: u32, signal: TeardownSignal) -> Result<()> {
        let pgid = pid as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
        // addresses the process group led by `pid`.
        let rc = unsafe { libc::kill(-pgid, signal.as_raw()) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                debug!(pid, %signal, "process group already gone");
                return Ok(());
            }
            return Err(err.into());
        }
        debug!(pid, %signal, "signalled process group");
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_tree(&self, pid: u32, signal: TeardownSignal) -> Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        debug!(pid, %signal, success = status.success(), "taskkill finished");
        Ok(())
    }
}
