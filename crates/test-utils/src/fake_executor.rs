use std::collections::HashMap;
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tandem::errors::{Result, TandemError};
use tandem::exec::{ExecutorBackend, ExitFuture, ExitInfo, SpawnRequest, SpawnedProcess};
use tandem::types::TeardownSignal;

/// What a fake process does once spawned.
///
/// Output is handed out in one go; the process then either exits with
/// `exit` or, when `exit` is `None`, stays alive until killed.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    pub stdout: String,
    pub stderr: String,
    pub exit: Option<ExitInfo>,
    pub fail_spawn: bool,
}

impl FakeScript {
    /// Silent and long-running.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout(mut self, text: &str) -> Self {
        self.stdout = text.to_string();
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        self.stderr = text.to_string();
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit = Some(ExitInfo::code(code));
        self
    }

    pub fn exit_by_signal(mut self, signal: TeardownSignal) -> Self {
        self.exit = Some(ExitInfo::signalled(signal));
        self
    }

    pub fn fail_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, FakeScript>,
    default_script: FakeScript,
    next_pid: u32,
    spawned: Vec<SpawnRequest>,
    kills: Vec<(u32, TeardownSignal)>,
    live: HashMap<u32, oneshot::Sender<ExitInfo>>,
    stdin: HashMap<String, Arc<Mutex<Vec<u8>>>>,
}

/// A fake executor that:
/// - records every spawn request and kill,
/// - serves scripted stdout/stderr from memory,
/// - resolves a process's exit when it is killed (or per its script),
/// - captures whatever is written to each process's stdin.
///
/// Scripts are matched by command name first, then by command line.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        let executor = Self::default();
        executor.inner.lock().unwrap().next_pid = 1000;
        executor
    }

    pub fn script(self, command: &str, script: FakeScript) -> Self {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(command.to_string(), script);
        self
    }

    /// Script used for commands without their own.
    pub fn default_script(self, script: FakeScript) -> Self {
        self.inner.lock().unwrap().default_script = script;
        self
    }

    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.inner.lock().unwrap().spawned.clone()
    }

    /// Spawns whose name or command line equals `command`.
    pub fn spawn_count(&self, command: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .spawned
            .iter()
            .filter(|r| r.name == command || r.shell_line() == command)
            .count()
    }

    pub fn kills(&self) -> Vec<(u32, TeardownSignal)> {
        self.inner.lock().unwrap().kills.clone()
    }

    /// Bytes written so far to `command`'s stdin.
    pub fn stdin_of(&self, command: &str) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap()
            .stdin
            .get(command)
            .map(|buf| buf.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Pids of processes that are still waiting to be killed.
    pub fn live_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.inner.lock().unwrap().live.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// End a long-running process as if it exited on its own.
    pub fn finish(&self, pid: u32, exit: ExitInfo) -> bool {
        match self.inner.lock().unwrap().live.remove(&pid) {
            Some(tx) => tx.send(exit).is_ok(),
            None => false,
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn(&self, request: &SpawnRequest) -> Result<SpawnedProcess> {
        let mut inner = self.inner.lock().unwrap();
        inner.spawned.push(request.clone());

        let script = inner
            .scripts
            .get(&request.name)
            .or_else(|| inner.scripts.get(&request.shell_line()))
            .unwrap_or(&inner.default_script)
            .clone();

        if script.fail_spawn {
            return Err(TandemError::Spawn {
                command: request.name.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            });
        }

        let pid = inner.next_pid;
        inner.next_pid += 1;

        let captured = Arc::new(Mutex::new(Vec::new()));
        inner
            .stdin
            .insert(request.name.clone(), Arc::clone(&captured));
        let (stdin, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok(n) = server.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                captured.lock().unwrap().extend_from_slice(&buf[..n]);
            }
        });

        let exit: ExitFuture = match script.exit {
            Some(info) => Box::pin(async move { Ok(info) }),
            None => {
                let (tx, rx) = oneshot::channel();
                inner.live.insert(pid, tx);
                Box::pin(async move {
                    rx.await
                        .map_err(|_| io::Error::new(io::ErrorKind::Other, "fake process lost"))
                })
            }
        };

        Ok(SpawnedProcess {
            pid: Some(pid),
            stdout: Some(Box::new(Cursor::new(script.stdout.into_bytes()))),
            stderr: Some(Box::new(Cursor::new(script.stderr.into_bytes()))),
            stdin: Some(Box::new(stdin)),
            exit,
        })
    }

    fn kill_tree(&self, pid: u32, signal: TeardownSignal) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.kills.push((pid, signal));
        if let Some(tx) = inner.live.remove(&pid) {
            let _ = tx.send(ExitInfo::signalled(signal));
        }
        Ok(())
    }
}
