// src/command/subscribe.rs

//! Stream subscriptions for one spawned process.
//!
//! [`subscribe`] takes ownership of a [`SpawnedProcess`] and wires it into
//! the runtime channel:
//! - one reader task per output pipe, sending each line as
//!   `RuntimeEvent::Output`;
//! - a waiter task that resolves the exit future, gives the readers a short
//!   grace period to flush, then sends `Exited` or `ProcessError`;
//! - a stdin writer task fed through an unbounded channel.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, RuntimeSender};
use crate::exec::{ProcessReader, ProcessWriter, SpawnedProcess};
use crate::types::StreamKind;

/// How long the waiter lets readers drain after the process exits. Readers
/// can outlive this when a grandchild keeps the pipe open.
const READER_DRAIN: Duration = Duration::from_millis(250);

/// Handles kept by the owning command while its process is alive.
#[derive(Debug)]
pub struct Subscriptions {
    pub waiter: JoinHandle<()>,
    pub stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
    pub stdin_writer: Option<JoinHandle<()>>,
}

impl Subscriptions {
    /// Detach from the process. The waiter is left running so the exit is
    /// still observed; only stdin forwarding stops.
    pub fn release(self) {
        drop(self.stdin);
        if let Some(writer) = self.stdin_writer {
            writer.abort();
        }
    }
}

pub fn subscribe(
    command: &str,
    run_id: u64,
    process: SpawnedProcess,
    bus: &RuntimeSender,
) -> Subscriptions {
    let SpawnedProcess {
        pid,
        stdout,
        stderr,
        stdin,
        exit,
    } = process;

    let mut readers = Vec::new();
    if let Some(stdout) = stdout {
        readers.push(spawn_reader(command, run_id, StreamKind::Stdout, stdout, bus));
    }
    if let Some(stderr) = stderr {
        readers.push(spawn_reader(command, run_id, StreamKind::Stderr, stderr, bus));
    }

    let (stdin_tx, stdin_writer) = match stdin {
        Some(sink) => {
            let (tx, handle) = spawn_stdin_writer(command, sink);
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    let name = command.to_string();
    let tx = bus.clone();
    let waiter = tokio::spawn(async move {
        let status = exit.await;

        for reader in readers {
            if timeout(READER_DRAIN, reader).await.is_err() {
                debug!(command = %name, run_id, "reader still open after exit; detaching");
            }
        }

        let event = match status {
            Ok(exit) => {
                debug!(command = %name, run_id, pid = ?pid, ?exit, "process exited");
                RuntimeEvent::Exited {
                    command: name,
                    run_id,
                    exit,
                }
            }
            Err(err) => {
                warn!(command = %name, run_id, error = %err, "waiting for process failed");
                RuntimeEvent::ProcessError {
                    command: name,
                    run_id,
                    error: err.to_string(),
                }
            }
        };
        let _ = tx.send(event);
    });

    Subscriptions {
        waiter,
        stdin: stdin_tx,
        stdin_writer,
    }
}

fn spawn_reader(
    command: &str,
    run_id: u64,
    stream: StreamKind,
    pipe: ProcessReader,
    bus: &RuntimeSender,
) -> JoinHandle<()> {
    let name = command.to_string();
    let tx = bus.clone();

    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    let event = RuntimeEvent::Output {
                        command: name.clone(),
                        run_id,
                        stream,
                        line,
                    };
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(command = %name, ?stream, error = %err, "read error; closing stream");
                    break;
                }
            }
        }

        debug!(command = %name, ?stream, "stream closed");
    })
}

fn spawn_stdin_writer(
    command: &str,
    mut sink: ProcessWriter,
) -> (mpsc::UnboundedSender<Vec<u8>>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let name = command.to_string();

    let handle = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(err) = sink.write_all(&bytes).await {
                debug!(command = %name, error = %err, "stdin closed");
                return;
            }
            let _ = sink.flush().await;
        }
        // Sender dropped: close the child's stdin so it sees EOF.
        let _ = sink.shutdown().await;
    });

    (tx, handle)
}
