// src/engine/runtime.rs

use std::fmt;

use tracing::{debug, info, warn};

use crate::errors::{Result, TandemError};
use crate::orchestrator::Orchestrator;
use crate::types::TeardownSignal;

use super::{RuntimeEvent, RuntimeOptions, RuntimeReceiver};

/// Whether the loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Drives the [`Orchestrator`] in response to `RuntimeEvent`s.
///
/// This is also the shutdown coordinator: it decides when the host should
/// stop (registry emptied by kills, a teardown signal, or, with
/// `exit_when_idle`, nothing left to do). The orchestrator itself never
/// exits the process.
pub struct Runtime {
    orchestrator: Orchestrator,
    event_rx: RuntimeReceiver,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("orchestrator", &self.orchestrator)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(orchestrator: Orchestrator, event_rx: RuntimeReceiver, options: RuntimeOptions) -> Self {
        Self {
            orchestrator,
            event_rx,
            options,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    pub fn into_orchestrator(self) -> Orchestrator {
        self.orchestrator
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s until a stop condition holds.
    /// - Feeds each one into the orchestrator.
    /// - Returns early only on output write failures.
    pub async fn run(&mut self) -> Result<()> {
        info!("tandem runtime started");

        if self.should_exit() {
            info!("nothing to supervise; exiting");
            return Ok(());
        }

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if self.handle_event(event)? == Flow::Stop {
                break;
            }
            if self.should_exit() {
                info!(
                    remaining = self.orchestrator.len(),
                    "no commands left to supervise; stopping runtime"
                );
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    fn should_exit(&self) -> bool {
        self.orchestrator.is_empty()
            || (self.options.exit_when_idle && self.orchestrator.is_idle())
    }

    fn handle_event(&mut self, event: RuntimeEvent) -> Result<Flow> {
        match event {
            RuntimeEvent::Output {
                command,
                run_id,
                stream,
                line,
            } => self
                .orchestrator
                .handle_output(&command, run_id, stream, &line)?,
            RuntimeEvent::Exited {
                command,
                run_id,
                exit,
            } => self.orchestrator.handle_exit(&command, run_id, exit)?,
            RuntimeEvent::ProcessError {
                command,
                run_id,
                error,
            } => self
                .orchestrator
                .handle_process_error(&command, run_id, &error)?,
            RuntimeEvent::DelayElapsed { command, ticket } => {
                self.orchestrator.handle_delay_elapsed(&command, ticket)?
            }
            RuntimeEvent::RunRequested { target, reason } => {
                match self.orchestrator.trigger(&target, reason) {
                    Ok(()) => {}
                    Err(TandemError::CommandNotFound(name)) => {
                        warn!(command = %name, ?reason, "run requested for unknown command");
                    }
                    Err(err) => return Err(err),
                }
            }
            RuntimeEvent::KillRequested { targets, signal } => {
                match self.orchestrator.kill(&targets, signal) {
                    Ok(_) => {}
                    Err(TandemError::CommandNotFound(name)) => {
                        warn!(command = %name, "kill requested for unknown command");
                    }
                    Err(err) => return Err(err),
                }
            }
            RuntimeEvent::Input(bytes) => self.orchestrator.forward_input(bytes),
            RuntimeEvent::InputClosed => self.orchestrator.close_input(),
            RuntimeEvent::Signal(signal) => {
                info!(%signal, "teardown signal; killing all commands");
                self.orchestrator.kill_all(signal)?;
                return Ok(Flow::Stop);
            }
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested; killing all commands");
                self.orchestrator.kill_all(TeardownSignal::Terminate)?;
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }
}
