// src/signals.rs

//! OS teardown signals.
//!
//! On unix SIGINT, SIGHUP and SIGTERM are each turned into a
//! `RuntimeEvent::Signal` carrying the signal that arrived, so the runtime
//! can forward the same signal to every command. Elsewhere only Ctrl-C is
//! observed and reported as [`TeardownSignal::Interrupt`].

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, RuntimeSender};
use crate::types::TeardownSignal;

/// Spawn the listener task. It keeps listening after the first delivery so
/// a second Ctrl-C is still reported.
pub fn spawn_signal_listener(bus: RuntimeSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let signal = match wait_for_teardown_signal().await {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(error = %err, "failed to install signal handlers");
                    return;
                }
            };
            debug!(%signal, "teardown signal received");
            if bus.send(RuntimeEvent::Signal(signal)).is_err() {
                return;
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_teardown_signal() -> std::io::Result<TeardownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let received = tokio::select! {
        _ = sigint.recv() => TeardownSignal::Interrupt,
        _ = sighup.recv() => TeardownSignal::Hangup,
        _ = sigterm.recv() => TeardownSignal::Terminate,
    };
    Ok(received)
}

#[cfg(not(unix))]
async fn wait_for_teardown_signal() -> std::io::Result<TeardownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(TeardownSignal::Interrupt)
}
