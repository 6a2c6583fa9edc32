// src/probe/mod.rs

//! TCP readiness prober.
//!
//! A [`Prober`] repeatedly tries to connect to `host:port` until it succeeds
//! or the attempt ceiling is reached, publishing [`ProbeEvent`]s to its
//! observers along the way:
//!
//! ```text
//! Idle --start()--> Probing --ok--> Connected
//!                     |  ^
//!                fail |  | retry_delay
//!                     v  |
//!               RetryScheduled
//!                     |
//!          attempts reached --> Destroyed
//! ```
//!
//! The transitions live in the pure [`ProbeMachine`]; the async chain that
//! performs connects and sleeps is spawned by [`Prober::start`].

pub mod connector;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::observer::{Observers, SubscriptionId};

pub use connector::{SocketConnector, TcpConnector};

/// Where to probe and how persistently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub host: String,
    pub port: u16,
    /// Maximum number of connection attempts before giving up.
    pub attempts: u32,
    pub retry_delay: Duration,
    /// Command to run once the endpoint is reachable.
    pub target: Option<String>,
}

impl ProbeConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            attempts: 10,
            retry_delay: Duration::from_millis(1000),
            target: None,
        }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Probing,
    RetryScheduled,
    Connected,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    /// A connection attempt is starting (1-based).
    Retry { attempt: u32 },
    Failed { attempt: u32, error: String },
    Connected { attempt: u32 },
    /// The ceiling was reached; no further attempts will be made.
    Destroyed { attempts: u32 },
}

/// Pure probe state machine.
#[derive(Debug, Clone)]
pub struct ProbeMachine {
    state: ProbeState,
    attempt: u32,
    ceiling: u32,
}

impl ProbeMachine {
    /// A ceiling of zero is treated as one attempt.
    pub fn new(ceiling: u32) -> Self {
        Self {
            state: ProbeState::Idle,
            attempt: 0,
            ceiling: ceiling.max(1),
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Attempts made in the current chain.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.state = ProbeState::Idle;
        self.attempt = 0;
    }

    /// Begin the next attempt, or `None` if the machine is connected,
    /// exhausted, or already mid-attempt.
    pub fn begin_attempt(&mut self) -> Option<ProbeEvent> {
        match self.state {
            ProbeState::Idle | ProbeState::RetryScheduled => {
                self.attempt += 1;
                self.state = ProbeState::Probing;
                Some(ProbeEvent::Retry {
                    attempt: self.attempt,
                })
            }
            ProbeState::Probing | ProbeState::Connected | ProbeState::Destroyed => None,
        }
    }

    pub fn succeed(&mut self) -> ProbeEvent {
        let attempt = self.attempt;
        self.state = ProbeState::Connected;
        self.attempt = 0;
        ProbeEvent::Connected { attempt }
    }

    /// Record a failed attempt. Returns `Failed`, followed by `Destroyed`
    /// when the ceiling has been reached.
    pub fn fail(&mut self, error: impl Into<String>) -> Vec<ProbeEvent> {
        let mut events = vec![ProbeEvent::Failed {
            attempt: self.attempt,
            error: error.into(),
        }];

        if self.attempt >= self.ceiling {
            self.state = ProbeState::Destroyed;
            events.push(ProbeEvent::Destroyed {
                attempts: self.attempt,
            });
        } else {
            self.state = ProbeState::RetryScheduled;
        }

        events
    }
}

/// Retrying TCP-connect prober.
pub struct Prober {
    config: ProbeConfig,
    connector: Arc<dyn SocketConnector>,
    machine: Arc<Mutex<ProbeMachine>>,
    observers: Observers<ProbeEvent>,
    active: bool,
    chain: Option<JoinHandle<()>>,
}

impl Prober {
    pub fn new(config: ProbeConfig, connector: Arc<dyn SocketConnector>) -> Self {
        let machine = ProbeMachine::new(config.attempts);
        Self {
            config,
            connector,
            machine: Arc::new(Mutex::new(machine)),
            observers: Observers::new(),
            active: false,
            chain: None,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn observers(&self) -> &Observers<ProbeEvent> {
        &self.observers
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&ProbeEvent) + Send + 'static,
    {
        self.observers.subscribe(handler)
    }

    /// Subscribe to the `Connected` event only.
    pub fn on_connected<F>(&self, mut handler: F) -> SubscriptionId
    where
        F: FnMut() + Send + 'static,
    {
        self.observers.subscribe(move |event| {
            if matches!(event, ProbeEvent::Connected { .. }) {
                handler();
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Allow future `start()` calls. Does not start anything by itself.
    pub fn enable(&mut self) {
        self.active = true;
    }

    /// Gate future `start()` calls; an in-flight chain keeps running.
    pub fn disable(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> ProbeState {
        lock(&self.machine).state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ProbeState::Connected
    }

    fn chain_in_flight(&self) -> bool {
        self.chain.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Reset and begin probing. Returns `false` if the prober is disabled.
    pub fn start(&mut self) -> bool {
        if !self.active {
            debug!(
                host = %self.config.host,
                port = self.config.port,
                "prober disabled; ignoring start"
            );
            return false;
        }

        if let Some(chain) = self.chain.take() {
            chain.abort();
        }
        lock(&self.machine).reset();

        info!(
            host = %self.config.host,
            port = self.config.port,
            attempts = self.config.attempts,
            "starting readiness probe"
        );
        self.spawn_chain();
        true
    }

    /// Resume probing without resetting the attempt count. A no-op while
    /// connected or while a chain is already in flight.
    pub fn retry(&mut self) -> bool {
        if self.is_connected() || self.chain_in_flight() {
            return false;
        }
        self.spawn_chain();
        true
    }

    /// Abort any in-flight chain. Safe to call in every state.
    pub fn stop(&mut self) {
        if let Some(chain) = self.chain.take() {
            chain.abort();
        }
        let mut machine = lock(&self.machine);
        if machine.state() != ProbeState::Connected {
            machine.reset();
        }
    }

    fn spawn_chain(&mut self) {
        let host = self.config.host.clone();
        let port = self.config.port;
        let delay = self.config.retry_delay;
        let connector = Arc::clone(&self.connector);
        let machine = Arc::clone(&self.machine);
        let observers = self.observers.clone();

        self.chain = Some(tokio::spawn(async move {
            probe_chain(host, port, delay, connector, machine, observers).await;
        }));
    }
}

impl Drop for Prober {
    fn drop(&mut self) {
        if let Some(chain) = self.chain.take() {
            chain.abort();
        }
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prober")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

async fn probe_chain(
    host: String,
    port: u16,
    delay: Duration,
    connector: Arc<dyn SocketConnector>,
    machine: Arc<Mutex<ProbeMachine>>,
    observers: Observers<ProbeEvent>,
) {
    loop {
        let Some(started) = lock(&machine).begin_attempt() else {
            break;
        };
        debug!(%host, port, ?started, "probe attempt");
        observers.emit(&started);

        match connector.connect(&host, port).await {
            Ok(()) => {
                let connected = lock(&machine).succeed();
                info!(%host, port, "probe target reachable");
                observers.emit(&connected);
                break;
            }
            Err(err) => {
                let events = lock(&machine).fail(err.to_string());
                let exhausted = events
                    .iter()
                    .any(|e| matches!(e, ProbeEvent::Destroyed { .. }));
                for event in &events {
                    observers.emit(event);
                }
                if exhausted {
                    warn!(%host, port, error = %err, "probe attempts exhausted");
                    break;
                }
                debug!(%host, port, error = %err, ?delay, "probe failed; retrying");
                sleep(delay).await;
            }
        }
    }
}

fn lock(machine: &Mutex<ProbeMachine>) -> MutexGuard<'_, ProbeMachine> {
    machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
