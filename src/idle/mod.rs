// src/idle/mod.rs

//! Idle-output detection timer.
//!
//! An [`IdleTimer`] watches a stream of `update()` calls (one per output
//! line of the owning command) and fires [`IdleEvent::Condition`] once the
//! stream has gone quiet for a full tick, or [`IdleEvent::Expired`] when the
//! absolute timeout elapses first.
//!
//! Counting happens in the pure [`IdleMachine`]; the tick/timeout timers
//! run in a background task spawned by [`IdleTimer::start`], which owns the
//! machine for the lifetime of one run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::observer::{Observers, SubscriptionId};

/// Shortest tick the timer runs with; a zero tick is raised to this.
pub const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    /// How often the stale predicate is evaluated.
    pub tick: Duration,
    /// Absolute deadline measured from `start()`.
    pub timeout: Option<Duration>,
    /// Command to run once the stream goes idle.
    pub target: Option<String>,
}

impl IdleConfig {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            timeout: None,
            target: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Counters handed to the stale predicate on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSnapshot {
    /// Updates seen since `start()`.
    pub updates: u64,
    /// Value of `updates` at the previous tick.
    pub previous: u64,
    /// Ticks elapsed, including the current one.
    pub ticks: u64,
    pub elapsed: Duration,
}

pub type StalePredicate = Arc<dyn Fn(&IdleSnapshot) -> bool + Send + Sync>;

/// At least one update overall, and none since the previous tick.
pub fn default_stale(snapshot: &IdleSnapshot) -> bool {
    snapshot.updates > 0 && snapshot.updates == snapshot.previous
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    Condition {
        /// Payload of the most recent update.
        payload: Option<String>,
        elapsed: Duration,
        updates: u64,
        ticks: u64,
    },
    Expired {
        elapsed: Duration,
        updates: u64,
        ticks: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Stopped,
    Running,
    Finished,
}

/// Pure counting state for one timer run.
#[derive(Debug, Clone, Default)]
pub struct IdleMachine {
    updates: u64,
    previous: u64,
    ticks: u64,
    last_payload: Option<String>,
}

impl IdleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, payload: Option<String>) {
        self.updates += 1;
        if payload.is_some() {
            self.last_payload = payload;
        }
    }

    pub fn snapshot(&self, elapsed: Duration) -> IdleSnapshot {
        IdleSnapshot {
            updates: self.updates,
            previous: self.previous,
            ticks: self.ticks,
            elapsed,
        }
    }

    /// Evaluate one tick. Returns `Condition` when the predicate holds;
    /// otherwise the current count becomes the next tick's baseline.
    pub fn tick(
        &mut self,
        elapsed: Duration,
        stale: &dyn Fn(&IdleSnapshot) -> bool,
    ) -> Option<IdleEvent> {
        self.ticks += 1;
        let snapshot = self.snapshot(elapsed);

        if stale(&snapshot) {
            return Some(IdleEvent::Condition {
                payload: self.last_payload.clone(),
                elapsed,
                updates: self.updates,
                ticks: self.ticks,
            });
        }

        self.previous = self.updates;
        None
    }

    pub fn expire(&self, elapsed: Duration) -> IdleEvent {
        IdleEvent::Expired {
            elapsed,
            updates: self.updates,
            ticks: self.ticks,
        }
    }
}

struct RunningTimer {
    updates: mpsc::UnboundedSender<Option<String>>,
    state: watch::Receiver<IdleState>,
    task: JoinHandle<()>,
}

/// Tick-based stale-stream detector.
pub struct IdleTimer {
    config: IdleConfig,
    observers: Observers<IdleEvent>,
    predicate: StalePredicate,
    active: bool,
    running: Option<RunningTimer>,
}

impl IdleTimer {
    pub fn new(config: IdleConfig) -> Self {
        Self {
            config,
            observers: Observers::new(),
            predicate: Arc::new(default_stale),
            active: false,
            running: None,
        }
    }

    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    pub fn observers(&self) -> &Observers<IdleEvent> {
        &self.observers
    }

    /// Replace the default stale check. Takes effect on the next `start()`.
    pub fn set_predicate<F>(&mut self, predicate: F)
    where
        F: Fn(&IdleSnapshot) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: FnMut(&IdleEvent) + Send + 'static,
    {
        self.observers.subscribe(handler)
    }

    /// Subscribe to the `Condition` event only; the handler gets the last
    /// update payload.
    pub fn on_condition<F>(&self, mut handler: F) -> SubscriptionId
    where
        F: FnMut(Option<&str>) + Send + 'static,
    {
        self.observers.subscribe(move |event| {
            if let IdleEvent::Condition { payload, .. } = event {
                handler(payload.as_deref());
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn enable(&mut self) {
        self.active = true;
    }

    pub fn disable(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> IdleState {
        match &self.running {
            // A loop that ended without reporting a terminal state is stopped.
            Some(running) if running.task.is_finished() => match *running.state.borrow() {
                IdleState::Running => IdleState::Stopped,
                state => state,
            },
            Some(running) => *running.state.borrow(),
            None => IdleState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == IdleState::Running
    }

    /// Arm the tick and timeout timers. Restarts a timer that is already
    /// running. Returns `false` if the timer is disabled.
    pub fn start(&mut self) -> bool {
        if !self.active {
            debug!("idle timer disabled; ignoring start");
            return false;
        }
        self.stop();

        let tick = self.config.tick.max(MIN_TICK);
        if tick != self.config.tick {
            warn!(configured = ?self.config.tick, ?tick, "idle tick raised to the minimum");
        }

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(IdleState::Running);
        let task = tokio::spawn(idle_loop(
            tick,
            self.config.timeout,
            Arc::clone(&self.predicate),
            self.observers.clone(),
            updates_rx,
            state_tx,
        ));

        debug!(?tick, timeout = ?self.config.timeout, "idle timer started");
        self.running = Some(RunningTimer {
            updates: updates_tx,
            state: state_rx,
            task,
        });
        true
    }

    /// Record activity. Ignored unless the timer is running.
    pub fn update(&self, payload: Option<&str>) {
        if let Some(running) = &self.running {
            let _ = running.updates.send(payload.map(str::to_string));
        }
    }

    /// Clear both timers and all counters. Idempotent.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleTimer")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

async fn idle_loop(
    tick: Duration,
    timeout: Option<Duration>,
    predicate: StalePredicate,
    observers: Observers<IdleEvent>,
    mut updates_rx: mpsc::UnboundedReceiver<Option<String>>,
    state_tx: watch::Sender<IdleState>,
) {
    let started = Instant::now();
    let mut machine = IdleMachine::new();

    let mut ticker = interval_at(started + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = async move {
        match timeout {
            Some(t) => sleep(t).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut updates_open = true;

    loop {
        tokio::select! {
            biased;

            update = updates_rx.recv(), if updates_open => match update {
                Some(payload) => machine.update(payload),
                None => updates_open = false,
            },

            _ = ticker.tick() => {
                if let Some(event) = machine.tick(started.elapsed(), predicate.as_ref()) {
                    info!(?event, "idle condition reached");
                    let _ = state_tx.send(IdleState::Finished);
                    observers.emit(&event);
                    break;
                }
            }

            _ = &mut deadline => {
                let event = machine.expire(started.elapsed());
                warn!(?event, "idle timer expired before the stream went quiet");
                let _ = state_tx.send(IdleState::Stopped);
                observers.emit(&event);
                break;
            }
        }
    }
}
