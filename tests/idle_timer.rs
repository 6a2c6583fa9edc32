// tests/idle_timer.rs

mod common;
use crate::common::{init_tracing, ms, recorder};

use tokio::time::{sleep, Instant};

use tandem::idle::{IdleConfig, IdleEvent, IdleMachine, IdleSnapshot, IdleState, IdleTimer, default_stale};

fn conditions(events: &[IdleEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, IdleEvent::Condition { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn condition_waits_for_updates_to_stop() {
    init_tracing();

    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)).timeout(ms(1000)));
    let (events, handler) = recorder::<IdleEvent>();
    timer.subscribe(handler);
    timer.enable();
    assert!(timer.start());

    for i in 0..15 {
        timer.update(Some(&format!("line {i}")));
        sleep(ms(50)).await;
        assert_eq!(
            conditions(&events.lock().unwrap()),
            0,
            "condition fired while updates were still arriving"
        );
    }

    let last_update = Instant::now() - ms(50);
    while conditions(&events.lock().unwrap()) == 0 {
        sleep(ms(10)).await;
    }
    let fired_after = Instant::now() - last_update;

    // Stale means "no update since the previous tick", so the condition
    // lands one or two ticks after the last update (plus polling slack).
    assert!(fired_after >= ms(100), "fired {fired_after:?} after the last update");
    assert!(fired_after <= ms(210), "fired {fired_after:?} after the last update");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        IdleEvent::Condition {
            payload, updates, ..
        } => {
            assert_eq!(payload.as_deref(), Some("line 14"));
            assert_eq!(*updates, 15);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(timer.state(), IdleState::Finished);
}

#[tokio::test(start_paused = true)]
async fn expires_once_without_updates() {
    init_tracing();

    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)).timeout(ms(300)));
    let (events, handler) = recorder::<IdleEvent>();
    timer.subscribe(handler);
    timer.enable();
    timer.start();

    sleep(ms(1000)).await;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], IdleEvent::Expired { updates: 0, .. }));
    assert_eq!(timer.state(), IdleState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn custom_predicate_replaces_default() {
    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)));
    timer.set_predicate(|s: &IdleSnapshot| s.ticks >= 3);
    let (events, handler) = recorder::<IdleEvent>();
    timer.subscribe(handler);
    timer.enable();
    timer.start();

    sleep(ms(250)).await;
    assert!(events.lock().unwrap().is_empty());

    sleep(ms(100)).await;
    let events = events.lock().unwrap();
    assert!(matches!(events[0], IdleEvent::Condition { ticks: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn disabled_timer_ignores_start() {
    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)));
    assert!(!timer.start());
    assert_eq!(timer.state(), IdleState::Stopped);

    timer.enable();
    assert!(timer.start());
    assert!(timer.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_silences_the_timer() {
    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)).timeout(ms(200)));
    let (events, handler) = recorder::<IdleEvent>();
    timer.subscribe(handler);
    timer.enable();
    timer.start();
    timer.update(None);

    timer.stop();
    timer.stop();
    assert_eq!(timer.state(), IdleState::Stopped);

    sleep(ms(1000)).await;
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn on_condition_receives_last_payload() {
    let mut timer = IdleTimer::new(IdleConfig::new(ms(100)));
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<Option<String>>::new()));
    let sink = seen.clone();
    let id = timer.on_condition(move |payload| sink.lock().unwrap().push(payload.map(str::to_string)));
    timer.enable();
    timer.start();
    timer.update(Some("ready"));

    sleep(ms(500)).await;
    assert_eq!(*seen.lock().unwrap(), vec![Some("ready".to_string())]);
    assert!(timer.unsubscribe(id));
    assert!(!timer.unsubscribe(id));
}

#[test]
fn machine_uses_previous_tick_as_baseline() {
    let mut machine = IdleMachine::new();
    assert!(machine.tick(ms(100), &default_stale).is_none(), "no updates yet");

    machine.update(Some("a".into()));
    assert!(machine.tick(ms(200), &default_stale).is_none(), "counter moved");

    let event = machine.tick(ms(300), &default_stale);
    assert!(matches!(
        event,
        Some(IdleEvent::Condition { updates: 1, ticks: 3, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn zero_tick_runs_at_the_minimum_tick() {
    init_tracing();

    let mut timer = IdleTimer::new(IdleConfig::new(ms(0)));
    let (events, handler) = recorder::<IdleEvent>();
    timer.subscribe(handler);
    timer.enable();
    assert!(timer.start());

    timer.update(Some("only line"));
    sleep(ms(10)).await;

    assert_eq!(conditions(&events.lock().unwrap()), 1);
    assert_eq!(timer.state(), IdleState::Finished);
    assert!(!timer.is_running());
}
