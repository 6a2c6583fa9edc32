// tests/prober.rs

mod common;
use crate::common::{init_tracing, ms, recorder, FakeConnector};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::sleep;

use tandem::probe::{ProbeConfig, ProbeEvent, ProbeMachine, ProbeState, Prober};

fn prober(connector: &FakeConnector, attempts: u32) -> Prober {
    let config = ProbeConfig::new("127.0.0.1", 9999)
        .attempts(attempts)
        .retry_delay(ms(100));
    Prober::new(config, Arc::new(connector.clone()))
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_attempt_ceiling() {
    init_tracing();

    let connector = FakeConnector::refusing();
    let mut prober = prober(&connector, 3);
    let (events, handler) = recorder::<ProbeEvent>();
    prober.subscribe(handler);
    prober.enable();
    assert!(prober.start());

    sleep(ms(2000)).await;

    let events = events.lock().unwrap();
    let retries = events
        .iter()
        .filter(|e| matches!(e, ProbeEvent::Retry { .. }))
        .count();
    let destroyed = events
        .iter()
        .filter(|e| matches!(e, ProbeEvent::Destroyed { .. }))
        .count();

    assert_eq!(retries, 3);
    assert_eq!(destroyed, 1);
    assert_eq!(events.last(), Some(&ProbeEvent::Destroyed { attempts: 3 }));
    assert_eq!(connector.attempts(), 3);
    assert_eq!(prober.state(), ProbeState::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn connects_on_nth_attempt() {
    let connector = FakeConnector::succeed_on(2);
    let mut prober = prober(&connector, 5);
    let (events, handler) = recorder::<ProbeEvent>();
    prober.subscribe(handler);

    let connected = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connected);
    prober.on_connected(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    prober.enable();
    prober.start();

    sleep(ms(1000)).await;

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            ProbeEvent::Retry { attempt: 1 },
            ProbeEvent::Failed {
                attempt: 1,
                error: "connection refused (127.0.0.1:9999)".to_string()
            },
            ProbeEvent::Retry { attempt: 2 },
            ProbeEvent::Connected { attempt: 2 },
        ]
    );
    assert_eq!(connected.load(Ordering::SeqCst), 1);
    assert!(prober.is_connected());
    assert!(!prober.retry(), "retry is a no-op once connected");
}

#[tokio::test(start_paused = true)]
async fn start_is_gated_by_enable() {
    let connector = FakeConnector::refusing();
    let mut prober = prober(&connector, 3);

    assert!(!prober.start());
    sleep(ms(500)).await;
    assert_eq!(connector.attempts(), 0);
    assert_eq!(prober.state(), ProbeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn disable_keeps_inflight_chain() {
    let connector = FakeConnector::refusing();
    let mut prober = prober(&connector, 2);
    prober.enable();
    prober.start();
    prober.disable();

    sleep(ms(1000)).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(prober.state(), ProbeState::Destroyed);
    assert!(!prober.start());
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_the_chain() {
    let connector = FakeConnector::refusing();
    let mut prober = prober(&connector, 10);
    prober.enable();
    prober.start();

    sleep(ms(150)).await;
    prober.stop();
    let seen = connector.attempts();

    sleep(ms(2000)).await;
    assert_eq!(connector.attempts(), seen);
    assert_eq!(prober.state(), ProbeState::Idle);
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_handler_is_not_called() {
    let connector = FakeConnector::succeed_on(1);
    let mut prober = prober(&connector, 1);
    let (events, handler) = recorder::<ProbeEvent>();
    let id = prober.subscribe(handler);
    assert!(prober.unsubscribe(id));

    prober.enable();
    prober.start();
    sleep(ms(100)).await;
    assert!(events.lock().unwrap().is_empty());
    assert!(prober.is_connected());
}

#[test]
fn machine_ceiling_of_zero_allows_one_attempt() {
    let mut machine = ProbeMachine::new(0);
    assert_eq!(machine.begin_attempt(), Some(ProbeEvent::Retry { attempt: 1 }));
    assert_eq!(machine.begin_attempt(), None, "already probing");

    let events = machine.fail("refused");
    assert_eq!(events.len(), 2);
    assert_eq!(machine.state(), ProbeState::Destroyed);
    assert_eq!(machine.begin_attempt(), None);
}
