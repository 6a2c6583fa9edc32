// tests/runtime_scenarios.rs

mod common;
use crate::common::{
    init_tracing, ms, recorder, with_timeout, FakeConnector, FakeExecutor, FakeScript, HarnessBuilder,
    TestResult,
};

use std::io::Cursor;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use tandem::command::CommandSpec;
use tandem::engine::{RuntimeEvent, RuntimeOptions, RuntimeSender, TriggerReason};
use tandem::exec::ExitInfo;
use tandem::idle::IdleConfig;
use tandem::probe::{ProbeConfig, ProbeEvent};
use tandem::types::TeardownSignal;

const EXIT_WHEN_IDLE: RuntimeOptions = RuntimeOptions { exit_when_idle: true };

fn plain() {
    colored::control::set_override(false);
}

fn shutdown_after(bus: &RuntimeSender, after: Duration) {
    let bus = bus.clone();
    tokio::spawn(async move {
        sleep(after).await;
        let _ = bus.send(RuntimeEvent::ShutdownRequested);
    });
}

fn send_after(bus: &RuntimeSender, after: Duration, event: RuntimeEvent) {
    let bus = bus.clone();
    tokio::spawn(async move {
        sleep(after).await;
        let _ = bus.send(event);
    });
}

#[tokio::test(start_paused = true)]
async fn killing_every_command_stops_the_runtime() -> TestResult {
    init_tracing();
    let mut h = HarnessBuilder::new().build();
    h.orchestrator.add("a")?;
    h.orchestrator.add("b")?;
    h.orchestrator.run::<&str>(&[])?;
    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());

    bus.send(RuntimeEvent::KillRequested {
        targets: vec!["a".into()],
        signal: TeardownSignal::Terminate,
    })?;
    bus.send(RuntimeEvent::KillRequested {
        targets: vec!["b".into()],
        signal: TeardownSignal::Terminate,
    })?;

    with_timeout(runtime.run()).await?;

    assert!(runtime.orchestrator().is_empty());
    assert_eq!(
        executor.kills(),
        vec![(1000, TeardownSignal::Terminate), (1001, TeardownSignal::Terminate)]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn idle_output_starts_the_target_exactly_once() -> TestResult {
    plain();
    let executor = FakeExecutor::new().script("bundler", FakeScript::new().stdout("built in 20ms\n"));
    let mut h = HarnessBuilder::new().executor(executor).build();
    h.orchestrator.add(
        CommandSpec::new("bundler").idle(IdleConfig::new(ms(100)).target("server")),
    )?;
    h.orchestrator.add(CommandSpec::new("server").runnable(false))?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, sink) = h.into_runtime(RuntimeOptions::default());
    shutdown_after(&bus, ms(2000));
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.spawn_count("bundler"), 1);
    assert_eq!(executor.spawn_count("server"), 1);
    assert_eq!(sink.lines(), vec!["[0] built in 20ms"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refused_probe_never_starts_its_target() -> TestResult {
    let mut h = HarnessBuilder::new()
        .connector(FakeConnector::refusing())
        .build();
    let probe = ProbeConfig::new("127.0.0.1", 5432)
        .attempts(2)
        .retry_delay(ms(100))
        .target("web");
    h.orchestrator.add(CommandSpec::new("db").probe(probe))?;
    h.orchestrator.add(CommandSpec::new("web").runnable(false))?;

    let (events, handler) = recorder::<ProbeEvent>();
    if let Some(prober) = h.orchestrator.get("db", true)?.prober() {
        prober.subscribe(handler);
    }
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let connector = h.connector.clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());
    shutdown_after(&bus, ms(1000));
    with_timeout(runtime.run()).await?;

    let events = events.lock().unwrap();
    let retries = events
        .iter()
        .filter(|e| matches!(e, ProbeEvent::Retry { .. }))
        .count();
    assert_eq!(retries, 2);
    assert_eq!(events.last(), Some(&ProbeEvent::Destroyed { attempts: 2 }));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(executor.spawn_count("web"), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn connected_probe_starts_its_target() -> TestResult {
    let mut h = HarnessBuilder::new()
        .connector(FakeConnector::succeed_on(2))
        .build();
    let probe = ProbeConfig::new("127.0.0.1", 5432)
        .attempts(5)
        .retry_delay(ms(100))
        .target("web");
    h.orchestrator.add(CommandSpec::new("db").probe(probe))?;
    h.orchestrator.add(CommandSpec::new("web").runnable(false))?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());
    shutdown_after(&bus, ms(1000));
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.spawn_count("web"), 1);
    assert_eq!(
        runtime.orchestrator().indexes(),
        ["db".to_string(), "web".to_string()]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn raw_mode_passes_output_through_even_when_condensed() -> TestResult {
    let executor = FakeExecutor::new().script(
        "printer",
        FakeScript::new().stdout("loading\u{2026}\n\n\ndone\n").exit_code(0),
    );
    let mut h = HarnessBuilder::new()
        .executor(executor)
        .options(|o| {
            o.raw = true;
            o.condensed = true;
        })
        .build();
    h.orchestrator.add(
        CommandSpec::new("node print.js")
            .alias("printer")
            .condensed(true),
    )?;
    h.orchestrator.run::<&str>(&[])?;

    let (mut runtime, _executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    with_timeout(runtime.run()).await?;

    assert_eq!(sink.contents(), "loading\u{2026}\n\n\ndone\n");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn condensed_output_is_prefixed_and_announced() -> TestResult {
    plain();
    let executor = FakeExecutor::new().script(
        "printer",
        FakeScript::new().stdout("loading\u{2026}\n\n\ndone\n").exit_code(0),
    );
    let mut h = HarnessBuilder::new()
        .executor(executor)
        .options(|o| {
            o.prefix = "[{command}]".into();
            o.condensed = true;
        })
        .build();
    h.orchestrator.add(CommandSpec::new("node print.js").alias("printer"))?;
    h.orchestrator.run::<&str>(&[])?;

    let (mut runtime, _executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    with_timeout(runtime.run()).await?;

    assert_eq!(
        sink.contents(),
        "[printer] loading...\n[printer] done\n[printer] printer exited\n"
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn teardown_signal_kills_everything_quietly() -> TestResult {
    let mut h = HarnessBuilder::new().build();
    h.orchestrator.add("a")?;
    h.orchestrator.add("b")?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, sink) = h.into_runtime(RuntimeOptions::default());
    send_after(&bus, ms(50), RuntimeEvent::Signal(TeardownSignal::Interrupt));
    with_timeout(runtime.run()).await?;

    assert_eq!(
        executor.kills(),
        vec![(1000, TeardownSignal::Interrupt), (1001, TeardownSignal::Interrupt)]
    );
    assert!(runtime.orchestrator().is_empty());
    assert_eq!(sink.contents(), "");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exit_by_signal_has_no_notice() -> TestResult {
    let mut h = HarnessBuilder::new().build();
    h.orchestrator.add("a")?;
    h.orchestrator.run::<&str>(&[])?;

    let executor = h.executor.clone();
    let (mut runtime, _executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    tokio::spawn(async move {
        sleep(ms(100)).await;
        executor.finish(1000, ExitInfo::signalled(TeardownSignal::Terminate));
    });
    with_timeout(runtime.run()).await?;

    assert_eq!(sink.contents(), "");
    assert_eq!(runtime.orchestrator().len(), 1, "exits keep the command registered");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exit_code_is_reported_when_asked() -> TestResult {
    plain();
    let executor =
        FakeExecutor::new().script("job", FakeScript::new().stdout("ok\n").exit_code(3));
    let mut h = HarnessBuilder::new()
        .executor(executor)
        .options(|o| o.output_exit_code = true)
        .build();
    h.orchestrator.add("job")?;
    h.orchestrator.run::<&str>(&[])?;

    let (mut runtime, _executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    with_timeout(runtime.run()).await?;

    assert_eq!(sink.contents(), "[0] ok\n[0] job exited with code 3\n");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn spawn_failure_is_reported_and_others_still_run() -> TestResult {
    plain();
    let executor = FakeExecutor::new()
        .script("broken", FakeScript::new().fail_spawn())
        .script("ok", FakeScript::new().exit_code(0));
    let mut h = HarnessBuilder::new().executor(executor).build();
    h.orchestrator.add("broken")?;
    h.orchestrator.add("ok")?;
    h.orchestrator.run::<&str>(&[])?;

    let (mut runtime, executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.spawn_count("ok"), 1);
    assert_eq!(
        sink.lines(),
        vec![
            "[0] broken errored: Failed to spawn 'broken': scripted spawn failure",
            "[1] ok exited",
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delayed_command_starts_after_its_delay() -> TestResult {
    plain();
    let executor = FakeExecutor::new().script("late", FakeScript::new().exit_code(0));
    let mut h = HarnessBuilder::new().executor(executor).build();
    h.orchestrator.add(CommandSpec::new("late").delay(ms(500)))?;

    let started = Instant::now();
    h.orchestrator.run::<&str>(&[])?;
    assert_eq!(h.executor.spawn_count("late"), 0);
    assert!(!h.orchestrator.is_idle(), "a pending delay counts as work");

    let (mut runtime, executor, sink) = h.into_runtime(EXIT_WHEN_IDLE);
    with_timeout(runtime.run()).await?;

    assert!(started.elapsed() >= ms(500));
    assert_eq!(executor.spawn_count("late"), 1);
    assert_eq!(sink.contents(), "[0] late exited\n");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn killing_a_delayed_command_cancels_its_start() -> TestResult {
    let mut h = HarnessBuilder::new().build();
    h.orchestrator.add(CommandSpec::new("late").delay(ms(500)))?;
    h.orchestrator.add("other")?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());
    send_after(
        &bus,
        ms(100),
        RuntimeEvent::KillRequested {
            targets: vec!["late".into()],
            signal: TeardownSignal::Terminate,
        },
    );
    shutdown_after(&bus, ms(1000));
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.spawn_count("late"), 0);
    assert_eq!(executor.spawn_count("other"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stdin_is_forwarded_to_the_pipe_input_command() -> TestResult {
    let mut h = HarnessBuilder::new()
        .options(|o| o.pipe_input = Some("cat".into()))
        .build();
    h.orchestrator = h
        .orchestrator
        .with_input(Cursor::new(b"hello\nworld\n".to_vec()));
    h.orchestrator.add("cat")?;
    h.orchestrator.add("other")?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());
    shutdown_after(&bus, ms(500));
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.stdin_of("cat"), b"hello\nworld\n".to_vec());
    assert!(executor.stdin_of("other").is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_run_request_is_ignored() -> TestResult {
    let mut h = HarnessBuilder::new().build();
    h.orchestrator.add("a")?;
    h.orchestrator.run::<&str>(&[])?;

    let bus = h.orchestrator.bus().clone();
    let (mut runtime, executor, _sink) = h.into_runtime(RuntimeOptions::default());
    bus.send(RuntimeEvent::RunRequested {
        target: "ghost".into(),
        reason: TriggerReason::Manual,
    })?;
    shutdown_after(&bus, ms(100));
    with_timeout(runtime.run()).await?;

    assert_eq!(executor.spawned().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_registry_returns_immediately() -> TestResult {
    let h = HarnessBuilder::new().build();
    let (mut runtime, _executor, _sink) = h.into_runtime(RuntimeOptions::default());
    with_timeout(runtime.run()).await?;
    Ok(())
}
