//! Integration tests checking the tracing instrumentation of running processes.

#![cfg(unix)]

use tracing::{subscriber::DefaultGuard, Subscriber};
use tracing_capture::{CaptureLayer, SharedStorage, Storage};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, registry::LookupSpan, FmtSubscriber,
};

use std::time::Duration;

use proc_harness::{Invocation, ProcessRunner, RunFailure, RunnerOptions, StreamKind};

fn create_fmt_subscriber() -> impl Subscriber + for<'a> LookupSpan<'a> {
    FmtSubscriber::builder()
        .pretty()
        .with_span_events(FmtSpan::CLOSE)
        .with_test_writer()
        .with_env_filter("proc_harness=debug")
        .finish()
}

fn enable_tracing_assertions() -> (DefaultGuard, SharedStorage) {
    let storage = SharedStorage::default();
    let subscriber = create_fmt_subscriber().with(CaptureLayer::new(&storage));
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, storage)
}

#[test]
fn tracing_for_successful_run() -> anyhow::Result<()> {
    let (_guard, tracing_storage) = enable_tracing_assertions();
    let mut runner = ProcessRunner::new(RunnerOptions::default());
    let invocation = Invocation::parse(r#"echo "Hello, world!""#)?;

    let mut chunk_count = 0;
    runner.run_with(invocation, &[], &mut |_: StreamKind, _: &[u8]| chunk_count += 1);
    runner.assert_success();
    runner.assert_output_contains("Hello, world!");
    assert!(chunk_count > 0);

    assert_tracing_for_run(&tracing_storage.lock());
    Ok(())
}

fn assert_tracing_for_run(storage: &Storage) {
    assert!(
        storage
            .root_spans()
            .any(|span| span.metadata().name() == "tokenize"),
        "`tokenize` span not found"
    );

    let span = storage
        .root_spans()
        .find(|span| span.metadata().name() == "run_with")
        .expect("`run_with` span not found");
    assert_eq!(
        span["invocation"].as_debug_str(),
        Some("echo 'Hello, world!'")
    );
    assert!(span["options.timeout"].is_debug(&RunnerOptions::DEFAULT_TIMEOUT));
    assert!(span["options.idle_timeout"].is_debug(&RunnerOptions::DEFAULT_IDLE_TIMEOUT));

    let start_span = span
        .children()
        .find(|span| span.metadata().name() == "start")
        .expect("`start` span not found");
    let spawn_span = start_span
        .children()
        .find(|span| span.metadata().name() == "spawn_child")
        .expect("`spawn_child` span not found");
    assert!(spawn_span
        .events()
        .any(|event| event.message() == Some("spawned child")));

    let wait_span = span
        .children()
        .find(|span| span.metadata().name() == "wait")
        .expect("`wait` span not found");
    assert!(wait_span
        .events()
        .any(|event| event.message() == Some("process terminated")));
    assert!(!wait_span
        .events()
        .any(|event| event.message() == Some("process failed")));
}

#[test]
fn tracing_for_timed_out_run() {
    let (_guard, tracing_storage) = enable_tracing_assertions();
    let options = RunnerOptions::default()
        .with_timeout(Duration::from_millis(200))
        .with_notices(false);
    let mut runner = ProcessRunner::new(options);
    let handle = runner.run(Invocation::parse("sleep 5").unwrap(), &[]);
    assert!(matches!(handle.failure(), Some(RunFailure::Timeout(_))));
    runner.assert_failure();

    let storage = tracing_storage.lock();
    let wait_span = storage
        .root_spans()
        .find(|span| span.metadata().name() == "wait")
        .expect("`wait` span not found");
    let failure_event = wait_span
        .events()
        .find(|event| event.message() == Some("process failed"))
        .expect("failure event not found");
    let failure = failure_event["failure"].as_debug_str().unwrap();
    assert!(failure.contains("timeout of 200ms"), "{failure}");
    assert_eq!(
        failure_event["invocation"].as_debug_str(),
        Some("sleep 5")
    );
}
