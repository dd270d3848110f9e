// tests/adapter_failures.rs

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cma_bridge::context::InvocationContext;
use cma_bridge::engine::{handler_fn, TaskRunner};
use cma_bridge::env::RecordingEnv;
use cma_bridge::errors::{AdapterError, TaskError, EXECUTION_ERROR_NAME};
use cma_bridge::message::NestedEvent;
use cma_bridge_test_utils::builders::AdapterConfigBuilder;
use common::{fixtures, init_tracing, with_timeout};
use serde_json::{json, Value};

async fn answer(_event: NestedEvent, _ctx: InvocationContext) -> Result<Value, TaskError> {
    Ok(json!(42))
}

async fn panics(_event: NestedEvent, _ctx: InvocationContext) -> Result<Value, TaskError> {
    panic!("business logic blew up")
}

#[tokio::test]
async fn missing_adapter_is_an_execution_error() {
    init_tracing();
    let cfg = AdapterConfigBuilder::new()
        .dir("/nonexistent/cumulus-message-adapter")
        .use_binary(true)
        .build();
    let runner = TaskRunner::new(handler_fn(answer), cfg).with_env_sink(RecordingEnv::new());

    let err = with_timeout(runner.run(
        fixtures::message("basic.input"),
        InvocationContext::new(),
        None,
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, AdapterError::Spawn { .. }), "got {err:?}");
    assert_eq!(err.classification_name(), EXECUTION_ERROR_NAME);
}

#[tokio::test]
async fn adapter_exit_before_response_reports_its_stderr() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();

    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let handler = handler_fn(move |_event: NestedEvent, _ctx: InvocationContext| {
        flag.store(true, Ordering::SeqCst);
        async { Ok::<_, TaskError>(json!(42)) }
    });

    let input = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({
            "fail_on": "loadNestedEvent",
            "stderr": "Traceback: schema validation failed\n",
            "exit_code": 3
        }),
    );

    let runner = TaskRunner::new(handler, cfg).with_env_sink(RecordingEnv::new());
    let err = with_timeout(runner.run(input, InvocationContext::new(), None))
        .await
        .unwrap_err();

    match &err {
        AdapterError::StreamClosed(stderr) => {
            assert_eq!(stderr, "Traceback: schema validation failed\n");
        }
        other => panic!("expected StreamClosed, got {other:?}"),
    }
    assert!(err.is_execution_error());
    assert!(!called.load(Ordering::SeqCst), "business function must not run");
}

#[tokio::test]
async fn adapter_exit_on_first_command_is_reported() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let input = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({ "fail_on": "loadAndUpdateRemoteEvent", "stderr": "no remote" }),
    );

    let runner = TaskRunner::new(handler_fn(answer), cfg).with_env_sink(RecordingEnv::new());
    let err = with_timeout(runner.run(input, InvocationContext::new(), None))
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::StreamClosed(ref s) if s == "no remote"), "got {err:?}");
}

#[tokio::test]
async fn failure_after_the_task_still_reports_stderr() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let input = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({ "fail_on": "createNextEvent", "stderr": "cannot store output" }),
    );

    let runner = TaskRunner::new(handler_fn(answer), cfg).with_env_sink(RecordingEnv::new());
    let err = with_timeout(runner.run(input, InvocationContext::new(), None))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "cannot store output");
}

#[tokio::test]
async fn wrong_response_shape_is_a_protocol_error() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let input = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({ "respond": { "loadNestedEvent": { "payload": { "a": 1 } } } }),
    );

    let runner = TaskRunner::new(handler_fn(answer), cfg).with_env_sink(RecordingEnv::new());
    let started = Instant::now();
    let err = with_timeout(runner.run(input, InvocationContext::new(), None))
        .await
        .unwrap_err();

    match &err {
        AdapterError::Protocol { command, .. } => assert_eq!(command, "loadNestedEvent"),
        other => panic!("expected Protocol error, got {other:?}"),
    }
    assert!(err.to_string().starts_with("Invalid output received from loadNestedEvent"));
    // The stub honours the exit signal, so teardown does not wait out its bound.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn envelope_in_place_of_full_message_is_rejected() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let input = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({
            "respond": {
                "loadAndUpdateRemoteEvent": { "input": {}, "config": {}, "payload": null }
            }
        }),
    );

    let runner = TaskRunner::new(handler_fn(answer), cfg).with_env_sink(RecordingEnv::new());
    let err = with_timeout(runner.run(input, InvocationContext::new(), None))
        .await
        .unwrap_err();

    assert!(
        matches!(err, AdapterError::Protocol { ref command, .. } if command == "loadAndUpdateRemoteEvent"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn panicking_business_function_is_reported_as_task_error() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let runner = TaskRunner::new(handler_fn(panics), cfg).with_env_sink(RecordingEnv::new());

    let err = with_timeout(runner.run(
        fixtures::message("basic.input"),
        InvocationContext::new(),
        None,
    ))
    .await
    .unwrap_err();

    match err {
        AdapterError::Task(inner) => {
            assert_eq!(inner.name, "Panic");
            assert_eq!(inner.message, "business logic blew up");
        }
        other => panic!("expected Task error, got {other:?}"),
    }
}
