// tests/session_exchange.rs

mod common;

use std::time::Duration;

use cma_bridge::engine::AdapterSession;
use cma_bridge::errors::AdapterError;
use cma_bridge::exec::protocol::Command;
use cma_bridge::exec::spawn_args::{self, STREAM_COMMAND};
use cma_bridge::exec::AdapterProcess;
use common::{fixtures, init_tracing, with_timeout};
use serde_json::json;

#[tokio::test]
async fn consecutive_round_trips_stay_in_step() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let process = AdapterProcess::spawn(&spawn_args::resolve(&cfg, STREAM_COMMAND)).unwrap();
    let mut session = AdapterSession::new(process, cfg.timeouts);

    let message = fixtures::message("basic.input");
    let resolved = with_timeout(session.exchange(
        Command::LoadAndUpdateRemoteEvent,
        &json!({ "event": message, "context": {}, "schemas": null }),
    ))
    .await
    .unwrap();
    assert_eq!(resolved, message);

    let nested = with_timeout(session.exchange(
        Command::LoadNestedEvent,
        &json!({ "event": resolved, "context": {}, "schemas": null }),
    ))
    .await
    .unwrap();
    assert_eq!(nested, json!({ "input": { "anykey": "anyvalue" }, "config": { "bar": "baz" } }));

    let next = with_timeout(session.exchange(
        Command::CreateNextEvent,
        &json!({ "event": resolved, "handler_response": "ünïcødé ✓", "message_config": null }),
    ))
    .await
    .unwrap();
    assert_eq!(next["payload"], json!("ünïcødé ✓"));

    session.finish().await;
    let closed = session
        .process()
        .wait_closed(Duration::from_secs(5), Duration::from_millis(10))
        .await;
    assert!(closed);
    assert_eq!(session.process().exit_info().unwrap().code, Some(0));
}

#[cfg(unix)]
#[tokio::test]
async fn unresponsive_adapter_blocks_new_commands_and_is_torn_down() {
    init_tracing();
    let (_dir, cfg) = common::stub_adapter();
    let process = AdapterProcess::spawn(&spawn_args::resolve(&cfg, STREAM_COMMAND)).unwrap();
    let mut session = AdapterSession::new(process, cfg.timeouts);

    let event = fixtures::with_directives(
        fixtures::message("basic.input"),
        json!({ "hang_on": "loadNestedEvent" }),
    );
    let pending = tokio::time::timeout(
        Duration::from_millis(300),
        session.exchange(Command::LoadNestedEvent, &json!({ "event": event })),
    )
    .await;
    assert!(pending.is_err(), "stub should not answer");

    let err = session
        .exchange(Command::CreateNextEvent, &json!({}))
        .await
        .unwrap_err();
    assert!(
        matches!(err, AdapterError::Protocol { ref detail, .. } if detail.contains("loadNestedEvent")),
        "got {err:?}"
    );

    with_timeout(session.teardown()).await;
    assert!(session.process().is_closed());
    assert_eq!(session.process().exit_info().unwrap().signal, Some(libc::SIGTERM));
}

