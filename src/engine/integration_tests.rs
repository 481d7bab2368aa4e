// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine client tests against in-process gRPC servers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::CodecRegistry;
use crate::datapack::{DataPack, DataPackIdentifier, PayloadKind, PayloadValue, SimulationTime};
use crate::engine::client::{EngineClient, EngineState};
use crate::engine::server::{DataPackController, EngineAdapter, EngineServer};
use crate::engine::test_support::{
    spawn_server, AccumulatingAdapter, MemoryController, ScriptedTimeAdapter,
};
use crate::errors::EngineError;

fn registry() -> Arc<CodecRegistry> {
    Arc::new(CodecRegistry::with_defaults())
}

async fn ready_client(name: &str, adapter: Box<dyn EngineAdapter>) -> EngineClient {
    let address = spawn_server(EngineServer::new(name, adapter)).await;
    let mut client =
        EngineClient::connect_lazy(name, &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();
    client
}

#[tokio::test]
async fn initialize_fails_when_engine_is_unreachable() {
    let mut client = EngineClient::connect_lazy(
        "physics",
        "http://127.0.0.1:9",
        Duration::from_millis(200),
        registry(),
    )
    .unwrap();

    let err = client.initialize(serde_json::json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Command { .. } | EngineError::Timeout { .. }
    ));
    assert_eq!(client.state(), EngineState::Created);
}

#[tokio::test]
async fn initialize_transitions_to_ready_and_rejects_a_second_call() {
    let address = spawn_server(EngineServer::new(
        "physics",
        Box::new(AccumulatingAdapter::new()),
    ))
    .await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();

    let reply = client.initialize(serde_json::json!({})).await.unwrap();
    assert_eq!(reply["status"], "ready");
    assert_eq!(client.state(), EngineState::Ready);

    // No intervening reset or shutdown: the second call must be rejected.
    let err = client.initialize(serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn shutdown_terminates_the_connection() {
    let mut client = ready_client("physics", Box::new(AccumulatingAdapter::new())).await;

    client.shutdown(serde_json::json!({})).await.unwrap();
    assert_eq!(client.state(), EngineState::Terminated);

    let err = client.send_data_packs(&[]).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn step_accumulates_engine_time() {
    let mut client = ready_client("physics", Box::new(AccumulatingAdapter::new())).await;
    let step = SimulationTime::from_millis(100);

    client.run_loop_step(step).unwrap();
    assert_eq!(client.state(), EngineState::Stepping);
    let time = client.wait_for_step_completion(None).await.unwrap();
    assert_eq!(time, SimulationTime::from_millis(100));
    assert_eq!(client.state(), EngineState::Ready);

    client.run_loop_step(step).unwrap();
    let time = client.wait_for_step_completion(None).await.unwrap();
    assert_eq!(time, SimulationTime::from_millis(200));
    assert_eq!(client.engine_time(), SimulationTime::from_millis(200));
}

#[tokio::test]
async fn stepping_excludes_datapack_commands() {
    let mut client = ready_client("physics", Box::new(AccumulatingAdapter::new())).await;
    client.run_loop_step(SimulationTime::from_millis(10)).unwrap();

    let err = client.send_data_packs(&[]).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            state: EngineState::Stepping,
            ..
        }
    ));

    client.wait_for_step_completion(None).await.unwrap();
}

#[tokio::test]
async fn negative_engine_time_is_a_protocol_error() {
    let mut client =
        ready_client("physics", Box::new(ScriptedTimeAdapter::new(vec![-5]))).await;

    client.run_loop_step(SimulationTime::from_millis(10)).unwrap();
    let err = client.wait_for_step_completion(None).await.unwrap_err();
    assert!(matches!(err, EngineError::Protocol { .. }));

    // The violation must not advance the recorded time.
    assert_eq!(client.engine_time(), SimulationTime::ZERO);
}

#[tokio::test]
async fn non_monotonic_engine_time_is_a_protocol_error() {
    let replies = vec![2_000_000_000, 1_000_000_000];
    let mut client = ready_client("physics", Box::new(ScriptedTimeAdapter::new(replies))).await;
    let step = SimulationTime::from_millis(10);

    client.run_loop_step(step).unwrap();
    let time = client.wait_for_step_completion(None).await.unwrap();
    assert_eq!(time, SimulationTime::from_nanos(2_000_000_000));

    client.run_loop_step(step).unwrap();
    let err = client.wait_for_step_completion(None).await.unwrap_err();
    match err {
        EngineError::Protocol { reported, previous, .. } => {
            assert_eq!(reported, SimulationTime::from_nanos(1_000_000_000));
            assert_eq!(previous, SimulationTime::from_nanos(2_000_000_000));
        }
        other => panic!("expected a protocol error, got {:?}", other),
    }
    assert_eq!(client.engine_time(), SimulationTime::from_nanos(2_000_000_000));
}

#[tokio::test]
async fn slow_engine_times_out_with_one_millisecond_budget() {
    let address = spawn_server(EngineServer::new(
        "brain",
        Box::new(AccumulatingAdapter::with_step_delay(Duration::from_millis(
            1500,
        ))),
    ))
    .await;
    // A 1 ms command budget cannot survive a handler sleeping 1.5 s.
    let mut client =
        EngineClient::connect_lazy("brain", &address, Duration::from_millis(1), registry())
            .unwrap();
    // The instant init may still trip the 1 ms budget on first connect;
    // retry until the channel is warm.
    for _ in 0..50 {
        if client.initialize(serde_json::json!({})).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.state(), EngineState::Ready);

    client.run_loop_step(SimulationTime::from_millis(100)).unwrap();
    let err = client.wait_for_step_completion(None).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));
}

#[tokio::test]
async fn timed_out_wait_keeps_the_stale_step_and_poisons_the_client() {
    let mut client = ready_client(
        "physics",
        Box::new(AccumulatingAdapter::with_step_delay(Duration::from_millis(
            300,
        ))),
    )
    .await;

    client.run_loop_step(SimulationTime::from_millis(10)).unwrap();
    let err = client
        .wait_for_step_completion(Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Timeout {
            command: "wait_for_step_completion",
            ..
        }
    ));

    // The step is still outstanding; its late result is never merged.
    assert_eq!(client.state(), EngineState::Stepping);
    assert_eq!(client.engine_time(), SimulationTime::ZERO);
    let err = client.send_data_packs(&[]).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
}

#[tokio::test]
async fn unknown_datapack_fails_the_call_and_leaves_the_cache_alone() {
    let controller = MemoryController::with_payload(b"1.0".to_vec());
    let server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
        .register_datapack("known", controller);
    let address = spawn_server(server).await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();

    let known = DataPackIdentifier::new("known", "physics", PayloadKind::Json);
    client.update_data_packs(std::slice::from_ref(&known)).await.unwrap();
    assert_eq!(client.cache().len(), 1);

    let missing = DataPackIdentifier::new("missing", "physics", PayloadKind::Json);
    let err = client
        .update_data_packs(&[known.clone(), missing])
        .await
        .unwrap_err();
    match err {
        EngineError::UnknownDataPack { name, .. } => assert_eq!(name, "missing"),
        other => panic!("expected UnknownDataPack, got {:?}", other),
    }

    // Cache must be exactly as before the failed call.
    assert_eq!(client.cache().len(), 1);
    assert!(!client.cache().get(&known).unwrap().is_empty());
}

#[tokio::test]
async fn sent_datapacks_can_be_read_back() {
    let controller = MemoryController::new();
    let server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
        .register_datapack("command", controller.clone());
    let address = spawn_server(server).await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();

    let sent = DataPack::with_value(
        "command",
        "physics",
        PayloadValue::Json(serde_json::json!({ "torque": 0.25 })),
    );
    client.send_data_packs(std::slice::from_ref(&sent)).await.unwrap();
    assert_eq!(controller.set_calls(), 1);

    let got = client
        .update_data_packs(&[sent.id().clone()])
        .await
        .unwrap();
    assert_eq!(got.len(), 1);
    assert!(!got[0].is_empty());
    assert_eq!(got[0].payload(), sent.payload());
}

#[tokio::test]
async fn foreign_datapacks_are_skipped_not_sent() {
    let controller = MemoryController::new();
    let server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
        .register_datapack("command", controller.clone());
    let address = spawn_server(server).await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();

    // Addressed to another engine: skipped client-side, call still succeeds.
    let foreign = DataPack::with_value("command", "brain", PayloadValue::Scalar(1.0));
    client.send_data_packs(&[foreign]).await.unwrap();
    assert_eq!(controller.set_calls(), 0);
}

/// Controller that yields its payload once, then reports "nothing new".
struct OneShotController {
    payload: Mutex<Option<Vec<u8>>>,
}

impl DataPackController for OneShotController {
    fn set_data(&self, payload: &[u8]) -> Result<(), String> {
        *self.payload.lock().unwrap() = Some(payload.to_vec());
        Ok(())
    }

    fn get_data(&self) -> Result<Option<Vec<u8>>, String> {
        Ok(self.payload.lock().unwrap().take())
    }
}

#[tokio::test]
async fn empty_reply_never_overwrites_the_cached_value() {
    let controller = Arc::new(OneShotController {
        payload: Mutex::new(Some(b"\"fresh\"".to_vec())),
    });
    let server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
        .register_datapack("state", controller);
    let address = spawn_server(server).await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();

    let id = DataPackIdentifier::new("state", "physics", PayloadKind::Json);

    let got = client.update_data_packs(std::slice::from_ref(&id)).await.unwrap();
    assert_eq!(
        got[0].payload(),
        Some(&PayloadValue::Json(serde_json::json!("fresh")))
    );

    // Second poll returns the empty marker; the merged set must still carry
    // the previously cached value.
    let got = client.update_data_packs(std::slice::from_ref(&id)).await.unwrap();
    assert_eq!(got.len(), 1);
    assert!(!got[0].is_empty());
    assert_eq!(
        got[0].payload(),
        Some(&PayloadValue::Json(serde_json::json!("fresh")))
    );
}

#[tokio::test]
async fn empty_reply_for_unseen_identifier_stores_the_marker() {
    let server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
        .register_datapack("state", MemoryController::new());
    let address = spawn_server(server).await;
    let mut client =
        EngineClient::connect_lazy("physics", &address, Duration::ZERO, registry()).unwrap();
    client.initialize(serde_json::json!({})).await.unwrap();

    let id = DataPackIdentifier::new("state", "physics", PayloadKind::Json);
    let got = client.update_data_packs(std::slice::from_ref(&id)).await.unwrap();

    assert_eq!(got.len(), 1);
    assert!(got[0].is_empty());
    assert!(client.cache().get(&id).unwrap().is_empty());
}

#[tokio::test]
async fn reset_returns_the_engine_to_time_zero() {
    let mut client = ready_client("physics", Box::new(AccumulatingAdapter::new())).await;

    client.run_loop_step(SimulationTime::from_millis(50)).unwrap();
    client.wait_for_step_completion(None).await.unwrap();
    assert_eq!(client.engine_time(), SimulationTime::from_millis(50));

    client.reset().await.unwrap();
    assert_eq!(client.engine_time(), SimulationTime::ZERO);
    assert_eq!(client.state(), EngineState::Ready);
    assert!(client.cache().is_empty());

    // After a reset the engine may be initialized again.
    client.initialize(serde_json::json!({})).await.unwrap();

    // And stepping starts over from zero without tripping the monotonic check.
    client.run_loop_step(SimulationTime::from_millis(10)).unwrap();
    let time = client.wait_for_step_completion(None).await.unwrap();
    assert_eq!(time, SimulationTime::from_millis(10));
}
