// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process engine servers for client and orchestrator tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tonic::{Request, Response, Status};

use crate::datapack::SimulationTime;
use crate::engine::server::{DataPackController, EngineAdapter, EngineServer, EngineSyncService};
use crate::proto::lockstride_v1 as pb;
use pb::engine_sync_server::{EngineSync, EngineSyncServer};

/// Accumulates simulated time step by step, optionally sleeping first to
/// simulate a slow engine.
pub(crate) struct AccumulatingAdapter {
    time: SimulationTime,
    step_delay: Option<Duration>,
}

impl AccumulatingAdapter {
    pub(crate) fn new() -> Self {
        Self {
            time: SimulationTime::ZERO,
            step_delay: None,
        }
    }

    pub(crate) fn with_step_delay(delay: Duration) -> Self {
        Self {
            time: SimulationTime::ZERO,
            step_delay: Some(delay),
        }
    }
}

#[async_trait]
impl EngineAdapter for AccumulatingAdapter {
    async fn initialize(
        &mut self,
        _config: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(serde_json::json!({ "status": "ready" }))
    }

    async fn reset(&mut self) -> Result<(), String> {
        self.time = SimulationTime::ZERO;
        Ok(())
    }

    async fn shutdown(
        &mut self,
        _config: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(serde_json::Value::Null)
    }

    async fn run_loop_step(
        &mut self,
        time_step: SimulationTime,
    ) -> Result<SimulationTime, String> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        self.time = self.time + time_step;
        Ok(self.time)
    }
}

/// Replies with a scripted sequence of engine times, for exercising the
/// timing invariant.
pub(crate) struct ScriptedTimeAdapter {
    replies: Vec<i64>,
    next: usize,
}

impl ScriptedTimeAdapter {
    pub(crate) fn new(replies: Vec<i64>) -> Self {
        Self { replies, next: 0 }
    }
}

#[async_trait]
impl EngineAdapter for ScriptedTimeAdapter {
    async fn initialize(
        &mut self,
        _config: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(serde_json::Value::Null)
    }

    async fn reset(&mut self) -> Result<(), String> {
        self.next = 0;
        Ok(())
    }

    async fn shutdown(
        &mut self,
        _config: serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Ok(serde_json::Value::Null)
    }

    async fn run_loop_step(
        &mut self,
        _time_step: SimulationTime,
    ) -> Result<SimulationTime, String> {
        let reply = *self
            .replies
            .get(self.next)
            .ok_or_else(|| "scripted adapter ran out of replies".to_string())?;
        self.next += 1;
        Ok(SimulationTime::from_nanos(reply))
    }
}

/// Stores the last written payload and counts calls.
#[derive(Default)]
pub(crate) struct MemoryController {
    payload: Mutex<Option<Vec<u8>>>,
    set_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryController {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_payload(payload: Vec<u8>) -> Arc<Self> {
        let controller = Self::default();
        *controller.payload.lock().unwrap() = Some(payload);
        Arc::new(controller)
    }

    pub(crate) fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl DataPackController for MemoryController {
    fn set_data(&self, payload: &[u8]) -> Result<(), String> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        *self.payload.lock().unwrap() = Some(payload.to_vec());
        Ok(())
    }

    fn get_data(&self) -> Result<Option<Vec<u8>>, String> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.lock().unwrap().clone())
    }
}

/// Service wrapper counting `SetDataPacks` RPCs, including calls whose
/// batch is empty and therefore never reaches a controller.
pub(crate) struct CountingSetService {
    inner: EngineSyncService,
    set_calls: Arc<AtomicUsize>,
}

impl CountingSetService {
    pub(crate) fn wrap(server: EngineServer) -> (Self, Arc<AtomicUsize>) {
        let set_calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: server.into_inner_service(),
                set_calls: set_calls.clone(),
            },
            set_calls,
        )
    }
}

#[tonic::async_trait]
impl EngineSync for CountingSetService {
    async fn init(
        &self,
        request: Request<pb::InitRequest>,
    ) -> Result<Response<pb::InitReply>, Status> {
        self.inner.init(request).await
    }

    async fn reset(
        &self,
        request: Request<pb::ResetRequest>,
    ) -> Result<Response<pb::ResetReply>, Status> {
        self.inner.reset(request).await
    }

    async fn shutdown(
        &self,
        request: Request<pb::ShutdownRequest>,
    ) -> Result<Response<pb::ShutdownReply>, Status> {
        self.inner.shutdown(request).await
    }

    async fn run_loop_step(
        &self,
        request: Request<pb::RunLoopStepRequest>,
    ) -> Result<Response<pb::RunLoopStepReply>, Status> {
        self.inner.run_loop_step(request).await
    }

    async fn set_data_packs(
        &self,
        request: Request<pb::SetDataPacksRequest>,
    ) -> Result<Response<pb::SetDataPacksReply>, Status> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_data_packs(request).await
    }

    async fn get_data_packs(
        &self,
        request: Request<pb::GetDataPacksRequest>,
    ) -> Result<Response<pb::GetDataPacksReply>, Status> {
        self.inner.get_data_packs(request).await
    }
}

/// Serve any `EngineSync` implementation on an ephemeral port; returns the
/// address the client should dial.
pub(crate) async fn serve_ephemeral<T: EngineSync>(service: T) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(EngineSyncServer::new(service))
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

/// Serve an [`EngineServer`] on an ephemeral port.
pub(crate) async fn spawn_server(server: EngineServer) -> String {
    serve_ephemeral(server.into_inner_service()).await
}
