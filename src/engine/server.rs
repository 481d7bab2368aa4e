// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine-side service scaffold.
//!
//! Simulator adapters plug into this scaffold through two seams: an
//! [`EngineAdapter`] carrying the engine's lifecycle and tick logic, and one
//! [`DataPackController`] per registered datapack name. The service holds a
//! reader/writer lock across every request so that datapack reads from the
//! coordinator are serialized against the engine's own step execution.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

use crate::datapack::SimulationTime;
use crate::proto::lockstride_v1 as pb;
use pb::engine_sync_server::{EngineSync, EngineSyncServer};

/// Engine lifecycle and tick logic, supplied by the simulator adapter.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    async fn initialize(&mut self, config: serde_json::Value)
        -> Result<serde_json::Value, String>;

    async fn reset(&mut self) -> Result<(), String>;

    async fn shutdown(&mut self, config: serde_json::Value)
        -> Result<serde_json::Value, String>;

    /// Advance the engine by `time_step` and return the simulated time
    /// reached. Runs under the server's write lock, excluding all datapack
    /// access for the duration of the step.
    async fn run_loop_step(&mut self, time_step: SimulationTime)
        -> Result<SimulationTime, String>;
}

/// Engine-side owner of one named datapack.
///
/// `get_data` returning `None` means the engine has nothing new; the
/// coordinator receives the empty marker. Both methods take `&self`:
/// reads run under the shared lock, so controllers keep their state behind
/// interior mutability.
pub trait DataPackController: Send + Sync {
    fn set_data(&self, payload: &[u8]) -> Result<(), String>;

    fn get_data(&self) -> Result<Option<Vec<u8>>, String>;
}

struct ServerState {
    adapter: Box<dyn EngineAdapter>,
    controllers: HashMap<String, Arc<dyn DataPackController>>,
}

/// gRPC server hosting one engine.
pub struct EngineServer {
    engine_name: String,
    state: Arc<RwLock<ServerState>>,
}

impl EngineServer {
    pub fn new(engine_name: impl Into<String>, adapter: Box<dyn EngineAdapter>) -> Self {
        Self {
            engine_name: engine_name.into(),
            state: Arc::new(RwLock::new(ServerState {
                adapter,
                controllers: HashMap::new(),
            })),
        }
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Register a datapack controller under `name`. Later registrations
    /// under the same name replace earlier ones.
    pub fn register_datapack(
        mut self,
        name: impl Into<String>,
        controller: Arc<dyn DataPackController>,
    ) -> Self {
        Arc::get_mut(&mut self.state)
            .expect("register_datapack must be called before the server is shared")
            .get_mut()
            .controllers
            .insert(name.into(), controller);
        self
    }

    pub async fn num_registered_datapacks(&self) -> usize {
        self.state.read().await.controllers.len()
    }

    /// Turn this server into a tonic service, e.g. for
    /// `Server::builder().add_service(...)`.
    pub fn into_service(self) -> EngineSyncServer<EngineSyncService> {
        EngineSyncServer::new(self.into_inner_service())
    }

    /// The bare service implementation, for callers that wrap or decorate
    /// it before serving.
    pub fn into_inner_service(self) -> EngineSyncService {
        EngineSyncService { state: self.state }
    }

    /// Serve on `addr` until the process is stopped.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), tonic::transport::Error> {
        let name = self.engine_name.clone();
        tracing::info!(engine = %name, %addr, "engine server listening");
        tonic::transport::Server::builder()
            .add_service(self.into_service())
            .serve(addr)
            .await
    }
}

/// The tonic service implementation behind [`EngineServer`].
pub struct EngineSyncService {
    state: Arc<RwLock<ServerState>>,
}

#[tonic::async_trait]
impl EngineSync for EngineSyncService {
    async fn init(
        &self,
        request: Request<pb::InitRequest>,
    ) -> Result<Response<pb::InitReply>, Status> {
        let config = parse_json(&request.into_inner().json)?;
        let mut state = self.state.write().await;
        let reply = state
            .adapter
            .initialize(config)
            .await
            .map_err(Status::internal)?;
        Ok(Response::new(pb::InitReply {
            json: reply.to_string(),
        }))
    }

    async fn reset(
        &self,
        _request: Request<pb::ResetRequest>,
    ) -> Result<Response<pb::ResetReply>, Status> {
        let mut state = self.state.write().await;
        state.adapter.reset().await.map_err(Status::internal)?;
        Ok(Response::new(pb::ResetReply {}))
    }

    async fn shutdown(
        &self,
        request: Request<pb::ShutdownRequest>,
    ) -> Result<Response<pb::ShutdownReply>, Status> {
        let config = parse_json(&request.into_inner().json)?;
        let mut state = self.state.write().await;
        let reply = state
            .adapter
            .shutdown(config)
            .await
            .map_err(Status::internal)?;
        Ok(Response::new(pb::ShutdownReply {
            json: reply.to_string(),
        }))
    }

    async fn run_loop_step(
        &self,
        request: Request<pb::RunLoopStepRequest>,
    ) -> Result<Response<pb::RunLoopStepReply>, Status> {
        let time_step = SimulationTime::from_nanos(request.into_inner().time_step);
        // Write lock: the step excludes all datapack traffic until it ends.
        let mut state = self.state.write().await;
        let engine_time = state
            .adapter
            .run_loop_step(time_step)
            .await
            .map_err(Status::internal)?;
        Ok(Response::new(pb::RunLoopStepReply {
            engine_time: engine_time.as_nanos(),
        }))
    }

    async fn set_data_packs(
        &self,
        request: Request<pb::SetDataPacksRequest>,
    ) -> Result<Response<pb::SetDataPacksReply>, Status> {
        let incoming = request.into_inner().data_packs;
        let state = self.state.write().await;
        // Validate every name first so an unknown datapack fails the whole
        // call without partially applied writes.
        for message in &incoming {
            let name = identifier_name(message)?;
            if !state.controllers.contains_key(name) {
                return Err(Status::not_found(name));
            }
        }
        for message in &incoming {
            let name = identifier_name(message)?;
            let controller = &state.controllers[name];
            if let Some(payload) = &message.payload {
                controller.set_data(payload).map_err(Status::internal)?;
            }
        }
        Ok(Response::new(pb::SetDataPacksReply {}))
    }

    async fn get_data_packs(
        &self,
        request: Request<pb::GetDataPacksRequest>,
    ) -> Result<Response<pb::GetDataPacksReply>, Status> {
        let identifiers = request.into_inner().identifiers;
        let state = self.state.read().await;
        let mut data_packs = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            let controller = state
                .controllers
                .get(&id.name)
                .ok_or_else(|| Status::not_found(id.name.clone()))?;
            let payload = controller.get_data().map_err(Status::internal)?;
            data_packs.push(pb::DataPackMessage {
                id: Some(id),
                payload,
            });
        }
        Ok(Response::new(pb::GetDataPacksReply { data_packs }))
    }
}

fn parse_json(body: &str) -> Result<serde_json::Value, Status> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|e| Status::invalid_argument(format!("malformed JSON config: {}", e)))
}

fn identifier_name(message: &pb::DataPackMessage) -> Result<&str, Status> {
    message
        .id
        .as_ref()
        .map(|id| id.name.as_str())
        .ok_or_else(|| Status::invalid_argument("datapack is missing its identifier"))
}
