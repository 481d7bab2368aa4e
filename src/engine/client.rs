// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-engine RPC client: command protocol and lifecycle state machine.
//!
//! One `EngineClient` owns the channel to one engine process. Within one
//! engine, RPC calls are strictly sequential; the only concurrency in the
//! whole synchronization core is the background task that carries an
//! in-flight `RunLoopStep`, dispatched by [`EngineClient::run_loop_step`]
//! and joined by [`EngineClient::wait_for_step_completion`].
//!
//! Steps are not cancellable. If the join times out, the RPC keeps running
//! on the engine side, the client stays in [`EngineState::Stepping`], and
//! the eventual late result is discarded unread when the client is dropped.
//! A timed-out step is therefore fatal to the run, not a recoverable
//! cancel-and-retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

use crate::codec::CodecRegistry;
use crate::datapack::cache::DataPackCache;
use crate::datapack::{DataPack, DataPackIdentifier, PayloadKind, SimulationTime};
use crate::errors::EngineError;
use crate::observability::messages::engine::{StepCompleted, StepDispatched, StepTimedOut};
use crate::observability::messages::StructuredLog;
use crate::proto::lockstride_v1 as pb;
use pb::engine_sync_client::EngineSyncClient;

/// Positive RPC timeouts below this granularity are rounded up to it.
pub const MIN_RPC_TIMEOUT: Duration = Duration::from_millis(1);

/// Lifecycle of one engine connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Initializing,
    Ready,
    Stepping,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineState::Created => "created",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Stepping => "stepping",
            EngineState::ShuttingDown => "shutting down",
            EngineState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// RPC client for one simulation engine.
pub struct EngineClient {
    name: String,
    state: EngineState,
    /// `None` blocks indefinitely; otherwise at least [`MIN_RPC_TIMEOUT`].
    rpc_timeout: Option<Duration>,
    stub: EngineSyncClient<Channel>,
    codecs: Arc<CodecRegistry>,
    cache: DataPackCache,
    engine_time: SimulationTime,
    prev_engine_time: SimulationTime,
    step_handle: Option<JoinHandle<Result<SimulationTime, EngineError>>>,
    may_initialize: bool,
}

impl EngineClient {
    /// Create a client for an engine reachable at `address`
    /// (e.g. `http://127.0.0.1:9090`). The channel connects on first use.
    ///
    /// A zero `command_timeout` blocks indefinitely on every RPC; positive
    /// timeouts below one millisecond are rounded up to one millisecond.
    pub fn connect_lazy(
        name: impl Into<String>,
        address: &str,
        command_timeout: Duration,
        codecs: Arc<CodecRegistry>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        let endpoint = Endpoint::from_shared(address.to_string()).map_err(|e| {
            EngineError::Command {
                engine: name.clone(),
                command: "connect",
                message: format!("invalid address \"{}\": {}", address, e),
            }
        })?;
        let channel = endpoint.connect_lazy();
        Ok(Self {
            cache: DataPackCache::new(name.clone()),
            name,
            state: EngineState::Created,
            rpc_timeout: round_timeout(command_timeout),
            stub: EngineSyncClient::new(channel),
            codecs,
            engine_time: SimulationTime::ZERO,
            prev_engine_time: SimulationTime::ZERO,
            step_handle: None,
            may_initialize: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Simulated time reached by the last completed step.
    pub fn engine_time(&self) -> SimulationTime {
        self.engine_time
    }

    pub fn rpc_timeout(&self) -> Option<Duration> {
        self.rpc_timeout
    }

    pub fn cache(&self) -> &DataPackCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DataPackCache {
        &mut self.cache
    }

    /// Engine-specific setup. Not guaranteed idempotent: a second call
    /// without an intervening `reset` or `shutdown` is rejected.
    pub async fn initialize(
        &mut self,
        config: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        if !self.may_initialize
            || !matches!(self.state, EngineState::Created | EngineState::Ready)
        {
            return Err(self.invalid_state("initialize"));
        }
        self.state = EngineState::Initializing;
        let mut stub = self.stub.clone();
        let request = pb::InitRequest {
            json: config.to_string(),
        };
        let result = self
            .with_timeout("initialize", async move { stub.init(request).await })
            .await;
        match result {
            Ok(reply) => {
                self.state = EngineState::Ready;
                self.may_initialize = false;
                tracing::debug!(engine = %self.name, "engine initialized");
                parse_reply_json(&self.name, "initialize", &reply.json)
            }
            Err(e) => {
                // Whether the engine applied any setup is unknown; leave the
                // connection usable so the caller can still shut it down.
                self.state = EngineState::Created;
                Err(e)
            }
        }
    }

    /// Return the engine to simulated time zero without destroying the
    /// connection. Also clears the datapack cache: cached values refer to
    /// the pre-reset trajectory.
    pub async fn reset(&mut self) -> Result<(), EngineError> {
        self.expect_ready("reset")?;
        let mut stub = self.stub.clone();
        self.with_timeout("reset", async move { stub.reset(pb::ResetRequest {}).await })
            .await?;
        self.engine_time = SimulationTime::ZERO;
        self.prev_engine_time = SimulationTime::ZERO;
        self.cache.clear();
        self.may_initialize = true;
        tracing::debug!(engine = %self.name, "engine reset to time zero");
        Ok(())
    }

    /// Best-effort graceful termination. The client transitions to
    /// `Terminated` even when the RPC fails; the failure is reported but
    /// must not prevent process cleanup by the launcher.
    pub async fn shutdown(
        &mut self,
        config: serde_json::Value,
    ) -> Result<serde_json::Value, EngineError> {
        if self.state == EngineState::Terminated {
            return Err(self.invalid_state("shutdown"));
        }
        self.state = EngineState::ShuttingDown;
        let mut stub = self.stub.clone();
        let request = pb::ShutdownRequest {
            json: config.to_string(),
        };
        let result = self
            .with_timeout("shutdown", async move { stub.shutdown(request).await })
            .await;
        self.state = EngineState::Terminated;
        let reply = result?;
        parse_reply_json(&self.name, "shutdown", &reply.json)
    }

    /// Dispatch a `RunLoopStep` RPC on a background task and return
    /// immediately. The result is collected by
    /// [`wait_for_step_completion`](Self::wait_for_step_completion).
    pub fn run_loop_step(&mut self, time_step: SimulationTime) -> Result<(), EngineError> {
        self.expect_ready("run_loop_step")?;
        let mut stub = self.stub.clone();
        let engine = self.name.clone();
        let rpc_timeout = self.rpc_timeout;
        let request = pb::RunLoopStepRequest {
            time_step: time_step.as_nanos(),
        };
        let handle = tokio::spawn(async move {
            let call = stub.run_loop_step(request);
            let reply = match rpc_timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        return Err(EngineError::Timeout {
                            engine,
                            command: "run_loop_step",
                            timeout: limit,
                        })
                    }
                },
                None => call.await,
            }
            .map_err(|status| map_status(&engine, "run_loop_step", status))?;
            Ok(SimulationTime::from_nanos(reply.into_inner().engine_time))
        });
        self.step_handle = Some(handle);
        self.state = EngineState::Stepping;
        StepDispatched {
            engine: &self.name,
            time_step_ns: time_step.as_nanos(),
        }
        .log();
        Ok(())
    }

    /// Block until the outstanding step completes, or until `timeout`
    /// elapses (`None` waits indefinitely).
    ///
    /// With no step in flight (including a step already consumed by a
    /// previous call) this is a no-op returning the recorded engine time.
    ///
    /// On timeout the step RPC is *not* cancelled: the client keeps the
    /// task handle, remains in `Stepping`, and the stale result is
    /// discarded without ever updating the recorded times.
    ///
    /// A completed step must report a time that is non-negative and not
    /// below the previously recorded time; a violation fails with
    /// [`EngineError::Protocol`] and leaves the stored previous time
    /// unchanged.
    pub async fn wait_for_step_completion(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<SimulationTime, EngineError> {
        let Some(mut handle) = self.step_handle.take() else {
            return Ok(self.engine_time);
        };
        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    StepTimedOut { engine: &self.name }.log();
                    self.step_handle = Some(handle);
                    return Err(EngineError::Timeout {
                        engine: self.name.clone(),
                        command: "wait_for_step_completion",
                        timeout: limit,
                    });
                }
            },
            None => handle.await,
        };
        // The step is consumed from here on, whatever its outcome.
        self.state = EngineState::Ready;
        let engine_time = joined.map_err(|e| EngineError::Command {
            engine: self.name.clone(),
            command: "run_loop_step",
            message: format!("step task failed: {}", e),
        })??;
        if engine_time.is_negative() || engine_time < self.prev_engine_time {
            return Err(EngineError::Protocol {
                engine: self.name.clone(),
                reported: engine_time,
                previous: self.prev_engine_time,
            });
        }
        self.prev_engine_time = engine_time;
        self.engine_time = engine_time;
        StepCompleted {
            engine: &self.name,
            engine_time_ns: engine_time.as_nanos(),
        }
        .log();
        Ok(engine_time)
    }

    /// Push a batch of datapacks to the engine. Packs addressed to other
    /// engines are skipped, not sent. An empty batch is a valid call: the
    /// engine observes "nothing to send" explicitly.
    pub async fn send_data_packs(&mut self, datapacks: &[DataPack]) -> Result<(), EngineError> {
        self.expect_ready("send_data_packs")?;
        let mut request = pb::SetDataPacksRequest {
            data_packs: Vec::new(),
        };
        for pack in datapacks {
            if pack.id().engine_name != self.name {
                continue;
            }
            request.data_packs.push(self.encode_pack(pack)?);
        }
        let mut stub = self.stub.clone();
        self.with_timeout("send_data_packs", async move {
            stub.set_data_packs(request).await
        })
        .await?;
        Ok(())
    }

    /// Request current values for the given identifiers, merge each reply
    /// into the cache (an empty reply never overwrites a cached value), and
    /// return the full merged set for the requested identifiers.
    ///
    /// Identifiers naming other engines are not forwarded. If the engine has
    /// no datapack registered under a requested name the whole call fails
    /// with [`EngineError::UnknownDataPack`] and the cache stays untouched.
    pub async fn update_data_packs(
        &mut self,
        identifiers: &[DataPackIdentifier],
    ) -> Result<Vec<DataPack>, EngineError> {
        self.expect_ready("update_data_packs")?;
        let wanted: Vec<&DataPackIdentifier> = identifiers
            .iter()
            .filter(|id| id.engine_name == self.name)
            .collect();
        let request = pb::GetDataPacksRequest {
            identifiers: wanted.iter().map(|id| encode_identifier(id)).collect(),
        };
        let mut stub = self.stub.clone();
        let reply = self
            .with_timeout("update_data_packs", async move {
                stub.get_data_packs(request).await
            })
            .await?;

        let mut incoming = Vec::with_capacity(reply.data_packs.len());
        for message in reply.data_packs {
            incoming.push(self.decode_pack(message)?);
        }
        self.cache.merge_all(incoming);

        Ok(wanted
            .into_iter()
            .filter_map(|id| self.cache.get(id).cloned())
            .collect())
    }

    fn expect_ready(&self, command: &'static str) -> Result<(), EngineError> {
        if self.state == EngineState::Ready {
            Ok(())
        } else {
            Err(self.invalid_state(command))
        }
    }

    fn invalid_state(&self, command: &'static str) -> EngineError {
        EngineError::InvalidState {
            engine: self.name.clone(),
            command,
            state: self.state,
        }
    }

    async fn with_timeout<T, F>(&self, command: &'static str, call: F) -> Result<T, EngineError>
    where
        F: std::future::Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    {
        let outcome = match self.rpc_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(EngineError::Timeout {
                        engine: self.name.clone(),
                        command,
                        timeout: limit,
                    })
                }
            },
            None => call.await,
        };
        outcome
            .map(tonic::Response::into_inner)
            .map_err(|status| map_status(&self.name, command, status))
    }

    fn encode_pack(&self, pack: &DataPack) -> Result<pb::DataPackMessage, EngineError> {
        let payload = match pack.payload() {
            Some(value) => Some(self.codecs.encode(value).map_err(|e| EngineError::Command {
                engine: self.name.clone(),
                command: "send_data_packs",
                message: format!("cannot encode datapack \"{}\": {}", pack.id().name, e),
            })?),
            None => None,
        };
        Ok(pb::DataPackMessage {
            id: Some(encode_identifier(pack.id())),
            payload,
        })
    }

    fn decode_pack(&self, message: pb::DataPackMessage) -> Result<DataPack, EngineError> {
        let id = message.id.ok_or_else(|| EngineError::Command {
            engine: self.name.clone(),
            command: "update_data_packs",
            message: "response datapack is missing its identifier".into(),
        })?;
        let kind = PayloadKind::from_tag(&id.data_type).ok_or_else(|| EngineError::Command {
            engine: self.name.clone(),
            command: "update_data_packs",
            message: format!("unknown payload type tag \"{}\"", id.data_type),
        })?;
        let identifier = DataPackIdentifier::new(id.name, id.engine_name, kind);
        let payload = match message.payload {
            Some(bytes) => {
                Some(
                    self.codecs
                        .decode(kind, &bytes)
                        .map_err(|e| EngineError::Command {
                            engine: self.name.clone(),
                            command: "update_data_packs",
                            message: format!(
                                "cannot decode datapack \"{}\": {}",
                                identifier.name, e
                            ),
                        })?,
                )
            }
            None => None,
        };
        Ok(DataPack::from_parts(identifier, payload))
    }
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("engine_time", &self.engine_time)
            .field("cached_datapacks", &self.cache.len())
            .finish()
    }
}

fn round_timeout(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout.max(MIN_RPC_TIMEOUT))
    }
}

fn map_status(engine: &str, command: &'static str, status: tonic::Status) -> EngineError {
    match status.code() {
        tonic::Code::NotFound => EngineError::UnknownDataPack {
            engine: engine.to_string(),
            name: status.message().to_string(),
        },
        code => EngineError::Command {
            engine: engine.to_string(),
            command,
            message: format!("{} ({:?})", status.message(), code),
        },
    }
}

fn encode_identifier(id: &DataPackIdentifier) -> pb::DataPackIdentifier {
    pb::DataPackIdentifier {
        name: id.name.clone(),
        engine_name: id.engine_name.clone(),
        data_type: id.kind.as_str().to_string(),
    }
}

fn parse_reply_json(
    engine: &str,
    command: &'static str,
    body: &str,
) -> Result<serde_json::Value, EngineError> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(body).map_err(|e| EngineError::Command {
        engine: engine.to_string(),
        command,
        message: format!("reply carried malformed JSON: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(timeout: Duration) -> EngineClient {
        EngineClient::connect_lazy(
            "physics",
            "http://127.0.0.1:1",
            timeout,
            Arc::new(CodecRegistry::with_defaults()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn zero_timeout_blocks_indefinitely() {
        assert_eq!(client(Duration::ZERO).rpc_timeout(), None);
    }

    #[tokio::test]
    async fn sub_millisecond_timeouts_round_up() {
        assert_eq!(
            client(Duration::from_micros(10)).rpc_timeout(),
            Some(MIN_RPC_TIMEOUT)
        );
        assert_eq!(
            client(Duration::from_millis(5)).rpc_timeout(),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn invalid_address_is_rejected() {
        let result = EngineClient::connect_lazy(
            "physics",
            "not a uri",
            Duration::ZERO,
            Arc::new(CodecRegistry::with_defaults()),
        );
        assert!(matches!(result, Err(EngineError::Command { .. })));
    }

    #[tokio::test]
    async fn commands_are_rejected_before_initialization() {
        let mut client = client(Duration::ZERO);
        assert_eq!(client.state(), EngineState::Created);

        let err = client.run_loop_step(SimulationTime::from_millis(10)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { command: "run_loop_step", .. }));

        let err = client.send_data_packs(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));

        let err = client.update_data_packs(&[]).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn wait_without_step_in_flight_is_a_noop() {
        let mut client = client(Duration::ZERO);
        let time = client.wait_for_step_completion(None).await.unwrap();
        assert_eq!(time, SimulationTime::ZERO);
    }
}
