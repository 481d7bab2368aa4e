// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Continuous-time execution of a configured graph.
//!
//! The event loop ticks the graph at a fixed wall-clock interval. Engine
//! bridges connect the graph to the same engine clients the FTI loop uses:
//! before each tick, bound datapacks are pulled from their engines and fed
//! into input-node streams; after the tick, buffered output-node messages
//! are flushed to their target engines. Any error inside a tick stops the
//! loop.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::datapack::{DataPack, DataPackIdentifier};
use crate::engine::EngineClient;
use crate::errors::{EngineError, GraphRuntimeError, GraphWiringError};
use crate::graph::manager::ComputationalGraph;

#[derive(Debug, Error)]
pub enum EventLoopError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Graph(#[from] GraphRuntimeError),
}

/// Feeds one engine datapack into one input-node stream each tick.
#[derive(Debug, Clone)]
pub struct EngineInputBinding {
    pub node: String,
    pub stream: String,
    pub identifier: DataPackIdentifier,
}

/// Flushes one output-node port to the engine its identifier addresses.
#[derive(Debug, Clone)]
pub struct EngineOutputBinding {
    pub node: String,
    pub port: String,
    pub identifier: DataPackIdentifier,
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct EventLoopReport {
    pub ticks: u64,
    pub elapsed: Duration,
}

/// Ticks a configured graph against a set of engine clients.
#[derive(Debug)]
pub struct EventLoop {
    graph: ComputationalGraph,
    engines: Vec<EngineClient>,
    input_bindings: Vec<EngineInputBinding>,
    output_bindings: Vec<EngineOutputBinding>,
    tick_interval: Duration,
}

impl EventLoop {
    /// Build an event loop over a configured graph. Every binding is
    /// validated here: the referenced nodes, streams, ports and engines
    /// must exist and the payload kinds must line up.
    pub fn new(
        mut graph: ComputationalGraph,
        engines: Vec<EngineClient>,
        input_bindings: Vec<EngineInputBinding>,
        output_bindings: Vec<EngineOutputBinding>,
        tick_interval: Duration,
    ) -> Result<Self, GraphWiringError> {
        for binding in &input_bindings {
            let node = graph.input_node_mut(&binding.node).ok_or_else(|| {
                GraphWiringError::UnknownNode {
                    node: binding.node.clone(),
                }
            })?;
            let kind =
                node.stream_kind(&binding.stream)
                    .ok_or_else(|| GraphWiringError::UnknownPort {
                        node: binding.node.clone(),
                        port: binding.stream.clone(),
                    })?;
            if kind != binding.identifier.kind {
                return Err(GraphWiringError::KindMismatch {
                    node: binding.node.clone(),
                    port: binding.stream.clone(),
                    expected: kind,
                    found: binding.identifier.kind,
                });
            }
            if !engines
                .iter()
                .any(|engine| engine.name() == binding.identifier.engine_name)
            {
                return Err(GraphWiringError::UnknownNode {
                    node: binding.identifier.engine_name.clone(),
                });
            }
        }
        for binding in &output_bindings {
            let node = graph.output_node_mut(&binding.node).ok_or_else(|| {
                GraphWiringError::UnknownNode {
                    node: binding.node.clone(),
                }
            })?;
            let kind =
                node.port_kind(&binding.port)
                    .ok_or_else(|| GraphWiringError::UnknownPort {
                        node: binding.node.clone(),
                        port: binding.port.clone(),
                    })?;
            if kind != binding.identifier.kind {
                return Err(GraphWiringError::KindMismatch {
                    node: binding.node.clone(),
                    port: binding.port.clone(),
                    expected: kind,
                    found: binding.identifier.kind,
                });
            }
            if !engines
                .iter()
                .any(|engine| engine.name() == binding.identifier.engine_name)
            {
                return Err(GraphWiringError::UnknownNode {
                    node: binding.identifier.engine_name.clone(),
                });
            }
        }
        Ok(Self {
            graph,
            engines,
            input_bindings,
            output_bindings,
            tick_interval,
        })
    }

    pub fn graph_mut(&mut self) -> &mut ComputationalGraph {
        &mut self.graph
    }

    pub fn engine(&self, name: &str) -> Option<&EngineClient> {
        self.engines.iter().find(|engine| engine.name() == name)
    }

    /// Run one tick: pull bound datapacks, compute the graph, flush bound
    /// outputs.
    pub async fn run_tick(&mut self) -> Result<(), EventLoopError> {
        for binding in &self.input_bindings {
            let engine = self
                .engines
                .iter_mut()
                .find(|engine| engine.name() == binding.identifier.engine_name)
                .expect("bindings validated at construction");
            let merged = engine
                .update_data_packs(std::slice::from_ref(&binding.identifier))
                .await?;
            let Some(pack) = merged.into_iter().next() else {
                continue;
            };
            let Some(payload) = pack.into_payload() else {
                continue;
            };
            let node = self
                .graph
                .input_node_mut(&binding.node)
                .expect("bindings validated at construction");
            // A full queue drops the message; that is the node's declared
            // backpressure policy, not an error.
            node.add_msg(&binding.stream, payload)?;
        }

        self.graph.compute_tick()?;

        for binding in &self.output_bindings {
            let node = self
                .graph
                .output_node_mut(&binding.node)
                .expect("bindings validated at construction");
            let messages = node.take_messages(&binding.port);
            if messages.is_empty() {
                continue;
            }
            let packs: Vec<DataPack> = messages
                .into_iter()
                .map(|message| match message {
                    Some(value) => DataPack::with_value(
                        binding.identifier.name.clone(),
                        binding.identifier.engine_name.clone(),
                        value,
                    ),
                    None => DataPack::empty(binding.identifier.clone()),
                })
                .collect();
            let engine = self
                .engines
                .iter_mut()
                .find(|engine| engine.name() == binding.identifier.engine_name)
                .expect("bindings validated at construction");
            engine.send_data_packs(&packs).await?;
        }
        Ok(())
    }

    /// Tick at the configured interval until the deadline passes or the
    /// token is cancelled. The first failing tick stops the loop.
    pub async fn run_for(
        &mut self,
        limit: Duration,
        cancel: CancellationToken,
    ) -> Result<EventLoopReport, EventLoopError> {
        let started = Instant::now();
        let deadline = started + limit;
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    self.run_tick().await?;
                    ticks += 1;
                }
            }
        }
        tracing::info!(ticks, elapsed = ?started.elapsed(), "event loop finished");
        Ok(EventLoopReport {
            ticks,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::codec::CodecRegistry;
    use crate::datapack::{PayloadKind, PayloadValue};
    use crate::engine::test_support::{spawn_server, AccumulatingAdapter, MemoryController};
    use crate::engine::EngineServer;
    use crate::graph::functional_node::{ExecPolicy, FunctionalNode};
    use crate::graph::input_node::{InputNode, MsgCachePolicy, MsgPublishPolicy};
    use crate::graph::output_node::{OutputNode, OutputPublishPolicy};
    use crate::graph::port::PortRef;

    fn bridge_graph() -> ComputationalGraph {
        let mut source = InputNode::new(
            "from_physics",
            MsgPublishPolicy::Last,
            MsgCachePolicy::KeepCache,
            4,
        );
        source.register_stream("pose", PayloadKind::Scalar).unwrap();

        let mut double = FunctionalNode::new(
            "double",
            ExecPolicy::OnNewInput,
            Box::new(|inputs| {
                let value = match &inputs[0] {
                    Some(PayloadValue::Scalar(value)) => *value,
                    _ => return Ok(vec![None]),
                };
                Ok(vec![Some(PayloadValue::Scalar(value * 2.0))])
            }),
        );
        double
            .register_input(0, "in", PayloadKind::Scalar, PayloadKind::Scalar, None)
            .unwrap();
        double.register_output(0, "out", PayloadKind::Scalar).unwrap();

        let mut to_brain = OutputNode::new("to_brain", OutputPublishPolicy::Batch);
        to_brain.get_or_register_input("in", PayloadKind::Scalar).unwrap();

        let mut graph = ComputationalGraph::new();
        graph.add_node(Box::new(source)).unwrap();
        graph.add_node(Box::new(double)).unwrap();
        graph.add_node(Box::new(to_brain)).unwrap();
        graph
            .subscribe(
                PortRef::new("from_physics", "pose"),
                PortRef::new("double", "in"),
            )
            .unwrap();
        graph
            .subscribe(PortRef::new("double", "out"), PortRef::new("to_brain", "in"))
            .unwrap();
        graph.configure().unwrap();
        graph
    }

    #[tokio::test]
    async fn a_tick_pulls_from_engines_and_flushes_to_engines() {
        let registry = Arc::new(CodecRegistry::with_defaults());

        let pose_controller =
            MemoryController::with_payload(1.5f64.to_le_bytes().to_vec());
        let physics_server = EngineServer::new("physics", Box::new(AccumulatingAdapter::new()))
            .register_datapack("pose", pose_controller);
        let physics_address = spawn_server(physics_server).await;
        let mut physics = crate::engine::EngineClient::connect_lazy(
            "physics",
            &physics_address,
            Duration::ZERO,
            registry.clone(),
        )
        .unwrap();
        physics.initialize(serde_json::json!({})).await.unwrap();

        let command_controller = MemoryController::new();
        let brain_server = EngineServer::new("brain", Box::new(AccumulatingAdapter::new()))
            .register_datapack("command", command_controller.clone());
        let brain_address = spawn_server(brain_server).await;
        let mut brain = crate::engine::EngineClient::connect_lazy(
            "brain",
            &brain_address,
            Duration::ZERO,
            registry,
        )
        .unwrap();
        brain.initialize(serde_json::json!({})).await.unwrap();

        let mut event_loop = EventLoop::new(
            bridge_graph(),
            vec![physics, brain],
            vec![EngineInputBinding {
                node: "from_physics".to_string(),
                stream: "pose".to_string(),
                identifier: DataPackIdentifier::new("pose", "physics", PayloadKind::Scalar),
            }],
            vec![EngineOutputBinding {
                node: "to_brain".to_string(),
                port: "in".to_string(),
                identifier: DataPackIdentifier::new("command", "brain", PayloadKind::Scalar),
            }],
            Duration::from_millis(10),
        )
        .unwrap();

        event_loop.run_tick().await.unwrap();

        assert_eq!(command_controller.set_calls(), 1);
        // 1.5 pulled from physics, doubled by the graph, flushed to brain.
        let physics_cache = event_loop.engine("physics").unwrap().cache();
        assert_eq!(physics_cache.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_without_an_error() {
        let mut event_loop = EventLoop::new(
            bridge_graph(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Duration::from_millis(5),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = event_loop
            .run_for(Duration::from_secs(5), cancel)
            .await
            .unwrap();
        assert_eq!(report.ticks, 0);
    }

    #[tokio::test]
    async fn bindings_against_unknown_nodes_are_rejected() {
        let err = EventLoop::new(
            bridge_graph(),
            Vec::new(),
            vec![EngineInputBinding {
                node: "ghost".to_string(),
                stream: "pose".to_string(),
                identifier: DataPackIdentifier::new("pose", "physics", PayloadKind::Scalar),
            }],
            Vec::new(),
            Duration::from_millis(5),
        )
        .unwrap_err();
        assert!(matches!(err, GraphWiringError::UnknownNode { .. }));
    }
}
