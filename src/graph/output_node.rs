// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Output nodes: the graph's exit points towards engines or user sinks.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::datapack::{PayloadKind, PayloadValue};
use crate::errors::{GraphRuntimeError, GraphWiringError};
use crate::graph::node::{
    ComputationalNode, Emission, InputPortSpec, NodeKind, OutputPortSpec,
};

/// How buffered messages leave the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPublishPolicy {
    /// One send call per buffered message.
    Series,
    /// All buffered messages in a single call.
    Batch,
}

/// Send callback: port name plus the messages delivered in this call.
pub type OutputSink =
    Box<dyn FnMut(&str, &[Option<PayloadValue>]) -> Result<(), String> + Send>;

struct OutputPort {
    name: String,
    kind: PayloadKind,
    buffer: Vec<Option<PayloadValue>>,
}

/// Node collecting upstream messages and handing them to a sink, or
/// buffering them for an external drain such as the engine bridge.
pub struct OutputNode {
    id: String,
    policy: OutputPublishPolicy,
    ports: Vec<OutputPort>,
    names: HashMap<String, usize>,
    sink: Option<OutputSink>,
    visited: bool,
    configured: bool,
}

impl OutputNode {
    pub fn new(id: impl Into<String>, policy: OutputPublishPolicy) -> Self {
        Self {
            id: id.into(),
            policy,
            ports: Vec::new(),
            names: HashMap::new(),
            sink: None,
            visited: false,
            configured: false,
        }
    }

    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn msg_publish_policy(&self) -> OutputPublishPolicy {
        self.policy
    }

    /// Register (or look up) the input port for one distinct upstream.
    /// Idempotent by name; requesting an existing name with a different
    /// kind fails, as does any registration once the graph is configured.
    pub fn get_or_register_input(
        &mut self,
        name: impl Into<String>,
        kind: PayloadKind,
    ) -> Result<(), GraphWiringError> {
        let name = name.into();
        if let Some(&index) = self.names.get(&name) {
            let existing = &self.ports[index];
            if existing.kind != kind {
                return Err(GraphWiringError::KindMismatch {
                    node: self.id.clone(),
                    port: name,
                    expected: existing.kind,
                    found: kind,
                });
            }
            return Ok(());
        }
        if self.configured {
            return Err(GraphWiringError::AlreadyConfigured);
        }
        self.names.insert(name.clone(), self.ports.len());
        self.ports.push(OutputPort {
            name,
            kind,
            buffer: Vec::new(),
        });
        Ok(())
    }

    /// Payload kind of a registered port, if it exists.
    pub fn port_kind(&self, port: &str) -> Option<PayloadKind> {
        self.names.get(port).map(|&index| self.ports[index].kind)
    }

    /// Drain the buffered messages of one port. Used by bridges when no
    /// sink is installed.
    pub fn take_messages(&mut self, port: &str) -> Vec<Option<PayloadValue>> {
        match self.names.get(port) {
            Some(&index) => std::mem::take(&mut self.ports[index].buffer),
            None => Vec::new(),
        }
    }
}

impl ComputationalNode for OutputNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn output_ports(&self) -> Vec<OutputPortSpec> {
        Vec::new()
    }

    fn input_ports(&self) -> Vec<InputPortSpec> {
        self.ports
            .iter()
            .map(|port| InputPortSpec {
                name: port.name.clone(),
                wire_kind: port.kind,
                delivered_kind: port.kind,
                max_subscriptions: Some(1),
            })
            .collect()
    }

    fn deliver(
        &mut self,
        port: &str,
        value: Option<PayloadValue>,
    ) -> Result<(), GraphRuntimeError> {
        let index = *self.names.get(port).ok_or_else(|| {
            GraphRuntimeError::BadDelivery {
                node: self.id.clone(),
                port: port.to_string(),
                message: "no such input port".to_string(),
            }
        })?;
        self.ports[index].buffer.push(value);
        Ok(())
    }

    fn compute(&mut self) -> Result<Vec<Emission>, GraphRuntimeError> {
        let Some(sink) = self.sink.as_mut() else {
            // No sink installed: the buffers wait for an external drain.
            return Ok(Vec::new());
        };
        for port in &mut self.ports {
            if port.buffer.is_empty() {
                continue;
            }
            let messages = std::mem::take(&mut port.buffer);
            let result = match self.policy {
                OutputPublishPolicy::Series => messages
                    .iter()
                    .try_for_each(|message| sink(&port.name, std::slice::from_ref(message))),
                OutputPublishPolicy::Batch => sink(&port.name, &messages),
            };
            result.map_err(|message| GraphRuntimeError::NodeFailed {
                node: self.id.clone(),
                message,
            })?;
        }
        Ok(Vec::new())
    }

    fn is_visited(&self) -> bool {
        self.visited
    }

    fn set_visited(&mut self, visited: bool) {
        self.visited = visited;
    }

    fn on_configured(&mut self) {
        self.configured = true;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for OutputNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputNode")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("ports", &self.ports.len())
            .finish()
    }
}
