// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Functional nodes: a pure computation over a fixed input tuple producing
//! a fixed output tuple.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::datapack::{PayloadKind, PayloadValue};
use crate::errors::{GraphRuntimeError, GraphWiringError};
use crate::graph::node::{
    ComputationalNode, Emission, InputPortSpec, NodeKind, OutputPortSpec,
};

/// When the wrapped function runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPolicy {
    /// Only when at least one subscribed input received a new message
    /// since the last computation.
    OnNewInput,
    /// Unconditionally every tick; absent inputs are passed as `None`.
    Always,
}

/// The wrapped computation: one optional value per input port by position,
/// one optional value per output port by position.
pub type FunctionalCallable = Box<
    dyn FnMut(&[Option<PayloadValue>]) -> Result<Vec<Option<PayloadValue>>, String> + Send,
>;

struct InputSlot {
    name: String,
    wire_kind: PayloadKind,
    delivered_kind: PayloadKind,
    max_subscriptions: Option<usize>,
}

struct OutputSlot {
    name: String,
    kind: PayloadKind,
}

/// Node wrapping a user function with positionally registered ports.
pub struct FunctionalNode {
    id: String,
    policy: ExecPolicy,
    inputs: Vec<Option<InputSlot>>,
    outputs: Vec<Option<OutputSlot>>,
    port_names: HashMap<String, usize>,
    values: Vec<Option<PayloadValue>>,
    fresh: bool,
    visited: bool,
    callable: FunctionalCallable,
}

impl FunctionalNode {
    pub fn new(id: impl Into<String>, policy: ExecPolicy, callable: FunctionalCallable) -> Self {
        Self {
            id: id.into(),
            policy,
            inputs: Vec::new(),
            outputs: Vec::new(),
            port_names: HashMap::new(),
            values: Vec::new(),
            fresh: false,
            visited: false,
            callable,
        }
    }

    pub fn exec_policy(&self) -> ExecPolicy {
        self.policy
    }

    /// Register the input port at positional `index`. Registering the same
    /// index or the same name twice fails.
    pub fn register_input(
        &mut self,
        index: usize,
        name: impl Into<String>,
        wire_kind: PayloadKind,
        delivered_kind: PayloadKind,
        max_subscriptions: Option<usize>,
    ) -> Result<(), GraphWiringError> {
        let name = name.into();
        self.claim_name(&name)?;
        if self.inputs.len() <= index {
            self.inputs.resize_with(index + 1, || None);
            self.values.resize_with(index + 1, || None);
        }
        if self.inputs[index].is_some() {
            return Err(GraphWiringError::DuplicatePort {
                node: self.id.clone(),
                port: name,
            });
        }
        self.port_names.insert(name.clone(), index);
        self.inputs[index] = Some(InputSlot {
            name,
            wire_kind,
            delivered_kind,
            max_subscriptions,
        });
        Ok(())
    }

    /// Register the output port at positional `index`. Registering the same
    /// index or the same name twice fails.
    pub fn register_output(
        &mut self,
        index: usize,
        name: impl Into<String>,
        kind: PayloadKind,
    ) -> Result<(), GraphWiringError> {
        let name = name.into();
        self.claim_name(&name)?;
        if self.outputs.len() <= index {
            self.outputs.resize_with(index + 1, || None);
        }
        if self.outputs[index].is_some() {
            return Err(GraphWiringError::DuplicatePort {
                node: self.id.clone(),
                port: name,
            });
        }
        self.port_names.insert(name.clone(), index);
        self.outputs[index] = Some(OutputSlot { name, kind });
        Ok(())
    }

    fn claim_name(&self, name: &str) -> Result<(), GraphWiringError> {
        if self.port_names.contains_key(name) {
            return Err(GraphWiringError::DuplicatePort {
                node: self.id.clone(),
                port: name.to_string(),
            });
        }
        Ok(())
    }
}

impl ComputationalNode for FunctionalNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Functional
    }

    fn output_ports(&self) -> Vec<OutputPortSpec> {
        self.outputs
            .iter()
            .flatten()
            .map(|slot| OutputPortSpec {
                name: slot.name.clone(),
                kind: slot.kind,
            })
            .collect()
    }

    fn input_ports(&self) -> Vec<InputPortSpec> {
        self.inputs
            .iter()
            .flatten()
            .map(|slot| InputPortSpec {
                name: slot.name.clone(),
                wire_kind: slot.wire_kind,
                delivered_kind: slot.delivered_kind,
                max_subscriptions: slot.max_subscriptions,
            })
            .collect()
    }

    fn deliver(
        &mut self,
        port: &str,
        value: Option<PayloadValue>,
    ) -> Result<(), GraphRuntimeError> {
        let index = match self.port_names.get(port) {
            Some(&index) if self.inputs.get(index).map_or(false, Option::is_some) => index,
            _ => {
                return Err(GraphRuntimeError::BadDelivery {
                    node: self.id.clone(),
                    port: port.to_string(),
                    message: "no such input port".to_string(),
                })
            }
        };
        self.values[index] = value;
        self.fresh = true;
        Ok(())
    }

    fn compute(&mut self) -> Result<Vec<Emission>, GraphRuntimeError> {
        if self.policy == ExecPolicy::OnNewInput && !self.fresh {
            return Ok(Vec::new());
        }
        let produced = (self.callable)(&self.values).map_err(|message| {
            GraphRuntimeError::NodeFailed {
                node: self.id.clone(),
                message,
            }
        })?;
        self.fresh = false;

        let outputs: Vec<&OutputSlot> = self.outputs.iter().flatten().collect();
        if produced.len() != outputs.len() {
            return Err(GraphRuntimeError::NodeFailed {
                node: self.id.clone(),
                message: format!(
                    "function produced {} values for {} output ports",
                    produced.len(),
                    outputs.len()
                ),
            });
        }
        let mut emissions = Vec::new();
        for (value, slot) in produced.into_iter().zip(outputs) {
            if let Some(value) = &value {
                if value.kind() != slot.kind {
                    return Err(GraphRuntimeError::NodeFailed {
                        node: self.id.clone(),
                        message: format!(
                            "port \"{}\" expects {} but the function produced {}",
                            slot.name,
                            slot.kind,
                            value.kind()
                        ),
                    });
                }
            }
            emissions.push(Emission {
                port: slot.name.clone(),
                value,
            });
        }
        Ok(emissions)
    }

    fn is_visited(&self) -> bool {
        self.visited
    }

    fn set_visited(&mut self, visited: bool) {
        self.visited = visited;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Debug for FunctionalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalNode")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("inputs", &self.inputs.iter().flatten().count())
            .field("outputs", &self.outputs.iter().flatten().count())
            .finish()
    }
}
