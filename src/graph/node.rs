// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The node abstraction shared by every graph participant.

use std::any::Any;

use crate::datapack::{PayloadKind, PayloadValue};
use crate::errors::GraphRuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Input,
    Functional,
    Output,
}

/// One message leaving a node on a named output port. A `None` value is
/// the null marker: downstream consumers observe "no data" explicitly.
#[derive(Debug, Clone)]
pub struct Emission {
    pub port: String,
    pub value: Option<PayloadValue>,
}

/// Describes an output port: the payload kind it emits.
#[derive(Debug, Clone)]
pub struct OutputPortSpec {
    pub name: String,
    pub kind: PayloadKind,
}

/// Describes an input port: the kind it receives on the wire, the kind it
/// hands to its owner, and how many subscriptions it accepts (`None` for
/// unlimited).
#[derive(Debug, Clone)]
pub struct InputPortSpec {
    pub name: String,
    pub wire_kind: PayloadKind,
    pub delivered_kind: PayloadKind,
    pub max_subscriptions: Option<usize>,
}

/// A node owned by the computational graph for its entire lifetime.
///
/// The graph scheduler resets every node's visited flag at tick start,
/// computes nodes in an order consistent with their subscriptions, and
/// routes emissions to downstream input ports via [`deliver`](Self::deliver).
pub trait ComputationalNode: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> NodeKind;

    fn output_ports(&self) -> Vec<OutputPortSpec>;

    fn input_ports(&self) -> Vec<InputPortSpec>;

    /// Accept one message on a named input port, already converted to the
    /// port's delivered kind. `None` is the null marker.
    fn deliver(
        &mut self,
        port: &str,
        value: Option<PayloadValue>,
    ) -> Result<(), GraphRuntimeError>;

    /// Run this node once for the current tick.
    fn compute(&mut self) -> Result<Vec<Emission>, GraphRuntimeError>;

    fn is_visited(&self) -> bool;

    fn set_visited(&mut self, visited: bool);

    /// Invoked once when the graph freezes its wiring.
    fn on_configured(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
