// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Computational graph errors.
//!
//! Wiring errors are detected while the graph is being configured; a graph
//! that produced one must not start. Runtime errors abort the current tick.

use std::fmt;

use crate::datapack::PayloadKind;

/// Errors raised while wiring the computational graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphWiringError {
    /// A node with this id is already part of the graph
    DuplicateNode { node: String },
    /// A subscription referenced a node that does not exist
    UnknownNode { node: String },
    /// A subscription referenced a port its node does not declare
    UnknownPort { node: String, port: String },
    /// The input port has reached its configured maximum subscriber count
    PortCapacity {
        node: String,
        port: String,
        max_subscriptions: usize,
    },
    /// The input port is already subscribed to an output port
    DuplicateSubscription { node: String, port: String },
    /// A port was registered twice under the same name or positional index
    DuplicatePort { node: String, port: String },
    /// The output port's payload kind does not match the input port's wire kind
    KindMismatch {
        node: String,
        port: String,
        expected: PayloadKind,
        found: PayloadKind,
    },
    /// No converter is registered for the wire-to-callback kind pair
    MissingConverter {
        node: String,
        port: String,
        from: PayloadKind,
        to: PayloadKind,
    },
    /// The subscription graph contains a cycle
    CyclicGraph,
    /// Wiring was attempted after the graph had been configured
    AlreadyConfigured,
}

impl fmt::Display for GraphWiringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphWiringError::DuplicateNode { node } => {
                write!(f, "a node named \"{}\" is already registered", node)
            }
            GraphWiringError::UnknownNode { node } => {
                write!(f, "node \"{}\" does not exist", node)
            }
            GraphWiringError::UnknownPort { node, port } => {
                write!(f, "node \"{}\" has no port named \"{}\"", node, port)
            }
            GraphWiringError::PortCapacity {
                node,
                port,
                max_subscriptions,
            } => {
                write!(
                    f,
                    "port \"{}\" of node \"{}\" can only have {} subscriber(s)",
                    port, node, max_subscriptions
                )
            }
            GraphWiringError::DuplicateSubscription { node, port } => {
                write!(
                    f,
                    "port \"{}\" of node \"{}\" is already subscribed to an output port",
                    port, node
                )
            }
            GraphWiringError::DuplicatePort { node, port } => {
                write!(
                    f,
                    "port \"{}\" is already registered on node \"{}\"",
                    port, node
                )
            }
            GraphWiringError::KindMismatch {
                node,
                port,
                expected,
                found,
            } => {
                write!(
                    f,
                    "port \"{}\" of node \"{}\" receives {} but the output port emits {}",
                    port, node, expected, found
                )
            }
            GraphWiringError::MissingConverter {
                node,
                port,
                from,
                to,
            } => {
                write!(
                    f,
                    "no converter from {} to {} is registered for port \"{}\" of node \"{}\"",
                    from, to, port, node
                )
            }
            GraphWiringError::CyclicGraph => {
                write!(f, "the subscription graph contains a cycle")
            }
            GraphWiringError::AlreadyConfigured => {
                write!(f, "the graph has already been configured")
            }
        }
    }
}

impl std::error::Error for GraphWiringError {}

/// Errors raised while computing a tick. Fatal to the tick's run.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphRuntimeError {
    /// `compute_tick` was called before the graph was configured
    NotConfigured,
    /// A registered converter rejected a message
    Conversion {
        node: String,
        port: String,
        message: String,
    },
    /// A node's computation failed
    NodeFailed { node: String, message: String },
    /// A message arrived on a port that does not exist or carries the wrong kind
    BadDelivery { node: String, port: String, message: String },
}

impl fmt::Display for GraphRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphRuntimeError::NotConfigured => {
                write!(f, "the graph must be configured before it can compute a tick")
            }
            GraphRuntimeError::Conversion {
                node,
                port,
                message,
            } => {
                write!(
                    f,
                    "conversion failed for port \"{}\" of node \"{}\": {}",
                    port, node, message
                )
            }
            GraphRuntimeError::NodeFailed { node, message } => {
                write!(f, "node \"{}\" failed: {}", node, message)
            }
            GraphRuntimeError::BadDelivery {
                node,
                port,
                message,
            } => {
                write!(
                    f,
                    "cannot deliver to port \"{}\" of node \"{}\": {}",
                    port, node, message
                )
            }
        }
    }
}

impl std::error::Error for GraphRuntimeError {}
