// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph ownership, wiring validation and the per-tick scheduler.
//!
//! Nodes and ports are owned by the graph for its entire lifetime. Edges
//! are pure subscription relations, established while wiring and immutable
//! after [`ComputationalGraph::configure`]. Configuration computes a
//! topological schedule with Kahn's algorithm; every wiring error of the
//! error taxonomy is raised here, so a misconfigured graph never starts.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::datapack::PayloadKind;
use crate::errors::{GraphRuntimeError, GraphWiringError};
use crate::graph::input_node::InputNode;
use crate::graph::node::{ComputationalNode, NodeKind};
use crate::graph::output_node::OutputNode;
use crate::graph::port::{ConverterRegistry, PortRef};

#[derive(Debug, Clone)]
struct Subscription {
    from: PortRef,
    to: PortRef,
}

struct Route {
    target: usize,
    port: String,
    convert: Option<(PayloadKind, PayloadKind)>,
}

/// Dataflow graph of input, functional and output nodes.
pub struct ComputationalGraph {
    nodes: Vec<Box<dyn ComputationalNode>>,
    index: HashMap<String, usize>,
    subscriptions: Vec<Subscription>,
    converters: ConverterRegistry,
    schedule: Vec<usize>,
    routes: HashMap<(usize, String), Vec<Route>>,
    configured: bool,
}

impl ComputationalGraph {
    pub fn new() -> Self {
        Self::with_converters(ConverterRegistry::with_defaults())
    }

    pub fn with_converters(converters: ConverterRegistry) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            subscriptions: Vec::new(),
            converters,
            schedule: Vec::new(),
            routes: HashMap::new(),
            configured: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_node(&mut self, node: Box<dyn ComputationalNode>) -> Result<(), GraphWiringError> {
        if self.configured {
            return Err(GraphWiringError::AlreadyConfigured);
        }
        let id = node.id().to_string();
        if self.index.contains_key(&id) {
            return Err(GraphWiringError::DuplicateNode { node: id });
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    /// Subscribe the input port `to` to the output port `from`.
    ///
    /// All wiring contracts are enforced here: both ports must exist, the
    /// output kind must match the input's wire kind, the wire-to-callback
    /// conversion must be registered, the input port must not exceed its
    /// subscription budget, and the same edge must not be added twice.
    pub fn subscribe(&mut self, from: PortRef, to: PortRef) -> Result<(), GraphWiringError> {
        if self.configured {
            return Err(GraphWiringError::AlreadyConfigured);
        }
        let from_index = *self
            .index
            .get(&from.node)
            .ok_or_else(|| GraphWiringError::UnknownNode {
                node: from.node.clone(),
            })?;
        let to_index = *self
            .index
            .get(&to.node)
            .ok_or_else(|| GraphWiringError::UnknownNode {
                node: to.node.clone(),
            })?;

        let emitted = self.nodes[from_index]
            .output_ports()
            .into_iter()
            .find(|spec| spec.name == from.port)
            .ok_or_else(|| GraphWiringError::UnknownPort {
                node: from.node.clone(),
                port: from.port.clone(),
            })?;
        let receiving = self.nodes[to_index]
            .input_ports()
            .into_iter()
            .find(|spec| spec.name == to.port)
            .ok_or_else(|| GraphWiringError::UnknownPort {
                node: to.node.clone(),
                port: to.port.clone(),
            })?;

        if self
            .subscriptions
            .iter()
            .any(|sub| sub.from == from && sub.to == to)
        {
            return Err(GraphWiringError::DuplicateSubscription {
                node: to.node.clone(),
                port: to.port.clone(),
            });
        }
        if let Some(max) = receiving.max_subscriptions {
            let current = self
                .subscriptions
                .iter()
                .filter(|sub| sub.to == to)
                .count();
            if current >= max {
                return Err(GraphWiringError::PortCapacity {
                    node: to.node.clone(),
                    port: to.port.clone(),
                    max_subscriptions: max,
                });
            }
        }
        if emitted.kind != receiving.wire_kind {
            return Err(GraphWiringError::KindMismatch {
                node: to.node.clone(),
                port: to.port.clone(),
                expected: receiving.wire_kind,
                found: emitted.kind,
            });
        }
        if !self
            .converters
            .contains(receiving.wire_kind, receiving.delivered_kind)
        {
            return Err(GraphWiringError::MissingConverter {
                node: to.node.clone(),
                port: to.port.clone(),
                from: receiving.wire_kind,
                to: receiving.delivered_kind,
            });
        }

        self.subscriptions.push(Subscription { from, to });
        Ok(())
    }

    /// Freeze the wiring: verify acyclicity, compute the topological
    /// schedule, build the routing table and notify every node.
    pub fn configure(&mut self) -> Result<(), GraphWiringError> {
        if self.configured {
            return Err(GraphWiringError::AlreadyConfigured);
        }
        self.schedule = self.compute_schedule()?;
        self.routes = self.build_routes();
        for node in &mut self.nodes {
            node.on_configured();
        }
        self.configured = true;
        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.subscriptions.len(),
            "computational graph configured"
        );
        Ok(())
    }

    /// Kahn's algorithm over node-level dependencies. Input nodes carry no
    /// upstream dependency and are scheduled first.
    fn compute_schedule(&self) -> Result<Vec<usize>, GraphWiringError> {
        let mut dependents: Vec<HashSet<usize>> = vec![HashSet::new(); self.nodes.len()];
        let mut in_degree = vec![0usize; self.nodes.len()];
        for sub in &self.subscriptions {
            let from = self.index[&sub.from.node];
            let to = self.index[&sub.to.node];
            if from != to && dependents[from].insert(to) {
                in_degree[to] += 1;
            }
        }

        let mut queue = VecDeque::new();
        // Seed input nodes first so they are always eligible before any
        // dependent work, then the remaining roots in insertion order.
        for (index, node) in self.nodes.iter().enumerate() {
            if node.kind() == NodeKind::Input && in_degree[index] == 0 {
                queue.push_back(index);
            }
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.kind() != NodeKind::Input && in_degree[index] == 0 {
                queue.push_back(index);
            }
        }

        let mut schedule = Vec::with_capacity(self.nodes.len());
        while let Some(index) = queue.pop_front() {
            schedule.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if schedule.len() != self.nodes.len() {
            return Err(GraphWiringError::CyclicGraph);
        }
        Ok(schedule)
    }

    fn build_routes(&self) -> HashMap<(usize, String), Vec<Route>> {
        let mut routes: HashMap<(usize, String), Vec<Route>> = HashMap::new();
        for sub in &self.subscriptions {
            let from = self.index[&sub.from.node];
            let to = self.index[&sub.to.node];
            let receiving = self.nodes[to]
                .input_ports()
                .into_iter()
                .find(|spec| spec.name == sub.to.port)
                .expect("subscription validated at wiring time");
            let convert = if receiving.wire_kind == receiving.delivered_kind {
                None
            } else {
                Some((receiving.wire_kind, receiving.delivered_kind))
            };
            routes
                .entry((from, sub.from.port.clone()))
                .or_default()
                .push(Route {
                    target: to,
                    port: sub.to.port.clone(),
                    convert,
                });
        }
        routes
    }

    /// Execute one tick: reset all visited flags, then compute every node
    /// in schedule order, routing emissions to subscribed input ports.
    pub fn compute_tick(&mut self) -> Result<(), GraphRuntimeError> {
        if !self.configured {
            return Err(GraphRuntimeError::NotConfigured);
        }
        for node in &mut self.nodes {
            node.set_visited(false);
        }
        let schedule = self.schedule.clone();
        for index in schedule {
            let emissions = self.nodes[index].compute()?;
            self.nodes[index].set_visited(true);
            for emission in emissions {
                let Some(routes) = self.routes.get(&(index, emission.port.clone())) else {
                    continue;
                };
                // Routing happens before downstream nodes compute, so each
                // subscriber observes this tick's value.
                for route in routes {
                    let value = match (&route.convert, &emission.value) {
                        (Some((from, to)), Some(value)) => Some(
                            self.converters.convert(*from, *to, value).map_err(
                                |message| GraphRuntimeError::Conversion {
                                    node: self.nodes[route.target].id().to_string(),
                                    port: route.port.clone(),
                                    message,
                                },
                            )?,
                        ),
                        (_, value) => value.clone(),
                    };
                    self.nodes[route.target].deliver(&route.port, value)?;
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&dyn ComputationalNode> {
        self.index.get(id).map(|&index| self.nodes[index].as_ref())
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut (dyn ComputationalNode + 'static)> {
        let index = *self.index.get(id)?;
        Some(self.nodes[index].as_mut())
    }

    /// Typed access to an input node, for feeding messages from outside.
    pub fn input_node_mut(&mut self, id: &str) -> Option<&mut InputNode> {
        self.node_mut(id)?.as_any_mut().downcast_mut()
    }

    /// Typed access to an output node, for draining buffered messages.
    pub fn output_node_mut(&mut self, id: &str) -> Option<&mut OutputNode> {
        self.node_mut(id)?.as_any_mut().downcast_mut()
    }
}

impl Default for ComputationalGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComputationalGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputationalGraph")
            .field("nodes", &self.nodes.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("configured", &self.configured)
            .finish()
    }
}
