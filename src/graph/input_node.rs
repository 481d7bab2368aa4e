// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Input nodes: the graph's entry points for data arriving from outside.
//!
//! Each logical data stream owns a bounded FIFO. Adding to a full queue
//! drops the new message and reports `false`; this drop-newest policy is
//! deliberate backpressure, not an error.

use std::any::Any;
use std::collections::VecDeque;

use crate::datapack::{PayloadKind, PayloadValue};
use crate::errors::{GraphRuntimeError, GraphWiringError};
use crate::graph::node::{
    ComputationalNode, Emission, InputPortSpec, NodeKind, OutputPortSpec,
};

/// What an input node publishes each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgPublishPolicy {
    /// Only the most recent queued message.
    Last,
    /// The full queued list, as one list-valued message.
    All,
}

/// What happens to published data once the stream stops updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgCachePolicy {
    /// Already-published data stays visible downstream until overwritten.
    KeepCache,
    /// Previously published data is nulled out, so downstream consumers
    /// observe "no data" instead of a stale value.
    ClearCache,
}

/// Bounded FIFO for one data stream.
#[derive(Debug)]
pub struct DataPortHandle {
    capacity: usize,
    queue: VecDeque<PayloadValue>,
}

impl DataPortHandle {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: VecDeque::new(),
        }
    }

    /// Queue a message. Returns `false` and drops the message if the queue
    /// is full.
    pub fn add_msg(&mut self, msg: PayloadValue) -> bool {
        if self.queue.len() >= self.capacity {
            return false;
        }
        self.queue.push_back(msg);
        true
    }

    pub fn size(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn last(&self) -> Option<&PayloadValue> {
        self.queue.back()
    }

    fn all(&self) -> Vec<PayloadValue> {
        self.queue.iter().cloned().collect()
    }
}

struct StreamSlot {
    name: String,
    kind: PayloadKind,
    handle: DataPortHandle,
    /// New messages arrived since the last compute.
    dirty: bool,
    /// Something has been published at least once.
    published: bool,
    /// The null marker has been emitted since updates stopped.
    cleared: bool,
}

/// Graph entry node with one bounded queue per registered stream.
pub struct InputNode {
    id: String,
    publish_policy: MsgPublishPolicy,
    cache_policy: MsgCachePolicy,
    queue_capacity: usize,
    streams: Vec<StreamSlot>,
    visited: bool,
    configured: bool,
}

impl InputNode {
    pub fn new(
        id: impl Into<String>,
        publish_policy: MsgPublishPolicy,
        cache_policy: MsgCachePolicy,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id: id.into(),
            publish_policy,
            cache_policy,
            queue_capacity,
            streams: Vec::new(),
            visited: false,
            configured: false,
        }
    }

    pub fn msg_publish_policy(&self) -> MsgPublishPolicy {
        self.publish_policy
    }

    pub fn msg_cache_policy(&self) -> MsgCachePolicy {
        self.cache_policy
    }

    /// Register a named stream carrying `kind` payloads. The node exposes
    /// one output port per stream, named after it.
    pub fn register_stream(
        &mut self,
        name: impl Into<String>,
        kind: PayloadKind,
    ) -> Result<(), GraphWiringError> {
        if self.configured {
            return Err(GraphWiringError::AlreadyConfigured);
        }
        let name = name.into();
        if self.streams.iter().any(|stream| stream.name == name) {
            return Err(GraphWiringError::DuplicatePort {
                node: self.id.clone(),
                port: name,
            });
        }
        self.streams.push(StreamSlot {
            name,
            kind,
            handle: DataPortHandle::new(self.queue_capacity),
            dirty: false,
            published: false,
            cleared: false,
        });
        Ok(())
    }

    /// Queue one message on a stream. Returns `false` when the queue was
    /// full and the message was dropped.
    pub fn add_msg(
        &mut self,
        stream: &str,
        msg: PayloadValue,
    ) -> Result<bool, GraphRuntimeError> {
        let slot = self
            .streams
            .iter_mut()
            .find(|slot| slot.name == stream)
            .ok_or_else(|| GraphRuntimeError::BadDelivery {
                node: self.id.clone(),
                port: stream.to_string(),
                message: "no such stream".to_string(),
            })?;
        if msg.kind() != slot.kind {
            return Err(GraphRuntimeError::BadDelivery {
                node: self.id.clone(),
                port: stream.to_string(),
                message: format!("expected {} payload, got {}", slot.kind, msg.kind()),
            });
        }
        let accepted = slot.handle.add_msg(msg);
        if accepted {
            slot.dirty = true;
        }
        Ok(accepted)
    }

    /// Payload kind carried by a stream, if it exists.
    pub fn stream_kind(&self, stream: &str) -> Option<PayloadKind> {
        self.streams
            .iter()
            .find(|slot| slot.name == stream)
            .map(|slot| slot.kind)
    }

    /// Queue size of one stream, mainly for tests and diagnostics.
    pub fn queued(&self, stream: &str) -> Option<usize> {
        self.streams
            .iter()
            .find(|slot| slot.name == stream)
            .map(|slot| slot.handle.size())
    }
}

impl ComputationalNode for InputNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Input
    }

    fn output_ports(&self) -> Vec<OutputPortSpec> {
        self.streams
            .iter()
            .map(|slot| OutputPortSpec {
                name: slot.name.clone(),
                kind: match self.publish_policy {
                    MsgPublishPolicy::Last => slot.kind,
                    MsgPublishPolicy::All => PayloadKind::List,
                },
            })
            .collect()
    }

    fn input_ports(&self) -> Vec<InputPortSpec> {
        Vec::new()
    }

    fn deliver(
        &mut self,
        port: &str,
        _value: Option<PayloadValue>,
    ) -> Result<(), GraphRuntimeError> {
        Err(GraphRuntimeError::BadDelivery {
            node: self.id.clone(),
            port: port.to_string(),
            message: "input nodes accept no subscriptions".to_string(),
        })
    }

    fn compute(&mut self) -> Result<Vec<Emission>, GraphRuntimeError> {
        let mut emissions = Vec::new();
        for slot in &mut self.streams {
            if slot.dirty {
                let value = match self.publish_policy {
                    MsgPublishPolicy::Last => slot.handle.last().cloned(),
                    MsgPublishPolicy::All => Some(PayloadValue::List(slot.handle.all())),
                };
                emissions.push(Emission {
                    port: slot.name.clone(),
                    value,
                });
                slot.handle.clear();
                slot.dirty = false;
                slot.published = true;
                slot.cleared = false;
            } else if self.cache_policy == MsgCachePolicy::ClearCache
                && slot.published
                && !slot.cleared
            {
                // The stream stopped updating: null out what was published.
                emissions.push(Emission {
                    port: slot.name.clone(),
                    value: None,
                });
                slot.cleared = true;
            }
        }
        Ok(emissions)
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
