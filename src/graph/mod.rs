// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Computational graph: a dataflow execution model layered on the same
//! engine clients as the FTI loop, executed once per tick in topological
//! order.

pub mod event_loop;
pub mod functional_node;
pub mod input_node;
pub mod manager;
pub mod node;
pub mod output_node;
pub mod port;


pub use event_loop::{EngineInputBinding, EngineOutputBinding, EventLoop, EventLoopError};
pub use functional_node::{ExecPolicy, FunctionalCallable, FunctionalNode};
pub use input_node::{DataPortHandle, InputNode, MsgCachePolicy, MsgPublishPolicy};
pub use manager::ComputationalGraph;
pub use node::{ComputationalNode, Emission, InputPortSpec, NodeKind, OutputPortSpec};
pub use output_node::{OutputNode, OutputPublishPolicy, OutputSink};
pub use port::{ConverterRegistry, PortRef};
