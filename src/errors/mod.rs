// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod engine;
mod graph;

pub use config::ValidationError;
pub use engine::EngineError;
pub use graph::{GraphRuntimeError, GraphWiringError};
