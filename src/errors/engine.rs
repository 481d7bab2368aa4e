// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine command error taxonomy.
//!
//! Every variant is unrecoverable at the point of occurrence: the engine
//! client never retries, and the synchronization loop treats any of them as
//! fatal to the current iteration.

use std::time::Duration;

use thiserror::Error;

use crate::datapack::SimulationTime;
use crate::engine::EngineState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport or the engine's own handler reported a failure.
    #[error("engine \"{engine}\": {command} failed: {message}")]
    Command {
        engine: String,
        command: &'static str,
        message: String,
    },

    /// No response arrived within the configured timeout. The underlying
    /// RPC is not cancelled; the engine keeps running the command.
    #[error("engine \"{engine}\": {command} did not complete within {timeout:?}")]
    Timeout {
        engine: String,
        command: &'static str,
        timeout: Duration,
    },

    /// The engine answered with a time that violates the timing invariant
    /// (negative, or below the previously recorded time).
    #[error("engine \"{engine}\" reported invalid time {reported} (previous: {previous})")]
    Protocol {
        engine: String,
        reported: SimulationTime,
        previous: SimulationTime,
    },

    /// The engine has no datapack registered under the requested name.
    #[error("datapack \"{name}\" is not registered on engine \"{engine}\"")]
    UnknownDataPack { engine: String, name: String },

    /// A command was issued in a lifecycle state that cannot accept it,
    /// e.g. sending datapacks while a step is outstanding.
    #[error("engine \"{engine}\" cannot accept {command} while {state}")]
    InvalidState {
        engine: String,
        command: &'static str,
        state: EngineState,
    },
}

impl EngineError {
    /// Name of the engine this error originated from.
    pub fn engine_name(&self) -> &str {
        match self {
            EngineError::Command { engine, .. }
            | EngineError::Timeout { engine, .. }
            | EngineError::Protocol { engine, .. }
            | EngineError::UnknownDataPack { engine, .. }
            | EngineError::InvalidState { engine, .. } => engine,
        }
    }
}
