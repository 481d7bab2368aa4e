// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

/// Errors that can occur during simulation configuration validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The configuration lists no engines at all
    NoEngines,
    /// An engine entry has an empty name
    EmptyEngineName,
    /// Two engine entries share the same name
    DuplicateEngineName {
        /// The duplicated engine name
        engine_name: String,
    },
    /// The simulation timestep is zero
    ZeroTimestep,
    /// An engine's server address is empty or lacks a scheme
    BadEngineAddress {
        engine_name: String,
        address: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoEngines => {
                write!(f, "the configuration must list at least one engine")
            }
            ValidationError::EmptyEngineName => {
                write!(f, "engine names must not be empty")
            }
            ValidationError::DuplicateEngineName { engine_name } => {
                write!(f, "duplicate engine name: '{}'", engine_name)
            }
            ValidationError::ZeroTimestep => {
                write!(f, "the simulation timestep must be greater than zero")
            }
            ValidationError::BadEngineAddress {
                engine_name,
                address,
            } => {
                write!(
                    f,
                    "engine '{}' has an invalid server address '{}' (expected e.g. http://host:port)",
                    engine_name, address
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}
