// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation.
//!
//! All checks run and every failure is reported together, so a bad file
//! surfaces its problems in one pass instead of one restart at a time.

use std::collections::HashSet;

use crate::config::loader::SimulationConfig;
use crate::errors::ValidationError;

/// Validate a simulation configuration. Returns every violation found.
pub fn validate_config(config: &SimulationConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.simulation_timestep_ms == 0 {
        errors.push(ValidationError::ZeroTimestep);
    }
    if config.engines.is_empty() {
        errors.push(ValidationError::NoEngines);
    }

    let mut seen = HashSet::new();
    for engine in &config.engines {
        if engine.name.is_empty() {
            errors.push(ValidationError::EmptyEngineName);
        } else if !seen.insert(engine.name.as_str()) {
            errors.push(ValidationError::DuplicateEngineName {
                engine_name: engine.name.clone(),
            });
        }
        if !engine.address.starts_with("http://") && !engine.address.starts_with("https://") {
            errors.push(ValidationError::BadEngineAddress {
                engine_name: engine.name.clone(),
                address: engine.address.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{EngineConfig, RunMode};

    fn engine(name: &str, address: &str) -> EngineConfig {
        EngineConfig {
            name: name.to_string(),
            address: address.to_string(),
            command_timeout_ms: 0,
            init: serde_json::Value::Null,
        }
    }

    fn config(engines: Vec<EngineConfig>) -> SimulationConfig {
        SimulationConfig {
            simulation_timestep_ms: 10,
            wait_timeout_ms: None,
            run: RunMode::default(),
            engines,
        }
    }

    #[test]
    fn a_valid_config_passes() {
        let config = config(vec![
            engine("physics", "http://127.0.0.1:9002"),
            engine("brain", "http://127.0.0.1:9003"),
        ]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn duplicate_engine_names_are_reported() {
        let config = config(vec![
            engine("physics", "http://127.0.0.1:9002"),
            engine("physics", "http://127.0.0.1:9003"),
        ]);
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateEngineName {
            engine_name: "physics".to_string()
        }));
    }

    #[test]
    fn zero_timestep_and_missing_engines_are_both_reported() {
        let mut bad = config(Vec::new());
        bad.simulation_timestep_ms = 0;
        let errors = validate_config(&bad).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroTimestep));
        assert!(errors.contains(&ValidationError::NoEngines));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn scheme_less_addresses_are_rejected() {
        let config = config(vec![engine("physics", "127.0.0.1:9002")]);
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::BadEngineAddress { .. }
        ));
    }
}
