// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::CodecRegistry;
use crate::config::loader::SimulationConfig;
use crate::datapack::SimulationTime;
use crate::engine::EngineClient;
use crate::fti::{FtiLoop, FtiLoopConfig};
use crate::functions::FunctionManager;

/// Runtime builder - assembles engine clients and the FTI loop from a
/// validated configuration.
///
/// The returned loop carries an empty function registry; transceiver and
/// preprocessing functions are registered programmatically through
/// [`FtiLoop::functions_mut`] before the run starts.
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build the FTI loop plus the per-engine init payloads found in the
    /// configuration.
    pub fn from_config(
        config: &SimulationConfig,
    ) -> Result<(FtiLoop, HashMap<String, serde_json::Value>), String> {
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let mut engines = Vec::with_capacity(config.engines.len());
        let mut init_configs = HashMap::new();
        for engine_config in &config.engines {
            let client = EngineClient::connect_lazy(
                &engine_config.name,
                &engine_config.address,
                Duration::from_millis(engine_config.command_timeout_ms),
                codecs.clone(),
            )
            .map_err(|e| format!("cannot create engine \"{}\": {}", engine_config.name, e))?;
            engines.push(client);
            if !engine_config.init.is_null() {
                init_configs.insert(engine_config.name.clone(), engine_config.init.clone());
            }
        }

        let loop_config = FtiLoopConfig {
            timestep: SimulationTime::from_millis(config.simulation_timestep_ms as i64),
            wait_timeout: match config.wait_timeout_ms {
                None | Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
            },
        };
        Ok((
            FtiLoop::new(engines, FunctionManager::new(), loop_config),
            init_configs,
        ))
    }
}
