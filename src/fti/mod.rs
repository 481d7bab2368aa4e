// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fixed-Time-Interval loop: drives every registered engine through
//! synchronized steps of the same simulated time delta.
//!
//! One iteration refreshes each engine's datapack cache, runs the
//! preprocessing and transceiver functions, routes produced datapacks to
//! their target engines, then steps all engines concurrently and waits for
//! every one of them. Any failure aborts the iteration and propagates;
//! side effects already applied to other engines are left as they are.
//! There is no transactional rollback across engines and no retry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::datapack::{DataPack, SimulationTime};
use crate::engine::EngineClient;
use crate::errors::EngineError;
use crate::functions::{DataPackView, FunctionKind, FunctionManager};
use crate::observability::messages::sync_loop::{IterationCompleted, LoopAborted, LoopCompleted};
use crate::observability::messages::StructuredLog;


/// Errors that abort a loop iteration.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("function \"{name}\" failed: {message}")]
    Function { name: String, message: String },
}

/// Static parameters of one synchronized run.
#[derive(Debug, Clone)]
pub struct FtiLoopConfig {
    /// Simulated time advanced per iteration, identical for every engine.
    pub timestep: SimulationTime,
    /// Budget for waiting on each engine's step; `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
}

/// The orchestrator owning every engine client and the function registry
/// for the lifetime of one simulation run. Constructed explicitly and
/// passed by reference; there is no process-wide instance.
pub struct FtiLoop {
    engines: Vec<EngineClient>,
    functions: FunctionManager,
    config: FtiLoopConfig,
    iteration: u64,
}

impl FtiLoop {
    pub fn new(engines: Vec<EngineClient>, functions: FunctionManager, config: FtiLoopConfig) -> Self {
        Self {
            engines,
            functions,
            config,
            iteration: 0,
        }
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn config(&self) -> &FtiLoopConfig {
        &self.config
    }

    pub fn engines(&self) -> &[EngineClient] {
        &self.engines
    }

    pub fn engine(&self, name: &str) -> Option<&EngineClient> {
        self.engines.iter().find(|engine| engine.name() == name)
    }

    pub fn functions_mut(&mut self) -> &mut FunctionManager {
        &mut self.functions
    }

    /// Initialize every engine with its setup payload (missing entries get
    /// an empty object). Aborts on the first failure.
    pub async fn initialize(
        &mut self,
        init_configs: &HashMap<String, serde_json::Value>,
    ) -> Result<(), LoopError> {
        for engine in &mut self.engines {
            let config = init_configs
                .get(engine.name())
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            engine.initialize(config).await?;
        }
        Ok(())
    }

    /// Run one synchronized iteration across all engines.
    pub async fn run_iteration(&mut self) -> Result<(), LoopError> {
        let started = Instant::now();

        self.update_engine_caches().await?;
        self.run_preprocessing()?;
        let outbound = self.run_transceivers()?;
        self.send_outbound(outbound).await?;
        self.step_all_engines().await?;

        self.iteration += 1;
        IterationCompleted {
            iteration: self.iteration,
            engine_count: self.engines.len(),
            duration: started.elapsed(),
        }
        .log();
        Ok(())
    }

    /// Run exactly `count` iterations, aborting on the first failure.
    pub async fn run_iterations(&mut self, count: u64) -> Result<(), LoopError> {
        let started = Instant::now();
        for _ in 0..count {
            if let Err(error) = self.run_iteration().await {
                LoopAborted {
                    iteration: self.iteration + 1,
                    error: &error,
                }
                .log();
                return Err(error);
            }
        }
        LoopCompleted {
            iterations: count,
            duration: started.elapsed(),
        }
        .log();
        Ok(())
    }

    /// Run iterations until `wall_timeout` of wall-clock time has elapsed,
    /// returning the number of completed iterations. The deadline is
    /// checked between iterations; a running iteration always finishes.
    pub async fn run_until_timeout(&mut self, wall_timeout: Duration) -> Result<u64, LoopError> {
        let started = Instant::now();
        let deadline = started + wall_timeout;
        let mut completed = 0u64;
        while Instant::now() < deadline {
            if let Err(error) = self.run_iteration().await {
                LoopAborted {
                    iteration: self.iteration + 1,
                    error: &error,
                }
                .log();
                return Err(error);
            }
            completed += 1;
        }
        LoopCompleted {
            iterations: completed,
            duration: started.elapsed(),
        }
        .log();
        Ok(completed)
    }

    /// Best-effort shutdown of every engine. All engines are attempted;
    /// the first failure is reported afterwards.
    pub async fn shutdown(&mut self) -> Result<(), LoopError> {
        let mut first_failure = None;
        for engine in &mut self.engines {
            if let Err(error) = engine.shutdown(serde_json::json!({})).await {
                tracing::warn!(engine = %error.engine_name(), %error, "engine shutdown failed");
                first_failure.get_or_insert(error);
            }
        }
        match first_failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Phase 1: pull the union of requested datapacks from each engine.
    async fn update_engine_caches(&mut self) -> Result<(), LoopError> {
        for index in 0..self.engines.len() {
            let engine_name = self.engines[index].name().to_string();
            let wanted: Vec<_> = self
                .functions
                .requested_identifiers(&engine_name)
                .into_iter()
                .filter(|id| id.engine_name == engine_name)
                .collect();
            if !wanted.is_empty() {
                self.engines[index].update_data_packs(&wanted).await?;
            }
        }
        Ok(())
    }

    /// Phase 2: preprocessing functions, engine by engine. Outputs are
    /// merged into the owning engine's cache before the next engine's
    /// functions run, so later functions observe earlier merges.
    fn run_preprocessing(&mut self) -> Result<(), LoopError> {
        for index in 0..self.engines.len() {
            let engine_name = self.engines[index].name().to_string();
            let produced = {
                let view = build_view(&self.engines);
                self.functions
                    .execute_linked(FunctionKind::Preprocessing, &engine_name, &view)
                    .map_err(|(name, message)| LoopError::Function { name, message })?
            };
            // Function-local results become heap-owned cache entries here.
            self.engines[index].cache_mut().merge_all(produced);
        }
        Ok(())
    }

    /// Phase 3: transceiver functions, with outputs grouped by the engine
    /// their identifiers address.
    fn run_transceivers(&mut self) -> Result<HashMap<String, Vec<DataPack>>, LoopError> {
        let mut outbound: HashMap<String, Vec<DataPack>> = HashMap::new();
        for index in 0..self.engines.len() {
            let engine_name = self.engines[index].name().to_string();
            let produced = {
                let view = build_view(&self.engines);
                self.functions
                    .execute_linked(FunctionKind::Transceiver, &engine_name, &view)
                    .map_err(|(name, message)| LoopError::Function { name, message })?
            };
            for pack in produced {
                outbound
                    .entry(pack.id().engine_name.clone())
                    .or_default()
                    .push(pack);
            }
        }
        Ok(outbound)
    }

    /// Phase 4: send targeted batches, then always an empty batch so every
    /// engine interface observes "nothing (more) to send" each iteration.
    async fn send_outbound(
        &mut self,
        mut outbound: HashMap<String, Vec<DataPack>>,
    ) -> Result<(), LoopError> {
        for engine in &mut self.engines {
            if let Some(packs) = outbound.remove(engine.name()) {
                engine.send_data_packs(&packs).await?;
            }
            engine.send_data_packs(&[]).await?;
        }
        Ok(())
    }

    /// Phases 5 and 6: dispatch all steps, then wait on each in turn. The
    /// dispatches are fire-and-forget relative to each other, so engines
    /// step concurrently even though waits are collected sequentially.
    async fn step_all_engines(&mut self) -> Result<(), LoopError> {
        for engine in &mut self.engines {
            engine.run_loop_step(self.config.timestep)?;
        }
        let wait_timeout = self.config.wait_timeout;
        for engine in &mut self.engines {
            engine.wait_for_step_completion(wait_timeout).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FtiLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtiLoop")
            .field("engines", &self.engines.iter().map(|e| e.name()).collect::<Vec<_>>())
            .field("functions", &self.functions.len())
            .field("iteration", &self.iteration)
            .field("timestep", &self.config.timestep)
            .finish()
    }
}

fn build_view(engines: &[EngineClient]) -> DataPackView<'_> {
    let mut view = DataPackView::new();
    for engine in engines {
        view.insert(engine.name(), engine.cache());
    }
    view
}
