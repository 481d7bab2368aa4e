// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Complete configuration of one synchronized simulation run.
///
/// Typically loaded from a YAML file:
///
/// ```yaml
/// simulation_timestep_ms: 10
/// wait_timeout_ms: 5000
/// run:
///   iterations:
///     count: 100
/// engines:
///   - name: physics
///     address: http://127.0.0.1:9002
///     command_timeout_ms: 0
///   - name: brain
///     address: http://127.0.0.1:9003
///     command_timeout_ms: 1000
///     init:
///       network: ./brain.json
/// ```
#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    /// Simulated time advanced per iteration, in milliseconds.
    pub simulation_timestep_ms: u64,
    /// Budget for waiting on each engine's step completion; omitted or
    /// zero waits indefinitely.
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,
    #[serde(default)]
    pub run: RunMode,
    pub engines: Vec<EngineConfig>,
}

/// Which limit ends the run: a fixed iteration count or a wall-clock
/// timeout.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Iterations { count: u64 },
    UntilTimeout { timeout_s: u64 },
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Iterations { count: 1 }
    }
}

/// One engine registration: the process is already running and reachable;
/// this core never launches or supervises it.
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    /// Endpoint of the engine's RPC server, e.g. `http://127.0.0.1:9002`.
    pub address: String,
    /// Per-command RPC timeout in milliseconds; zero blocks indefinitely.
    /// Positive values below one millisecond cannot be expressed here, but
    /// the client rounds any sub-millisecond timeout up anyway.
    #[serde(default)]
    pub command_timeout_ms: u64,
    /// Engine-specific setup payload passed verbatim to `Init`.
    #[serde(default)]
    pub init: serde_json::Value,
}

/// Load a configuration file without validating it.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SimulationConfig, String> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config file {}: {}", path.display(), e))?;
    serde_yaml::from_str(&contents)
        .map_err(|e| format!("cannot parse config file {}: {}", path.display(), e))
}

/// Load a configuration file and run the full validation pipeline.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<SimulationConfig, String> {
    let config = load_config(path)?;
    if let Err(errors) = super::validation::validate_config(&config) {
        let summary = errors
            .iter()
            .map(|error| error.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(format!("invalid configuration: {}", summary));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn full_config_round_trips_from_yaml() {
        let file = write_config(
            r#"
simulation_timestep_ms: 10
wait_timeout_ms: 5000
run:
  until_timeout:
    timeout_s: 30
engines:
  - name: physics
    address: http://127.0.0.1:9002
  - name: brain
    address: http://127.0.0.1:9003
    command_timeout_ms: 1000
    init:
      network: ./brain.json
"#,
        );
        let config = load_and_validate_config(file.path()).unwrap();
        assert_eq!(config.simulation_timestep_ms, 10);
        assert_eq!(config.wait_timeout_ms, Some(5000));
        assert_eq!(config.run, RunMode::UntilTimeout { timeout_s: 30 });
        assert_eq!(config.engines.len(), 2);
        assert_eq!(config.engines[0].command_timeout_ms, 0);
        assert_eq!(config.engines[1].init["network"], "./brain.json");
    }

    #[test]
    fn run_mode_defaults_to_a_single_iteration() {
        let file = write_config(
            r#"
simulation_timestep_ms: 20
engines:
  - name: physics
    address: http://127.0.0.1:9002
"#,
        );
        let config = load_and_validate_config(file.path()).unwrap();
        assert_eq!(config.run, RunMode::Iterations { count: 1 });
        assert_eq!(config.wait_timeout_ms, None);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(err.contains("cannot read config file"));
    }

    #[test]
    fn invalid_config_is_rejected_with_all_errors() {
        let file = write_config(
            r#"
simulation_timestep_ms: 0
engines:
  - name: physics
    address: http://127.0.0.1:9002
  - name: physics
    address: http://127.0.0.1:9003
"#,
        );
        let err = load_and_validate_config(file.path()).unwrap_err();
        assert!(err.contains("timestep"));
        assert!(err.contains("physics"));
    }
}
