// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use lockstride::config::{load_and_validate_config, RunMode, RuntimeBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <config.yaml>", args[0]);
        eprintln!("Example: {} configs/two-engines.yaml", args[0]);
        std::process::exit(1);
    }
    let config_file = &args[1];

    let start_time = Instant::now();
    let config = load_and_validate_config(config_file)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("failed to load {}", config_file))?;

    println!("🔄 lockstride - engine synchronization");
    println!("═══════════════════════════════════════");
    println!("Configuration: {}", config_file);
    println!("Timestep: {}ms", config.simulation_timestep_ms);
    println!("Engines:");
    for engine in &config.engines {
        println!(
            "  • {} @ {} (timeout {}ms)",
            engine.name, engine.address, engine.command_timeout_ms
        );
    }

    let (mut fti, init_configs) =
        RuntimeBuilder::from_config(&config).map_err(anyhow::Error::msg)?;

    println!("\nInitializing engines...");
    fti.initialize(&init_configs)
        .await
        .context("engine initialization failed")?;

    let run_start = Instant::now();
    let iterations = match config.run {
        RunMode::Iterations { count } => {
            println!("Running {} iterations...", count);
            fti.run_iterations(count).await.context("run aborted")?;
            count
        }
        RunMode::UntilTimeout { timeout_s } => {
            println!("Running for up to {}s of wall-clock time...", timeout_s);
            fti.run_until_timeout(std::time::Duration::from_secs(timeout_s))
                .await
                .context("run aborted")?
        }
    };
    let run_time = run_start.elapsed();

    println!("\n📊 Run summary:");
    println!("Iterations: {}", iterations);
    println!("Wall-clock time: {:?}", run_time);
    println!("Engine times:");
    for engine in fti.engines() {
        println!(
            "  • {}: {}ms simulated",
            engine.name(),
            engine.engine_time().as_millis()
        );
    }

    println!("\nShutting down engines...");
    if let Err(error) = fti.shutdown().await {
        // Shutdown failures are reported but never block process cleanup.
        eprintln!("⚠️  {}", error);
    }

    println!("Total time (including config load): {:?}", start_time.elapsed());
    Ok(())
}
