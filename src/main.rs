// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! HomeSim - Smart-Home Sensor Network Simulator
//!
//! Headless runner: loads a household, drives the simulation and logs every
//! event until interrupted.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use homesim::{project, Config, EventKind, HomeTemplate, SensorRegistry, SimulationEngine, VERSION};

/// HomeSim - Smart-Home Sensor Network Simulator
#[derive(Parser, Debug)]
#[command(name = "homesim")]
#[command(author = "HomeSim Project")]
#[command(version = VERSION)]
#[command(about = "Simulate a network of household sensors against a virtual clock")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Load the built-in demo household
    #[arg(long)]
    demo: bool,

    /// Home template (JSON) to load
    #[arg(long)]
    template: Option<PathBuf>,

    /// Project file (JSON) to load
    #[arg(long)]
    project: Option<PathBuf>,

    /// Speed multiplier (0.1 - 10)
    #[arg(long)]
    speed: Option<f64>,

    /// Tick interval in seconds (0.1 - 10)
    #[arg(long)]
    tick_interval: Option<f64>,

    /// Stop after this many real seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Save the project here on shutdown
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging: flags, then RUST_LOG, then the configured level
    let filter = if args.trace || args.debug {
        EnvFilter::try_new(config.log_filter(args.debug, args.trace))?
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(config.log_filter(false, false))?,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("HomeSim v{} - Smart-Home Sensor Network Simulator", VERSION);

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(speed) = args.speed {
        config.simulation.speed_multiplier = speed;
    }
    if let Some(tick) = args.tick_interval {
        config.simulation.tick_interval_secs = tick;
    }

    info!("Configuration loaded from {:?}", config_path);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config, args))
}

/// Run the simulation until Ctrl+C or the requested duration elapses
async fn run_headless(config: Config, args: Args) -> Result<()> {
    let registry = SensorRegistry::with_builtin_types();
    let engine = Arc::new(SimulationEngine::new(config.simulation.clone()));

    // Event logger
    let mut events = engine.event_channel();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.event_type() {
                    EventKind::SensorError | EventKind::BatteryDead | EventKind::LowBattery => {
                        warn!(sensor_id = %event.sensor_id(), "{} {:?}", event.event_type(), event.data())
                    }
                    EventKind::SensorData => {
                        debug!(sensor_id = %event.sensor_id(), "{:?}", event.data())
                    }
                    kind => info!(sensor_id = %event.sensor_id(), "{} {:?}", kind, event.data()),
                },
                Err(RecvError::Lagged(missed)) => warn!("Event logger lagged, {} events dropped", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Some(path) = &args.project {
        let report = project::load(&engine, &registry, path)?;
        info!("Restored {} sensors from {:?}", report.loaded, path);
    } else if let Some(path) = &args.template {
        let template = HomeTemplate::load(path)?;
        engine.load_template(&template, &registry);
    } else if config.demo_mode {
        engine.load_template(&HomeTemplate::demo(), &registry);
    }

    if engine.sensor_count() == 0 {
        warn!("No sensors loaded; use --demo, --template or --project");
    }

    engine.start();
    info!("Simulation running with {} sensors", engine.sensor_count());
    info!("   Press Ctrl+C to shutdown");

    let duration = args
        .duration
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|d| !d.is_zero());
    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("Run duration reached"),
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutdown signal received, cleaning up...");

    // Blocking join of the update loop
    let stopper = engine.clone();
    tokio::task::spawn_blocking(move || stopper.stop()).await?;

    let stats = engine.stats();
    info!(
        "Simulated {} in {} ticks, {} events",
        stats.elapsed, stats.ticks, stats.total_events
    );

    let save_path = args
        .save
        .clone()
        .or_else(|| config.project.autosave.then(|| config.default_project_path()));
    if let Some(path) = save_path {
        project::save(&engine, &path)?;
    }

    drop(engine);
    logger.abort();

    info!("HomeSim shutdown complete");
    Ok(())
}
