// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! HomeSim - Smart-Home Sensor Network Simulator
//!
//! Simulates a household of sensors against a scalable virtual clock:
//! - Eight sensor types with bounded, randomized reading models
//! - Change-gated readings published on a synchronous event bus
//! - Run/pause/stop state machine driven by a background update loop
//! - Project files and home templates as JSON
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Simulation Engine                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌────────────┐   ┌────────────────────┐  │
//! │  │ Registry │ → │  Sensors   │ → │  Update loop       │  │
//! │  │(factories│   │ (models +  │   │  (worker thread,   │  │
//! │  │ by type) │   │  records)  │   │   virtual clock)   │  │
//! │  └──────────┘   └────────────┘   └────────────────────┘  │
//! │                        ↓                   ↓             │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │                     Event Bus                      │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │        ↓                ↓                   ↓            │
//! │   observers      broadcast channel      rule hook        │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod core;
pub mod sensors;
pub mod config;
pub mod project;

// Re-exports for convenience
pub use config::Config;
pub use core::{EngineState, EventBus, EventKind, SensorEvent, SimulationEngine};
pub use project::HomeTemplate;
pub use sensors::{Sensor, SensorInfo, SensorModel, SensorRegistry};

/// HomeSim version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// HomeSim name
pub const NAME: &str = "HomeSim";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        sensor_types: SensorRegistry::with_builtin_types().available_types().into_iter().collect(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Version string
    pub version: String,
    /// Rust version
    pub rust_version: String,
    /// Target architecture
    pub target: String,
    /// Operating system
    pub os: String,
    /// Built-in sensor type tags
    pub sensor_types: Vec<String>,
}
