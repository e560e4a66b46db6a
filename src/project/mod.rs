// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Project persistence - sensor layout and engine settings as a JSON document

mod template;

pub use template::HomeTemplate;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::SimulationEngine;
use crate::sensors::{Location, Payload, Sensor, SensorError, SensorInfo, SensorRegistry};

/// Format version written by [`save`]
pub const PROJECT_VERSION: &str = "1.0";

/// Engine settings stored with a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    #[serde(alias = "simulation_speed")]
    pub speed: f64,
    #[serde(alias = "update_interval")]
    pub tick_interval: f64,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            tick_interval: 1.0,
        }
    }
}

/// On-disk project document, as written by [`save`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectFile {
    pub version: String,
    pub created: DateTime<Utc>,
    pub sensors: Vec<SensorInfo>,
    pub settings: ProjectSettings,
}

impl ProjectFile {
    /// Snapshot the engine's sensors and settings
    pub fn capture(engine: &SimulationEngine) -> Self {
        Self {
            version: PROJECT_VERSION.to_string(),
            created: Utc::now(),
            sensors: engine.sensors(),
            settings: ProjectSettings {
                speed: engine.speed_multiplier(),
                tick_interval: engine.tick_interval(),
            },
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing project {:?}", path))
    }
}

/// Sensor entry as read back by [`load`]. Only `type` is required and
/// runtime fields (status, readings, timestamps) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorRecord {
    #[serde(default)]
    pub sensor_id: Option<String>,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub config: Payload,
    #[serde(default)]
    pub battery_level: Option<f64>,
}

impl SensorRecord {
    fn label(&self) -> &str {
        self.sensor_id.as_deref().unwrap_or(&self.sensor_type)
    }
}

/// Project document as read back by [`load`].
///
/// Missing sections fall back to defaults and unknown keys (`created`,
/// `rules`, ...) are ignored, so files written by other tools load as long
/// as their sensor records do.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectDocument {
    pub version: Option<String>,
    pub sensors: Vec<SensorRecord>,
    pub settings: ProjectSettings,
}

impl ProjectDocument {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading project {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("parsing project {:?}", path))
    }
}

/// Outcome of [`load`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Ids of records that were not restored
    pub skipped: Vec<String>,
}

/// Write the engine's current layout and settings to `path`
pub fn save(engine: &SimulationEngine, path: &Path) -> Result<()> {
    let project = ProjectFile::capture(engine);
    project.write(path)?;
    engine.set_modified(false);
    info!("Project saved to: {:?} ({} sensors)", path, project.sensors.len());
    Ok(())
}

fn rebuild(registry: &SensorRegistry, record: &SensorRecord) -> Result<Sensor, SensorError> {
    let sensor = match &record.sensor_id {
        Some(id) => registry.create_with_id(id, &record.sensor_type, &record.name, record.location, &record.config)?,
        None => registry.try_create(&record.sensor_type, &record.name, record.location, &record.config)?,
    };
    Ok(match record.battery_level {
        Some(level) => sensor.with_battery_level(level),
        None => sensor,
    })
}

/// Replace the engine's sensors and settings with the project at `path`.
///
/// The engine is stopped first. Every record is rebuilt before the engine is
/// touched, so a file with invalid configuration leaves it unchanged.
/// Records of unknown type are skipped. Registry instances of sensors that
/// are no longer loaded are released.
pub fn load(engine: &SimulationEngine, registry: &SensorRegistry, path: &Path) -> Result<LoadReport> {
    let project = ProjectDocument::read(path)?;
    match project.version.as_deref() {
        Some(PROJECT_VERSION) => {}
        Some(version) => warn!("Project {:?} has version {}, expected {}", path, version, PROJECT_VERSION),
        None => warn!("Project {:?} has no version", path),
    }

    let current: HashSet<String> = engine.sensor_ids().into_iter().collect();
    let mut report = LoadReport::default();
    let mut sensors: Vec<Sensor> = Vec::with_capacity(project.sensors.len());
    for record in &project.sensors {
        match rebuild(registry, record) {
            Ok(sensor) => sensors.push(sensor),
            Err(SensorError::UnknownType(sensor_type)) => {
                warn!("Skipping sensor {} of unknown type {}", record.label(), sensor_type);
                report.skipped.push(record.label().to_string());
            }
            Err(e) => {
                for sensor in sensors.iter().filter(|s| !current.contains(s.id())) {
                    registry.forget(sensor.id());
                }
                return Err(e).with_context(|| format!("sensor {} in {:?}", record.label(), path));
            }
        }
    }

    let incoming: HashSet<String> = sensors.iter().map(|s| s.id().to_string()).collect();
    engine.stop();
    engine.clear_sensors();
    for sensor_id in current.difference(&incoming) {
        registry.forget(sensor_id);
    }
    for sensor in sensors {
        let id = sensor.id().to_string();
        if engine.add(sensor) {
            report.loaded += 1;
        } else {
            report.skipped.push(id);
        }
    }

    engine.set_speed_multiplier(project.settings.speed);
    engine.set_tick_interval(project.settings.tick_interval);
    engine.set_modified(false);

    info!("Project loaded from: {:?} ({} sensors, {} skipped)", path, report.loaded, report.skipped.len());
    Ok(report)
}
