// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Home templates - predefined sensor layouts

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::sensors::{payload, Location, Payload, SensorSpec};

/// Named household layout consumed by `SimulationEngine::load_template`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeTemplate {
    #[serde(default = "unnamed")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

fn unnamed() -> String {
    "Unknown".to_string()
}

fn spec(sensor_type: &str, name: &str, x: f64, y: f64, config: Payload) -> SensorSpec {
    SensorSpec {
        sensor_id: None,
        sensor_type: sensor_type.to_string(),
        name: name.to_string(),
        location: Location::new(x, y),
        config,
    }
}

impl HomeTemplate {
    /// Read a template from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading template {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("parsing template {:?}", path))
    }

    /// Small apartment with one of every built-in sensor type
    pub fn demo() -> Self {
        Self {
            name: "Demo Apartment".to_string(),
            description: "Living room, kitchen, bedroom and hallway".to_string(),
            sensors: vec![
                spec("temperature", "Living room thermostat", 200.0, 150.0, payload(json!({ "base_temp": 21.5 }))),
                spec("humidity", "Bathroom humidity", 420.0, 90.0, payload(json!({ "base_humidity": 60.0 }))),
                spec("pressure", "Hallway barometer", 320.0, 260.0, Payload::new()),
                spec("smoke", "Kitchen smoke alarm", 520.0, 160.0, payload(json!({ "sensitivity": "high" }))),
                spec("light", "Bedroom light level", 120.0, 320.0, Payload::new()),
                spec("motion", "Hallway motion", 300.0, 220.0, payload(json!({ "trigger_probability": 0.2 }))),
                spec("proximity", "Garage parking", 600.0, 380.0, Payload::new()),
                spec("door_window", "Front door", 340.0, 400.0, payload(json!({ "sensor_type": "door" }))),
            ],
        }
    }
}
