// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Contact sensors - magnetic door/window switches

use anyhow::Result;
use rand::prelude::*;
use serde_json::json;

use super::traits::{payload, Params};
use super::{Payload, SensorError, SensorModel};

/// Chance per reading that a tamper-enabled switch reports tampering
const TAMPER_PROBABILITY: f64 = 0.001;

/// Open/closed switch that toggles at random
pub struct DoorWindowSensor {
    mount: String,
    magnetic_strength: f64,
    tamper_detection: bool,
    state_change_probability: f64,
    is_open: bool,
    tampered: bool,
    rng: StdRng,
}

impl DoorWindowSensor {
    pub const TYPE_TAG: &'static str = "door_window";

    pub fn defaults() -> Payload {
        payload(json!({
            "sensor_type": "door",
            "magnetic_strength": 0.8,
            "tamper_detection": true,
            "state_change_probability": 0.05,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let mount = p.string("sensor_type", "door")?;
        if mount != "door" && mount != "window" {
            return Err(SensorError::invalid("sensor_type", format!("expected door or window, got {}", mount)));
        }

        Ok(Self {
            mount,
            magnetic_strength: p.non_negative("magnetic_strength", 0.8)?,
            tamper_detection: p.bool("tamper_detection", true)?,
            state_change_probability: p.probability("state_change_probability", 0.05)?,
            is_open: false,
            tampered: false,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for DoorWindowSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        if self.rng.gen::<f64>() < self.state_change_probability {
            self.is_open = !self.is_open;
        }
        if self.tamper_detection {
            self.tampered = self.rng.gen::<f64>() < TAMPER_PROBABILITY;
        }

        Ok(payload(json!({
            "is_open": self.is_open,
            "sensor_type": self.mount,
            "tampered": self.tampered,
            "magnetic_strength": self.magnetic_strength,
        })))
    }
}
