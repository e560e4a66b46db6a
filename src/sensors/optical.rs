// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Optical sensors - ambient light

use anyhow::Result;
use chrono::{Local, Timelike};
use rand::prelude::*;
use rand_distr::Normal;
use serde_json::json;

use super::traits::{exceeds_threshold, payload, round1, Params};
use super::{Payload, SensorError, SensorModel};

/// Below this the room counts as dark (lux)
const DARK_LUX: f64 = 50.0;

/// Ambient light sensor following a day/night cycle on the local wall clock
pub struct LightSensor {
    max_lux: f64,
    calibration_offset: f64,
    day_night_simulation: bool,
    threshold_change: f64,
    rng: StdRng,
}

impl LightSensor {
    pub const TYPE_TAG: &'static str = "light";

    pub fn defaults() -> Payload {
        payload(json!({
            "max_lux": 10000.0,
            "calibration_offset": 0.0,
            "day_night_simulation": true,
            "threshold_change": 50.0,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        Ok(Self {
            max_lux: p.non_negative("max_lux", 10000.0)?,
            calibration_offset: p.f64("calibration_offset", 0.0)?,
            day_night_simulation: p.bool("day_night_simulation", true)?,
            threshold_change: p.non_negative("threshold_change", 50.0)?,
            rng: p.rng()?,
        })
    }

    fn base_lux(&mut self) -> f64 {
        if self.day_night_simulation {
            let hour = Local::now().hour();
            if (6..=18).contains(&hour) {
                self.rng.gen_range(500.0..=2000.0)
            } else {
                self.rng.gen_range(0.0..=DARK_LUX)
            }
        } else {
            self.rng.gen_range(0.0..=self.max_lux)
        }
    }
}

impl SensorModel for LightSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        let base = self.base_lux().round();
        let variation = Normal::new(0.0, base * 0.1)?.sample(&mut self.rng);
        let lux = round1((base + variation + self.calibration_offset).max(0.0));

        Ok(payload(json!({
            "lux": lux,
            "max_lux": self.max_lux,
            "is_dark": lux < DARK_LUX,
        })))
    }

    fn significant_change(&self, new: &Payload, last: &Payload) -> bool {
        exceeds_threshold(new, last, "lux", self.threshold_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lux_is_never_negative() {
        let config = payload(json!({"day_night_simulation": false, "max_lux": 100.0, "calibration_offset": -80.0, "seed": 9}));
        let mut sensor = LightSensor::from_config(&config).unwrap();
        for _ in 0..200 {
            let reading = sensor.reading().unwrap();
            let lux = reading["lux"].as_f64().unwrap();
            assert!(lux >= 0.0);
            assert_eq!(reading["is_dark"], json!(lux < DARK_LUX));
        }
    }

    #[test]
    fn test_lux_threshold() {
        let sensor = LightSensor::from_config(&Payload::new()).unwrap();
        let last = payload(json!({"lux": 800.0}));
        assert!(!sensor.significant_change(&payload(json!({"lux": 840.0})), &last));
        assert!(sensor.significant_change(&payload(json!({"lux": 700.0})), &last));
    }
}
