// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Environmental sensors - humidity, pressure, smoke

use anyhow::Result;
use rand::prelude::*;
use rand_distr::Normal;
use serde_json::json;

use super::traits::{exceeds_threshold, payload, round1, Params};
use super::{Payload, SensorError, SensorModel};

/// Standard atmosphere at sea level (hPa)
const STANDARD_PRESSURE: f64 = 1013.25;

fn gaussian(field: &str, std_dev: f64) -> Result<Normal<f64>, SensorError> {
    Normal::new(0.0, std_dev).map_err(|e| SensorError::invalid(field, e.to_string()))
}

/// Relative humidity sensor
pub struct HumiditySensor {
    base_humidity: f64,
    accuracy: f64,
    min_humidity: f64,
    max_humidity: f64,
    threshold_change: f64,
    noise: Normal<f64>,
    rng: StdRng,
}

impl HumiditySensor {
    pub const TYPE_TAG: &'static str = "humidity";

    pub fn defaults() -> Payload {
        payload(json!({
            "base_humidity": 45.0,
            "min_humidity": 0.0,
            "max_humidity": 100.0,
            "accuracy": 2.0,
            "threshold_change": 2.0,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let accuracy = p.non_negative("accuracy", 2.0)?;
        let (min_humidity, max_humidity) = p.range("min_humidity", 0.0, "max_humidity", 100.0)?;
        if min_humidity < 0.0 || max_humidity > 100.0 {
            return Err(SensorError::invalid("max_humidity", "humidity range must lie within [0, 100]"));
        }

        Ok(Self {
            base_humidity: p.f64("base_humidity", 45.0)?,
            accuracy,
            min_humidity,
            max_humidity,
            threshold_change: p.non_negative("threshold_change", 2.0)?,
            noise: gaussian("accuracy", accuracy)?,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for HumiditySensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        let raw = self.base_humidity + self.noise.sample(&mut self.rng);
        let humidity = round1(raw.clamp(self.min_humidity, self.max_humidity)).clamp(self.min_humidity, self.max_humidity);

        Ok(payload(json!({
            "humidity": humidity,
            "units": "percent",
            "accuracy": self.accuracy,
        })))
    }

    fn significant_change(&self, new: &Payload, last: &Payload) -> bool {
        exceeds_threshold(new, last, "humidity", self.threshold_change)
    }
}

/// Barometric pressure sensor drifting around the standard atmosphere
pub struct PressureSensor {
    min_pressure: f64,
    max_pressure: f64,
    units: String,
    sea_level_correction: bool,
    noise: Normal<f64>,
    rng: StdRng,
}

impl PressureSensor {
    pub const TYPE_TAG: &'static str = "pressure";

    pub fn defaults() -> Payload {
        payload(json!({
            "min_pressure": 300.0,
            "max_pressure": 1100.0,
            "accuracy": 1.0,
            "units": "hPa",
            "sea_level_correction": true,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let (min_pressure, max_pressure) = p.range("min_pressure", 300.0, "max_pressure", 1100.0)?;

        Ok(Self {
            min_pressure,
            max_pressure,
            units: p.string("units", "hPa")?,
            sea_level_correction: p.bool("sea_level_correction", true)?,
            noise: gaussian("accuracy", p.non_negative("accuracy", 1.0)?)?,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for PressureSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        let weather = self.rng.gen_range(-50..=50) as f64;
        let raw = STANDARD_PRESSURE + weather + self.noise.sample(&mut self.rng);
        let pressure = round1(raw.clamp(self.min_pressure, self.max_pressure)).clamp(self.min_pressure, self.max_pressure);

        Ok(payload(json!({
            "pressure": pressure,
            "units": self.units,
            "sea_level_corrected": self.sea_level_correction,
        })))
    }
}

/// Smoke detector with a latched alarm that clears as the smoke dissipates
pub struct SmokeSensor {
    smoke_threshold: u64,
    sensitivity: String,
    test_mode: bool,
    alarm_probability: f64,
    smoke_level: u64,
    alarm_active: bool,
    rng: StdRng,
}

impl SmokeSensor {
    pub const TYPE_TAG: &'static str = "smoke";

    pub fn defaults() -> Payload {
        payload(json!({
            "smoke_threshold": 50,
            "sensitivity": "medium",
            "test_mode": false,
            "alarm_probability": 0.001,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let sensitivity = p.string("sensitivity", "medium")?;
        if !matches!(sensitivity.as_str(), "low" | "medium" | "high") {
            return Err(SensorError::invalid("sensitivity", format!("expected low, medium or high, got {}", sensitivity)));
        }

        Ok(Self {
            smoke_threshold: p.u64("smoke_threshold", 50)?,
            sensitivity,
            test_mode: p.bool("test_mode", false)?,
            alarm_probability: p.probability("alarm_probability", 0.001)?,
            smoke_level: 0,
            alarm_active: false,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for SmokeSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        if !self.test_mode {
            if self.rng.gen::<f64>() < self.alarm_probability {
                self.smoke_level = self.rng.gen_range(60..=100);
                self.alarm_active = true;
            } else {
                self.smoke_level = self.smoke_level.saturating_sub(self.rng.gen_range(1..=5));
                if self.smoke_level < self.smoke_threshold {
                    self.alarm_active = false;
                }
            }
        }

        Ok(payload(json!({
            "smoke_level": self.smoke_level,
            "alarm_active": self.alarm_active,
            "threshold": self.smoke_threshold,
            "sensitivity": self.sensitivity,
        })))
    }
}
