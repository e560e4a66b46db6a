// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Thermal sensors - room temperature

use anyhow::Result;
use rand::prelude::*;
use rand_distr::Normal;
use serde_json::json;

use super::traits::{exceeds_threshold, payload, round1, Params};
use super::{Payload, SensorError, SensorModel};

/// Room thermometer with Gaussian jitter around a configured baseline
pub struct TemperatureSensor {
    base_temp: f64,
    accuracy: f64,
    min_temp: f64,
    max_temp: f64,
    units: String,
    threshold_change: f64,
    noise: Normal<f64>,
    rng: StdRng,
}

impl TemperatureSensor {
    pub const TYPE_TAG: &'static str = "temperature";

    pub fn defaults() -> Payload {
        payload(json!({
            "base_temp": 22.0,
            "min_temp": -40.0,
            "max_temp": 85.0,
            "accuracy": 0.5,
            "units": "celsius",
            "sample_rate": 1.0,
            "threshold_change": 0.5,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let accuracy = p.non_negative("accuracy", 0.5)?;
        let (min_temp, max_temp) = p.range("min_temp", -40.0, "max_temp", 85.0)?;

        Ok(Self {
            base_temp: p.f64("base_temp", 22.0)?,
            accuracy,
            min_temp,
            max_temp,
            units: p.string("units", "celsius")?,
            threshold_change: p.non_negative("threshold_change", 0.5)?,
            noise: Normal::new(0.0, accuracy).map_err(|e| SensorError::invalid("accuracy", e.to_string()))?,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for TemperatureSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        let raw = self.base_temp + self.noise.sample(&mut self.rng);
        let temperature = round1(raw.clamp(self.min_temp, self.max_temp)).clamp(self.min_temp, self.max_temp);

        Ok(payload(json!({
            "temperature": temperature,
            "units": self.units,
            "accuracy": self.accuracy,
        })))
    }

    fn significant_change(&self, new: &Payload, last: &Payload) -> bool {
        exceeds_threshold(new, last, "temperature", self.threshold_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_within_declared_bounds() {
        let config = payload(json!({"base_temp": 22.0, "accuracy": 0.3, "min_temp": 21.0, "max_temp": 23.0, "seed": 7}));
        let mut sensor = TemperatureSensor::from_config(&config).unwrap();

        for _ in 0..500 {
            let reading = sensor.reading().unwrap();
            let t = reading["temperature"].as_f64().unwrap();
            assert!((21.0..=23.0).contains(&t), "temperature {} out of bounds", t);
        }
    }

    #[test]
    fn test_clamps_to_domain() {
        let config = payload(json!({"base_temp": 120.0, "accuracy": 0.0}));
        let mut sensor = TemperatureSensor::from_config(&config).unwrap();
        assert_eq!(sensor.reading().unwrap()["temperature"], json!(85.0));
    }

    #[test]
    fn test_threshold_gating() {
        let sensor = TemperatureSensor::from_config(&payload(json!({"threshold_change": 0.5}))).unwrap();
        let last = payload(json!({"temperature": 22.0}));
        assert!(!sensor.significant_change(&payload(json!({"temperature": 22.4})), &last));
        assert!(sensor.significant_change(&payload(json!({"temperature": 21.5})), &last));
    }

    #[test]
    fn test_seeded_readings_repeat() {
        let config = payload(json!({"seed": 42}));
        let mut a = TemperatureSensor::from_config(&config).unwrap();
        let mut b = TemperatureSensor::from_config(&config).unwrap();
        assert_eq!(a.reading().unwrap(), b.reading().unwrap());
    }

    #[test]
    fn test_rejects_negative_accuracy() {
        assert!(TemperatureSensor::from_config(&payload(json!({"accuracy": -1.0}))).is_err());
    }
}
