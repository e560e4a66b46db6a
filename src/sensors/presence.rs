// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Presence sensors - PIR motion and ultrasonic proximity

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::prelude::*;
use rand_distr::Normal;
use serde_json::json;

use super::traits::{payload, round1, Params};
use super::{Payload, SensorError, SensorModel};

/// PIR motion sensor. A trigger holds `motion_detected` until `timeout`
/// seconds pass without another trigger.
pub struct MotionSensor {
    detection_range: f64,
    sensitivity: f64,
    trigger_probability: f64,
    timeout: Duration,
    motion_detected: bool,
    last_motion: Option<Instant>,
    rng: StdRng,
}

impl MotionSensor {
    pub const TYPE_TAG: &'static str = "motion";

    pub fn defaults() -> Payload {
        payload(json!({
            "detection_range": 5.0,
            "detection_angle": 90,
            "sensitivity": 0.7,
            "trigger_probability": 0.1,
            "timeout": 30.0,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        Ok(Self {
            detection_range: p.non_negative("detection_range", 5.0)?,
            sensitivity: p.probability("sensitivity", 0.7)?,
            trigger_probability: p.probability("trigger_probability", 0.1)?,
            timeout: Duration::try_from_secs_f64(p.non_negative("timeout", 30.0)?)
                .map_err(|e| SensorError::invalid("timeout", e.to_string()))?,
            motion_detected: false,
            last_motion: None,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for MotionSensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        if self.rng.gen::<f64>() < self.trigger_probability {
            self.motion_detected = true;
            self.last_motion = Some(Instant::now());
        } else if let Some(at) = self.last_motion {
            if at.elapsed() > self.timeout {
                self.motion_detected = false;
                self.last_motion = None;
            }
        }

        Ok(payload(json!({
            "motion_detected": self.motion_detected,
            "detection_range": self.detection_range,
            "sensitivity": self.sensitivity,
        })))
    }
}

/// Ultrasonic distance sensor; 30% of the time nothing is in range
pub struct ProximitySensor {
    min_range: u64,
    max_range: u64,
    noise: Normal<f64>,
    rng: StdRng,
}

impl ProximitySensor {
    pub const TYPE_TAG: &'static str = "proximity";

    const MISS_PROBABILITY: f64 = 0.3;

    pub fn defaults() -> Payload {
        payload(json!({
            "max_range": 400,
            "min_range": 2,
            "accuracy": 1.0,
            "detection_angle": 30,
        }))
    }

    pub fn from_config(config: &Payload) -> Result<Self, SensorError> {
        let p = Params::new(config);
        let min_range = p.u64("min_range", 2)?;
        let max_range = p.u64("max_range", 400)?;
        if min_range > max_range {
            return Err(SensorError::invalid("min_range", format!("min_range ({}) exceeds max_range ({})", min_range, max_range)));
        }
        let accuracy = p.non_negative("accuracy", 1.0)?;

        Ok(Self {
            min_range,
            max_range,
            noise: Normal::new(0.0, accuracy).map_err(|e| SensorError::invalid("accuracy", e.to_string()))?,
            rng: p.rng()?,
        })
    }
}

impl SensorModel for ProximitySensor {
    fn type_tag(&self) -> &'static str {
        Self::TYPE_TAG
    }

    fn default_config(&self) -> Payload {
        Self::defaults()
    }

    fn reading(&mut self) -> Result<Payload> {
        let raw = if self.rng.gen::<f64>() < Self::MISS_PROBABILITY {
            (self.max_range + 1) as f64
        } else {
            self.rng.gen_range(self.min_range..=self.max_range) as f64
        };
        let distance = raw + self.noise.sample(&mut self.rng);

        Ok(payload(json!({
            "distance": round1(distance.max(0.0)),
            "object_detected": distance <= self.max_range as f64,
            "max_range": self.max_range,
            "units": "cm",
        })))
    }
}
