// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Sensor traits and common types

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// String-keyed map used for readings, event payloads and sensor configuration
pub type Payload = serde_json::Map<String, Value>;

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Active,
    Inactive,
    Error,
    Maintenance,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Active => "active",
            SensorStatus::Inactive => "inactive",
            SensorStatus::Error => "error",
            SensorStatus::Maintenance => "maintenance",
        }
    }
}

/// Position of a sensor on the floor plan
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Location {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Location> for [f64; 2] {
    fn from(location: Location) -> Self {
        [location.x, location.y]
    }
}

/// Errors raised while resolving a sensor type or its configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// No factory registered under this type tag
    #[error("unknown sensor type: {0}")]
    UnknownType(String),

    /// A configuration key has the wrong type or an out-of-range value
    #[error("invalid config at '{field}': {message}")]
    InvalidConfig { field: String, message: String },
}

impl SensorError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        SensorError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Behaviour every simulated sensor variant provides.
///
/// A model owns the variant's private memory (random source, latches,
/// toggles). The shared sensor record (status, battery, last reading) lives
/// in [`super::Sensor`], which drives the model once per tick.
pub trait SensorModel: Send {
    /// Constant type tag of the variant
    fn type_tag(&self) -> &'static str;

    /// Baseline parameters merged under caller-supplied overrides
    fn default_config(&self) -> Payload;

    /// Produce a new reading. May advance the model's private state.
    fn reading(&mut self) -> Result<Payload>;

    /// Whether `new` differs enough from the last accepted reading to be published
    fn significant_change(&self, new: &Payload, last: &Payload) -> bool {
        new != last
    }

    /// Trust check run before every activation
    fn authenticate(&mut self) -> bool {
        true
    }
}

/// Typed view over an untyped configuration map.
///
/// Missing keys (or explicit nulls) fall back to the given default; present
/// keys of the wrong type are rejected.
pub(crate) struct Params<'a> {
    config: &'a Payload,
}

impl<'a> Params<'a> {
    pub fn new(config: &'a Payload) -> Self {
        Self { config }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.config.get(key).filter(|v| !v.is_null())
    }

    pub fn f64(&self, key: &str, default: f64) -> Result<f64, SensorError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| SensorError::invalid(key, format!("expected a number, got {}", v))),
        }
    }

    pub fn non_negative(&self, key: &str, default: f64) -> Result<f64, SensorError> {
        let value = self.f64(key, default)?;
        if value < 0.0 {
            return Err(SensorError::invalid(key, format!("must not be negative, got {}", value)));
        }
        Ok(value)
    }

    pub fn probability(&self, key: &str, default: f64) -> Result<f64, SensorError> {
        let value = self.f64(key, default)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(SensorError::invalid(key, format!("must be within [0, 1], got {}", value)));
        }
        Ok(value)
    }

    pub fn u64(&self, key: &str, default: u64) -> Result<u64, SensorError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .or_else(|| v.as_f64().filter(|x| *x >= 0.0 && x.fract() == 0.0).map(|x| x as u64))
                .ok_or_else(|| SensorError::invalid(key, format!("expected a non-negative integer, got {}", v))),
        }
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool, SensorError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| SensorError::invalid(key, format!("expected a boolean, got {}", v))),
        }
    }

    pub fn string(&self, key: &str, default: &str) -> Result<String, SensorError> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(v) => v
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| SensorError::invalid(key, format!("expected a string, got {}", v))),
        }
    }

    /// `(min, max)` pair that must be ordered
    pub fn range(&self, min_key: &str, min: f64, max_key: &str, max: f64) -> Result<(f64, f64), SensorError> {
        let lo = self.f64(min_key, min)?;
        let hi = self.f64(max_key, max)?;
        if lo > hi {
            return Err(SensorError::invalid(min_key, format!("{} ({}) exceeds {} ({})", min_key, lo, max_key, hi)));
        }
        Ok((lo, hi))
    }

    /// Random source for the model, reproducible when `seed` is configured
    pub fn rng(&self) -> Result<StdRng, SensorError> {
        Ok(match self.get("seed") {
            None => StdRng::from_entropy(),
            Some(_) => StdRng::seed_from_u64(self.u64("seed", 0)?),
        })
    }
}

/// Turn a `json!` object literal into a payload map
pub(crate) fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// Threshold policy shared by the numeric sensors: publish once `key` moved by
/// at least `threshold`. Readings without a numeric `key` fall back to inequality.
pub(crate) fn exceeds_threshold(new: &Payload, last: &Payload, key: &str, threshold: f64) -> bool {
    match (new.get(key).and_then(Value::as_f64), last.get(key).and_then(Value::as_f64)) {
        (Some(a), Some(b)) => (a - b).abs() >= threshold,
        _ => new != last,
    }
}

/// Round to one decimal place, the resolution every simulated sensor reports at
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_fallback_and_rejection() {
        let config = payload(json!({"accuracy": 0.3, "units": 7, "enabled": null}));
        let params = Params::new(&config);

        assert_eq!(params.f64("accuracy", 1.0).unwrap(), 0.3);
        assert_eq!(params.f64("missing", 1.5).unwrap(), 1.5);
        assert!(params.bool("enabled", true).unwrap());
        assert!(matches!(
            params.string("units", "celsius"),
            Err(SensorError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_range_must_be_ordered() {
        let config = payload(json!({"min_temp": 30.0, "max_temp": 10.0}));
        let params = Params::new(&config);
        assert!(params.range("min_temp", -40.0, "max_temp", 85.0).is_err());
    }

    #[test]
    fn test_threshold_policy() {
        let last = payload(json!({"temperature": 22.0}));
        assert!(!exceeds_threshold(&payload(json!({"temperature": 22.3})), &last, "temperature", 0.5));
        assert!(exceeds_threshold(&payload(json!({"temperature": 22.5})), &last, "temperature", 0.5));
        assert!(exceeds_threshold(&payload(json!({"other": 1})), &last, "temperature", 0.5));
    }

    #[test]
    fn test_location_serializes_as_pair() {
        let location = Location::new(120.0, 45.5);
        let text = serde_json::to_string(&location).unwrap();
        assert_eq!(text, "[120.0,45.5]");
        let back: Location = serde_json::from_str(&text).unwrap();
        assert_eq!(back, location);
    }
}
