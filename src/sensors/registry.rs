// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Sensor registry - type tags to factories, plus instance bookkeeping

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{
    DoorWindowSensor, HumiditySensor, LightSensor, Location, MotionSensor, Payload, PressureSensor,
    ProximitySensor, Sensor, SensorError, SensorModel, SmokeSensor, TemperatureSensor,
};

/// Builds a variant model from a configuration map, validating it
pub type SensorFactory = Arc<dyn Fn(&Payload) -> Result<Box<dyn SensorModel>, SensorError> + Send + Sync>;

/// Declarative description of a sensor, as found in templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_location")]
    pub location: Location,
    #[serde(default)]
    pub config: Payload,
}

fn default_location() -> Location {
    Location::new(100.0, 100.0)
}

/// Registry-side record of a sensor it created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub sensor_type: String,
    pub name: String,
    pub created: DateTime<Utc>,
}

/// Maps type tags to factories and remembers which sensors it created
pub struct SensorRegistry {
    factories: RwLock<HashMap<String, SensorFactory>>,
    instances: RwLock<HashMap<String, InstanceRecord>>,
}

impl SensorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with every household sensor variant registered
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        registry.register_type(TemperatureSensor::TYPE_TAG, |c| boxed(TemperatureSensor::from_config(c)));
        registry.register_type(MotionSensor::TYPE_TAG, |c| boxed(MotionSensor::from_config(c)));
        registry.register_type(DoorWindowSensor::TYPE_TAG, |c| boxed(DoorWindowSensor::from_config(c)));
        registry.register_type(SmokeSensor::TYPE_TAG, |c| boxed(SmokeSensor::from_config(c)));
        registry.register_type(LightSensor::TYPE_TAG, |c| boxed(LightSensor::from_config(c)));
        registry.register_type(HumiditySensor::TYPE_TAG, |c| boxed(HumiditySensor::from_config(c)));
        registry.register_type(PressureSensor::TYPE_TAG, |c| boxed(PressureSensor::from_config(c)));
        registry.register_type(ProximitySensor::TYPE_TAG, |c| boxed(ProximitySensor::from_config(c)));
        registry
    }

    /// Associate `type_tag` with `factory`, replacing any previous factory
    pub fn register_type<F>(&self, type_tag: &str, factory: F)
    where
        F: Fn(&Payload) -> Result<Box<dyn SensorModel>, SensorError> + Send + Sync + 'static,
    {
        let replaced = self
            .factories
            .write()
            .insert(type_tag.to_string(), Arc::new(factory))
            .is_some();
        debug!(type_tag, replaced, "Registered sensor type");
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.factories.read().contains_key(type_tag)
    }

    pub fn available_types(&self) -> BTreeSet<String> {
        self.factories.read().keys().cloned().collect()
    }

    /// Create an inactive sensor. Unknown types (and rejected configuration)
    /// yield `None`; use [`Self::try_create`] to see why.
    pub fn create(&self, type_tag: &str, name: &str, location: Location, config: &Payload) -> Option<Sensor> {
        match self.build(None, type_tag, name, location, config) {
            Ok(sensor) => Some(sensor),
            Err(SensorError::UnknownType(t)) => {
                warn!("Unknown sensor type: {}", t);
                None
            }
            Err(e) => {
                error!(type_tag, "Failed to create sensor: {}", e);
                None
            }
        }
    }

    pub fn try_create(
        &self,
        type_tag: &str,
        name: &str,
        location: Location,
        config: &Payload,
    ) -> Result<Sensor, SensorError> {
        self.build(None, type_tag, name, location, config)
    }

    /// Like [`Self::try_create`], keeping a known id (persisted sensors)
    pub fn create_with_id(
        &self,
        sensor_id: &str,
        type_tag: &str,
        name: &str,
        location: Location,
        config: &Payload,
    ) -> Result<Sensor, SensorError> {
        self.build(Some(sensor_id), type_tag, name, location, config)
    }

    /// Create from a template entry, honouring an explicit id
    pub fn create_from_spec(&self, spec: &SensorSpec) -> Result<Sensor, SensorError> {
        self.build(spec.sensor_id.as_deref(), &spec.sensor_type, &spec.name, spec.location, &spec.config)
    }

    fn build(
        &self,
        id: Option<&str>,
        type_tag: &str,
        name: &str,
        location: Location,
        overrides: &Payload,
    ) -> Result<Sensor, SensorError> {
        let factory = self
            .factories
            .read()
            .get(type_tag)
            .cloned()
            .ok_or_else(|| SensorError::UnknownType(type_tag.to_string()))?;

        // Variants fall back to their defaults for missing keys, so building
        // from the overrides alone validates exactly what the caller supplied.
        let model = factory(overrides)?;
        let mut config = model.default_config();
        config.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut sensor = Sensor::new(model)
            .with_config(config)
            .with_factory(factory)
            .with_location(location);
        if let Some(id) = id {
            sensor = sensor.with_id(id);
        }
        let sensor = sensor.with_name(name);

        self.instances.write().insert(
            sensor.id().to_string(),
            InstanceRecord {
                sensor_type: type_tag.to_string(),
                name: sensor.name().to_string(),
                created: Utc::now(),
            },
        );
        debug!(sensor_id = %sensor.id(), type_tag, "Created sensor");
        Ok(sensor)
    }

    pub fn instance(&self, sensor_id: &str) -> Option<InstanceRecord> {
        self.instances.read().get(sensor_id).cloned()
    }

    pub fn forget(&self, sensor_id: &str) -> bool {
        self.instances.write().remove(sensor_id).is_some()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

fn boxed<M: SensorModel + 'static>(model: Result<M, SensorError>) -> Result<Box<dyn SensorModel>, SensorError> {
    model.map(|m| Box::new(m) as Box<dyn SensorModel>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::traits::payload;
    use crate::sensors::SensorStatus;
    use serde_json::json;

    #[test]
    fn test_builtin_types() {
        let registry = SensorRegistry::with_builtin_types();
        let types: Vec<String> = registry.available_types().into_iter().collect();
        assert_eq!(
            types,
            vec!["door_window", "humidity", "light", "motion", "pressure", "proximity", "smoke", "temperature"]
        );
    }

    #[test]
    fn test_create_merges_defaults() {
        let registry = SensorRegistry::with_builtin_types();
        let overrides = payload(json!({"base_temp": 19.0, "threshold_change": 1.0}));
        let sensor = registry
            .create("temperature", "Hallway", Location::new(5.0, 6.0), &overrides)
            .unwrap();

        assert_eq!(sensor.status(), SensorStatus::Inactive);
        assert_eq!(sensor.name(), "Hallway");
        assert_eq!(sensor.config()["base_temp"], json!(19.0));
        assert_eq!(sensor.config()["threshold_change"], json!(1.0));
        assert_eq!(sensor.config()["max_temp"], json!(85.0));
        assert_eq!(registry.instance(sensor.id()).unwrap().sensor_type, "temperature");
    }

    #[test]
    fn test_unknown_type_is_none() {
        let registry = SensorRegistry::with_builtin_types();
        assert!(registry.create("teleporter", "", Location::default(), &Payload::new()).is_none());
        assert_eq!(
            registry.try_create("teleporter", "", Location::default(), &Payload::new()).unwrap_err(),
            SensorError::UnknownType("teleporter".into())
        );
        assert_eq!(registry.instance_count(), 0);
    }

    #[test]
    fn test_malformed_config_fails_at_create() {
        let registry = SensorRegistry::with_builtin_types();
        let bad = payload(json!({"accuracy": "very"}));
        let err = registry
            .try_create("humidity", "Bathroom", Location::default(), &bad)
            .unwrap_err();
        assert!(matches!(err, SensorError::InvalidConfig { ref field, .. } if field == "accuracy"));
    }

    #[test]
    fn test_register_replaces_factory() {
        let registry = SensorRegistry::with_builtin_types();
        registry.register_type("temperature", |c| boxed(SmokeSensor::from_config(c)));

        let sensor = registry
            .create("temperature", "", Location::default(), &Payload::new())
            .unwrap();
        assert_eq!(sensor.type_tag(), "smoke");
        assert_eq!(registry.available_types().len(), 8);
    }

    #[test]
    fn test_spec_with_explicit_id() {
        let registry = SensorRegistry::with_builtin_types();
        let spec: SensorSpec = serde_json::from_value(json!({
            "sensor_id": "front-door",
            "type": "door_window",
            "config": {"sensor_type": "door"}
        }))
        .unwrap();

        let sensor = registry.create_from_spec(&spec).unwrap();
        assert_eq!(sensor.id(), "front-door");
        assert_eq!(sensor.location(), Location::new(100.0, 100.0));
        assert!(sensor.name().starts_with("door_window_"));
        assert!(registry.forget("front-door"));
        assert!(!registry.forget("front-door"));
    }
}
