// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Shared sensor record and lifecycle

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::registry::SensorFactory;
use super::traits::payload;
use super::{Location, Payload, SensorModel, SensorStatus};
use crate::core::{EventBus, EventKind, SensorEvent, SubscriptionId};

/// Battery level at or below which `low_battery` is reported
pub const LOW_BATTERY_LEVEL: f64 = 10.0;

const FIRMWARE_VERSION: &str = "1.0.0";

/// Serializable snapshot of a sensor, also the on-disk project representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub location: Location,
    pub status: SensorStatus,
    pub config: Payload,
    pub last_reading: Option<Payload>,
    pub last_update: Option<DateTime<Utc>>,
    pub battery_level: f64,
    pub firmware_version: String,
    pub install_date: DateTime<Utc>,
    pub authenticated: bool,
    pub security_level: String,
}

/// A simulated sensor: identity, runtime state and the variant model behind it
pub struct Sensor {
    id: String,
    name: String,
    location: Location,
    config: Payload,
    status: SensorStatus,
    last_reading: Option<Payload>,
    last_update: Option<DateTime<Utc>>,
    battery_level: f64,
    low_battery_reported: bool,
    authenticated: bool,
    security_level: String,
    firmware_version: String,
    install_date: DateTime<Utc>,
    model: Box<dyn SensorModel>,
    factory: Option<SensorFactory>,
    bus: EventBus,
}

impl Sensor {
    /// Wrap a model. The configuration starts as the model's defaults; the id
    /// is a fresh uuid and the name is derived from type and id.
    pub fn new(model: Box<dyn SensorModel>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let name = default_name(model.type_tag(), &id);
        let config = model.default_config();

        Self {
            id,
            name,
            location: Location::default(),
            security_level: security_level(&config),
            config,
            status: SensorStatus::Inactive,
            last_reading: None,
            last_update: None,
            battery_level: 100.0,
            low_battery_reported: false,
            authenticated: false,
            firmware_version: FIRMWARE_VERSION.to_string(),
            install_date: Utc::now(),
            model,
            factory: None,
            bus: EventBus::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        let derived = self.name == default_name(self.model.type_tag(), &self.id);
        self.id = id.to_string();
        if derived {
            self.name = default_name(self.model.type_tag(), &self.id);
        }
        self
    }

    /// Empty names keep the derived default
    pub fn with_name(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.name = name.to_string();
        }
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Replace the stored configuration map. The caller is responsible for the
    /// model having been built from the same map.
    pub fn with_config(mut self, config: Payload) -> Self {
        self.security_level = security_level(&config);
        self.config = config;
        self
    }

    /// Restore a persisted battery level, clamped to [0, 100]
    pub fn with_battery_level(mut self, level: f64) -> Self {
        if level.is_finite() {
            self.battery_level = level.clamp(0.0, 100.0);
            self.low_battery_reported = self.battery_level <= LOW_BATTERY_LEVEL;
        }
        self
    }

    pub(crate) fn with_factory(mut self, factory: SensorFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> &'static str {
        self.model.type_tag()
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn config(&self) -> &Payload {
        &self.config
    }

    pub fn status(&self) -> SensorStatus {
        self.status
    }

    pub fn last_reading(&self) -> Option<&Payload> {
        self.last_reading.as_ref()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn battery_level(&self) -> f64 {
        self.battery_level
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Observe this sensor's own events
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SensorEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn emit(&self, kind: EventKind, data: Payload) {
        self.bus.publish(&SensorEvent::new(&self.id, kind, data));
    }

    /// Run the model's trust check. Pass-through until a security layer exists.
    pub fn authenticate(&mut self) -> bool {
        self.authenticated = self.model.authenticate();
        self.authenticated
    }

    pub fn activate(&mut self) -> bool {
        if !self.authenticate() {
            warn!(sensor_id = %self.id, "Authentication failed, sensor stays {}", self.status.as_str());
            return false;
        }
        self.status = SensorStatus::Active;
        self.emit(EventKind::SensorActivated, Payload::new());
        true
    }

    pub fn deactivate(&mut self) {
        self.status = SensorStatus::Inactive;
        self.emit(EventKind::SensorDeactivated, Payload::new());
    }

    /// Administrative reading: bypasses change gating, status and events
    pub fn sample(&mut self) -> Result<Payload> {
        self.model.reading()
    }

    /// Poll the model once. Returns the reading only when it was accepted as a
    /// significant change. Reading failures put the sensor into `Error` and
    /// surface as a `sensor_error` event.
    pub fn update(&mut self) -> Option<Payload> {
        if self.status != SensorStatus::Active {
            return None;
        }

        match self.model.reading() {
            Ok(reading) => {
                let significant = match &self.last_reading {
                    None => true,
                    Some(last) => self.model.significant_change(&reading, last),
                };
                if !significant {
                    return None;
                }

                self.last_reading = Some(reading.clone());
                self.last_update = Some(Utc::now());
                self.emit(EventKind::SensorData, reading.clone());
                Some(reading)
            }
            Err(e) => {
                self.fail(&e.to_string());
                None
            }
        }
    }

    /// Force the sensor into `Error` and report why
    pub(crate) fn fail(&mut self, reason: &str) {
        warn!(sensor_id = %self.id, "Sensor failed: {}", reason);
        self.status = SensorStatus::Error;
        self.emit(EventKind::SensorError, payload(json!({ "error": reason })));
    }

    pub fn simulate_battery_drain(&mut self, rate: f64) {
        if self.status != SensorStatus::Active {
            return;
        }

        self.battery_level = (self.battery_level - rate.max(0.0)).max(0.0);

        if self.battery_level <= LOW_BATTERY_LEVEL && !self.low_battery_reported {
            self.low_battery_reported = true;
            self.emit(EventKind::LowBattery, payload(json!({ "battery_level": self.battery_level })));
        }
        if self.battery_level <= 0.0 {
            self.status = SensorStatus::Error;
            self.emit(EventKind::BatteryDead, Payload::new());
        }
    }

    pub fn set_location(&mut self, x: f64, y: f64) {
        let old = self.location;
        self.location = Location::new(x, y);
        self.emit(
            EventKind::LocationChanged,
            payload(json!({ "old_location": old, "new_location": self.location })),
        );
    }

    /// Merge `overrides` into the configuration.
    ///
    /// Registry-built sensors rebuild their model from the merged map, which
    /// validates it and resets the model's private state. A rejected update
    /// leaves the sensor untouched and emits `config_error`.
    pub fn update_config(&mut self, overrides: &Payload) -> bool {
        let mut merged = self.config.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        if let Some(factory) = &self.factory {
            match factory(&merged) {
                Ok(model) => self.model = model,
                Err(e) => {
                    self.emit(EventKind::ConfigError, payload(json!({ "error": e.to_string() })));
                    return false;
                }
            }
        }

        self.security_level = security_level(&merged);
        self.config = merged;
        debug!(sensor_id = %self.id, "Configuration updated");
        true
    }

    /// Clear runtime-only state, as done by an engine reset
    pub fn reset_runtime(&mut self) {
        self.last_reading = None;
        self.last_update = None;
        self.battery_level = 100.0;
        self.low_battery_reported = false;
    }

    pub fn info(&self) -> SensorInfo {
        SensorInfo {
            sensor_id: self.id.clone(),
            name: self.name.clone(),
            sensor_type: self.type_tag().to_string(),
            location: self.location,
            status: self.status,
            config: self.config.clone(),
            last_reading: self.last_reading.clone(),
            last_update: self.last_update,
            battery_level: self.battery_level,
            firmware_version: self.firmware_version.clone(),
            install_date: self.install_date,
            authenticated: self.authenticated,
            security_level: self.security_level.clone(),
        }
    }
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.type_tag())
            .field("status", &self.status)
            .field("battery_level", &self.battery_level)
            .finish()
    }
}

fn default_name(type_tag: &str, id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("{}_{}", type_tag, short)
}

fn security_level(config: &Payload) -> String {
    config
        .get("security_level")
        .and_then(|v| v.as_str())
        .unwrap_or("basic")
        .to_string()
}
