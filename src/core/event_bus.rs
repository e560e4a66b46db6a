// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Event bus for sensor and simulation events

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::error;

use crate::sensors::Payload;

/// Source id used for events the engine itself produces
pub const SIMULATION_SOURCE: &str = "simulation";

/// Event types in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SensorAdded,
    SensorRemoved,
    SensorData,
    SensorActivated,
    SensorDeactivated,
    SensorError,
    LowBattery,
    BatteryDead,
    LocationChanged,
    ConfigError,
    SimulationStarted,
    SimulationPaused,
    SimulationStopped,
    SimulationReset,
    SpeedChanged,
    TemplateLoaded,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SensorAdded => "sensor_added",
            EventKind::SensorRemoved => "sensor_removed",
            EventKind::SensorData => "sensor_data",
            EventKind::SensorActivated => "sensor_activated",
            EventKind::SensorDeactivated => "sensor_deactivated",
            EventKind::SensorError => "sensor_error",
            EventKind::LowBattery => "low_battery",
            EventKind::BatteryDead => "battery_dead",
            EventKind::LocationChanged => "location_changed",
            EventKind::ConfigError => "config_error",
            EventKind::SimulationStarted => "simulation_started",
            EventKind::SimulationPaused => "simulation_paused",
            EventKind::SimulationStopped => "simulation_stopped",
            EventKind::SimulationReset => "simulation_reset",
            EventKind::SpeedChanged => "speed_changed",
            EventKind::TemplateLoaded => "template_loaded",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    event_id: String,
    sensor_id: String,
    event_type: EventKind,
    data: Payload,
    timestamp: DateTime<Utc>,
}

impl SensorEvent {
    pub fn new(sensor_id: &str, event_type: EventKind, data: Payload) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            sensor_id: sensor_id.to_string(),
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn event_type(&self) -> EventKind {
        self.event_type
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True for events published by the engine rather than a sensor
    pub fn is_simulation_event(&self) -> bool {
        self.sensor_id == SIMULATION_SOURCE
    }
}

/// Observer callback. Errors are logged by the bus and never reach the publisher.
pub type Observer = Arc<dyn Fn(&SensorEvent) -> Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous, ordered fan-out of events to every subscribed observer
pub struct EventBus {
    observers: RwLock<Vec<(SubscriptionId, Observer)>>,
    channels: RwLock<Vec<broadcast::Sender<SensorEvent>>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
            channels: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SensorEvent) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    /// Deliver `event` to every observer in subscription order, then to the
    /// broadcast channels.
    ///
    /// Runs on the caller's thread. The observer list is snapshotted first, so
    /// callbacks may subscribe or unsubscribe without deadlocking.
    pub fn publish(&self, event: &SensorEvent) {
        let observers: Vec<Observer> = self.observers.read().iter().map(|(_, o)| o.clone()).collect();
        self.published.fetch_add(1, Ordering::Relaxed);

        for observer in observers {
            match panic::catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(event_type = %event.event_type(), source = %event.sensor_id(), "Error in event callback: {}", e);
                }
                Err(panic) => {
                    error!(
                        event_type = %event.event_type(),
                        source = %event.sensor_id(),
                        "Event callback panicked: {}",
                        super::panic_message(panic.as_ref())
                    );
                }
            }
        }

        if !self.channels.read().is_empty() {
            // A send only fails once every receiver is gone
            self.channels.write().retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Bridge into a broadcast channel for async consumers. The bus drops its
    /// sender on the first publish after the last receiver is gone.
    pub fn channel(&self, capacity: usize) -> broadcast::Receiver<SensorEvent> {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        self.channels.write().push(tx);
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Broadcast channels still attached to the bus
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
