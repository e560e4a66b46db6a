//! Core module - simulation engine, event bus and virtual clock

mod engine;
mod event_bus;
mod clock;

pub use engine::SimulationEngine;
pub use event_bus::{EventBus, EventKind, Observer, SensorEvent, SubscriptionId, SIMULATION_SOURCE};
pub use clock::{FpsCounter, SimulationClock};

use std::any::Any;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Running,
    Paused,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub state: EngineState,
    pub sensors_total: usize,
    pub sensors_active: usize,
    pub total_events: u64,
    pub ticks: u64,
    pub fps: f64,
    pub simulation_time: DateTime<Utc>,
    pub elapsed: String,
    pub start_time: Option<DateTime<Utc>>,
    pub speed_multiplier: f64,
    pub tick_interval_secs: f64,
}

/// Automation hook fed with every sensor-originated event.
///
/// Rule evaluation is not part of the simulator; the default hook ignores
/// everything.
pub trait RuleHook: Send + Sync {
    fn on_event(&self, event: &SensorEvent);
}

/// Hook that evaluates no rules
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRules;

impl RuleHook for NoRules {
    fn on_event(&self, _event: &SensorEvent) {}
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
