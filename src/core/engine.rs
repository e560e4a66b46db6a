// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Simulation engine - run state machine, update loop and sensor ownership

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{
    panic_message, EngineState, EngineStats, EventBus, EventKind, FpsCounter, NoRules, RuleHook, SensorEvent,
    SimulationClock, SubscriptionId, SIMULATION_SOURCE,
};
use crate::config::SimulationConfig;
use crate::project::HomeTemplate;
use crate::sensors::{payload, Payload, Sensor, SensorInfo, SensorRegistry, SensorStatus};

/// Accepted range for the speed multiplier
pub const SPEED_RANGE: (f64, f64) = (0.1, 10.0);

/// Accepted range for the tick interval, in seconds
pub const TICK_INTERVAL_RANGE: (f64, f64) = (0.1, 10.0);

fn clamp_to(value: f64, (lo, hi): (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}

/// State guarded by the engine's single mutex
struct EngineInner {
    state: EngineState,
    sensors: Vec<Sensor>,
    clock: SimulationClock,
    fps: FpsCounter,
    last_tick: Instant,
    start_time: Option<DateTime<Utc>>,
    speed_multiplier: f64,
    tick_interval: f64,
    ticks: u64,
    modified: bool,
}

impl EngineInner {
    fn position(&self, sensor_id: &str) -> Option<usize> {
        self.sensors.iter().position(|s| s.id() == sensor_id)
    }

    fn find_mut(&mut self, sensor_id: &str) -> Option<&mut Sensor> {
        self.sensors.iter_mut().find(|s| s.id() == sensor_id)
    }
}

/// Everything the worker thread and the public handle share
struct Shared {
    inner: Mutex<EngineInner>,
    bus: Arc<EventBus>,
    pending_tx: Sender<SensorEvent>,
    pending_rx: Receiver<SensorEvent>,
    rules: RwLock<Arc<dyn RuleHook>>,
    total_events: AtomicU64,
    config: SimulationConfig,
}

impl Shared {
    /// Take the events sensors queued while `held` was locked.
    ///
    /// Whoever holds the lock drains before releasing it, so the queue is
    /// empty whenever the lock is free and each thread only ever publishes
    /// events it produced itself.
    fn drain(&self, _held: &EngineInner) -> Vec<SensorEvent> {
        self.pending_rx.try_iter().collect()
    }

    /// Hand one event to the bus and, for sensor events, the rule hook.
    /// Must not be called with the engine lock held.
    fn deliver(&self, event: &SensorEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        self.bus.publish(event);
        if !event.is_simulation_event() {
            let rules = self.rules.read().clone();
            rules.on_event(event);
        }
    }

    fn publish_all(&self, events: Vec<SensorEvent>) {
        for event in &events {
            self.deliver(event);
        }
    }

    fn emit(&self, kind: EventKind, data: Payload) {
        self.deliver(&SensorEvent::new(SIMULATION_SOURCE, kind, data));
    }

    /// One running tick. Returns the tick interval to hold together with the
    /// events the sensors produced, or `None` when the engine is not running.
    fn tick(&self, now: Instant) -> Option<(Duration, Vec<SensorEvent>)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.state != EngineState::Running {
            return None;
        }

        let elapsed = now.saturating_duration_since(inner.last_tick).mul_f64(inner.speed_multiplier);
        inner.last_tick = now;
        inner.clock.advance(elapsed);

        let drain = self.config.battery_drain_rate;
        for sensor in inner.sensors.iter_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                sensor.update();
                sensor.simulate_battery_drain(drain);
            }));
            if let Err(panic) = outcome {
                let reason = panic_message(panic.as_ref());
                error!(sensor_id = %sensor.id(), "Error updating sensor: {}", reason);
                sensor.fail(&reason);
            }
        }

        inner.fps.tick(now);
        inner.ticks += 1;
        let events = self.drain(inner);
        Some((Duration::from_secs_f64(inner.tick_interval), events))
    }
}

/// Update loop body run by the worker thread
fn run_loop(shared: Arc<Shared>, shutdown: Receiver<()>, _finished: Sender<()>) {
    debug!("Update loop started");

    loop {
        let tick_start = Instant::now();
        let state = shared.inner.lock().state;

        let wait = match state {
            EngineState::Stopped => break,
            EngineState::Paused => shared.config.pause_poll(),
            EngineState::Running => match shared.tick(tick_start) {
                Some((interval, events)) => {
                    shared.publish_all(events);
                    interval.saturating_sub(tick_start.elapsed())
                }
                None => Duration::ZERO,
            },
        };

        match shutdown.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Update loop exited");
}

/// Handle on the background update loop
struct Worker {
    handle: JoinHandle<()>,
    shutdown: Sender<()>,
    finished: Receiver<()>,
}

impl Worker {
    fn spawn(shared: Arc<Shared>) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        // Never sent on: the worker drops its end when it exits
        let (finished_tx, finished_rx) = channel::bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("homesim-engine".to_string())
            .spawn(move || run_loop(shared, shutdown_rx, finished_tx))?;

        Ok(Self {
            handle,
            shutdown: shutdown_tx,
            finished: finished_rx,
        })
    }

    fn signal(&self) {
        let _ = self.shutdown.try_send(());
    }

    /// Signal the loop and wait up to `timeout` for it to exit. Returns false
    /// if it had to be detached.
    fn shutdown(self, timeout: Duration) -> bool {
        self.signal();

        // Stopping from an observer running on the worker itself
        if self.handle.thread().id() == thread::current().id() {
            return true;
        }

        match self.finished.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!("Update loop panicked");
                }
                true
            }
        }
    }
}

/// Owns the sensor collection and drives the simulation.
///
/// All methods take `&self` and may be called from any thread.
pub struct SimulationEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl SimulationEngine {
    pub fn new(config: SimulationConfig) -> Self {
        let (pending_tx, pending_rx) = channel::unbounded();
        let speed_multiplier = clamp_to(config.speed_multiplier, SPEED_RANGE, 1.0);
        let tick_interval = clamp_to(config.tick_interval_secs, TICK_INTERVAL_RANGE, 1.0);

        let inner = EngineInner {
            state: EngineState::Stopped,
            sensors: Vec::new(),
            clock: SimulationClock::new(),
            fps: FpsCounter::new(),
            last_tick: Instant::now(),
            start_time: None,
            speed_multiplier,
            tick_interval,
            ticks: 0,
            modified: false,
        };

        info!("Simulation engine initialized");
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                bus: Arc::new(EventBus::new()),
                pending_tx,
                pending_rx,
                rules: RwLock::new(Arc::new(NoRules)),
                total_events: AtomicU64::new(0),
                config,
            }),
            worker: Mutex::new(None),
        }
    }

    // Event system

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&SensorEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    /// Receiver for async consumers, sized from the engine configuration
    pub fn event_channel(&self) -> broadcast::Receiver<SensorEvent> {
        self.shared.bus.channel(self.shared.config.event_channel_capacity)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.shared.bus.clone()
    }

    pub fn set_rule_hook(&self, hook: Arc<dyn RuleHook>) {
        *self.shared.rules.write() = hook;
    }

    // Sensor management

    /// Take ownership of `sensor`. Fails if its id is already registered.
    pub fn add(&self, sensor: Sensor) -> bool {
        let data = {
            let mut inner = self.shared.inner.lock();
            if inner.position(sensor.id()).is_some() {
                error!("Sensor {} already exists", sensor.id());
                return false;
            }

            let pending = self.shared.pending_tx.clone();
            sensor.subscribe(move |event| {
                pending
                    .send(event.clone())
                    .map_err(|_| anyhow!("simulation engine is gone"))
            });

            info!("Added sensor: {} ({})", sensor.name(), sensor.type_tag());
            let data = payload(json!({
                "sensor_id": sensor.id(),
                "sensor_type": sensor.type_tag(),
                "location": sensor.location(),
            }));
            inner.sensors.push(sensor);
            inner.modified = true;
            data
        };

        self.shared.emit(EventKind::SensorAdded, data);
        true
    }

    pub fn remove(&self, sensor_id: &str) -> bool {
        let removed = {
            let mut inner = self.shared.inner.lock();
            let Some(index) = inner.position(sensor_id) else {
                error!("Sensor {} not found", sensor_id);
                return false;
            };
            inner.modified = true;
            inner.sensors.remove(index)
        };

        info!("Removed sensor: {}", removed.name());
        let data = payload(json!({
            "sensor_id": sensor_id,
            "sensor_type": removed.type_tag(),
        }));
        drop(removed);

        self.shared.emit(EventKind::SensorRemoved, data);
        true
    }

    /// Remove every sensor, returning how many were removed
    pub fn clear_sensors(&self) -> usize {
        let ids = self.sensor_ids();
        ids.iter().filter(|id| self.remove(id)).count()
    }

    /// Run `f` against a registered sensor (relocation, reconfiguration, ...)
    pub fn with_sensor<R>(&self, sensor_id: &str, f: impl FnOnce(&mut Sensor) -> R) -> Option<R> {
        let (result, events) = {
            let mut inner = self.shared.inner.lock();
            let result = inner.find_mut(sensor_id).map(f);
            if result.is_some() {
                inner.modified = true;
            }
            (result, self.shared.drain(&inner))
        };
        self.shared.publish_all(events);
        result
    }

    /// Re-run authentication and mark the sensor active
    pub fn activate_sensor(&self, sensor_id: &str) -> bool {
        self.with_sensor(sensor_id, |s| s.activate()).unwrap_or(false)
    }

    pub fn deactivate_sensor(&self, sensor_id: &str) -> bool {
        self.with_sensor(sensor_id, |s| s.deactivate()).is_some()
    }

    /// Administrative reading, outside change gating and the event stream
    pub fn sample(&self, sensor_id: &str) -> Option<anyhow::Result<Payload>> {
        let mut inner = self.shared.inner.lock();
        inner.find_mut(sensor_id).map(|s| s.sample())
    }

    // Simulation control

    pub fn start(&self) {
        let (from_stopped, start_time, activations) = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;
            let (from_stopped, start_time) = match inner.state {
                EngineState::Running => {
                    info!("Simulation already running");
                    return;
                }
                EngineState::Paused => {
                    inner.state = EngineState::Running;
                    inner.last_tick = Instant::now();
                    (false, inner.start_time)
                }
                EngineState::Stopped => {
                    let now = Utc::now();
                    inner.state = EngineState::Running;
                    inner.start_time = Some(now);
                    inner.last_tick = Instant::now();
                    inner.clock.mark_origin();
                    for sensor in inner.sensors.iter_mut() {
                        sensor.activate();
                    }
                    (true, Some(now))
                }
            };
            (from_stopped, start_time, self.shared.drain(inner))
        };
        self.shared.publish_all(activations);

        self.shared.emit(
            EventKind::SimulationStarted,
            payload(json!({
                "start_time": start_time.map(|t| t.to_rfc3339()),
                "resumed": !from_stopped,
            })),
        );

        if from_stopped {
            if let Err(e) = self.spawn_worker() {
                error!("Failed to spawn update loop: {}", e);
                self.stop();
                return;
            }
        }
        info!("Simulation started");
    }

    fn spawn_worker(&self) -> std::io::Result<()> {
        let mut slot = self.worker.lock();
        if let Some(previous) = slot.take() {
            previous.signal();
        }
        *slot = Some(Worker::spawn(self.shared.clone())?);
        Ok(())
    }

    pub fn pause(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != EngineState::Running {
                return;
            }
            inner.state = EngineState::Paused;
        }

        self.shared.emit(EventKind::SimulationPaused, Payload::new());
        info!("Simulation paused");
    }

    pub fn stop(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.state == EngineState::Stopped {
                return;
            }
            inner.state = EngineState::Stopped;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let timeout = self.shared.config.stop_timeout();
            if !worker.shutdown(timeout) {
                warn!("Update loop did not exit within {:?}, detaching it", timeout);
            }
        }

        let deactivations = {
            let mut inner = self.shared.inner.lock();
            for sensor in inner.sensors.iter_mut() {
                sensor.deactivate();
            }
            self.shared.drain(&inner)
        };
        self.shared.publish_all(deactivations);

        self.shared.emit(EventKind::SimulationStopped, Payload::new());
        info!("Simulation stopped");
    }

    pub fn reset(&self) {
        let was_running = self.state() == EngineState::Running;
        if was_running {
            self.stop();
        }

        {
            let mut inner = self.shared.inner.lock();
            inner.clock.reset();
            inner.start_time = None;
            inner.fps.reset();
            inner.ticks = 0;
            for sensor in inner.sensors.iter_mut() {
                sensor.reset_runtime();
            }
        }
        self.shared.total_events.store(0, Ordering::Relaxed);

        self.shared.emit(EventKind::SimulationReset, Payload::new());
        info!("Simulation reset");

        if was_running {
            self.start();
        }
    }

    /// Virtual seconds per real second, clamped to [0.1, 10]
    pub fn set_speed_multiplier(&self, speed: f64) {
        let speed = clamp_to(speed, SPEED_RANGE, 1.0);
        {
            let mut inner = self.shared.inner.lock();
            inner.speed_multiplier = speed;
            inner.modified = true;
        }
        self.shared.emit(EventKind::SpeedChanged, payload(json!({ "speed": speed })));
    }

    /// Loop cadence in seconds, clamped to [0.1, 10]; applies from the next tick
    pub fn set_tick_interval(&self, secs: f64) {
        let secs = clamp_to(secs, TICK_INTERVAL_RANGE, 1.0);
        let mut inner = self.shared.inner.lock();
        inner.tick_interval = secs;
        inner.modified = true;
        debug!(tick_interval = secs, "Tick interval changed");
    }

    /// Clear sensors and populate them from `template`. Entries whose type the
    /// registry cannot build are skipped.
    pub fn load_template(&self, template: &HomeTemplate, registry: &SensorRegistry) -> usize {
        for sensor_id in self.sensor_ids() {
            if self.remove(&sensor_id) {
                registry.forget(&sensor_id);
            }
        }

        let mut loaded = 0;
        for spec in &template.sensors {
            match registry.create_from_spec(spec) {
                Ok(sensor) => {
                    if self.add(sensor) {
                        loaded += 1;
                    }
                }
                Err(e) => warn!("Skipping template sensor '{}': {}", spec.name, e),
            }
        }

        self.shared.emit(
            EventKind::TemplateLoaded,
            payload(json!({ "template": template.name, "sensors": loaded })),
        );
        info!("Loaded template: {} ({} sensors)", template.name, loaded);
        loaded
    }

    // Getters

    pub fn state(&self) -> EngineState {
        self.shared.inner.lock().state
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.shared.inner.lock().speed_multiplier
    }

    pub fn tick_interval(&self) -> f64 {
        self.shared.inner.lock().tick_interval
    }

    pub fn sensor_count(&self) -> usize {
        self.shared.inner.lock().sensors.len()
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        self.shared.inner.lock().sensors.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<SensorInfo> {
        let inner = self.shared.inner.lock();
        inner.sensors.iter().find(|s| s.id() == sensor_id).map(Sensor::info)
    }

    /// Snapshots in registration order
    pub fn sensors(&self) -> Vec<SensorInfo> {
        self.shared.inner.lock().sensors.iter().map(Sensor::info).collect()
    }

    pub fn sensors_by_type(&self, type_tag: &str) -> Vec<SensorInfo> {
        let inner = self.shared.inner.lock();
        inner
            .sensors
            .iter()
            .filter(|s| s.type_tag() == type_tag)
            .map(Sensor::info)
            .collect()
    }

    pub fn simulation_time(&self) -> DateTime<Utc> {
        self.shared.inner.lock().clock.now()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.shared.inner.lock().start_time
    }

    /// Virtual time since the run started, as `HH:MM:SS`
    pub fn elapsed_display(&self) -> String {
        self.shared.inner.lock().clock.elapsed_display()
    }

    pub fn fps(&self) -> f64 {
        self.shared.inner.lock().fps.fps()
    }

    pub fn total_events(&self) -> u64 {
        self.shared.total_events.load(Ordering::Relaxed)
    }

    pub fn is_modified(&self) -> bool {
        self.shared.inner.lock().modified
    }

    pub(crate) fn set_modified(&self, modified: bool) {
        self.shared.inner.lock().modified = modified;
    }

    pub fn stats(&self) -> EngineStats {
        let inner = self.shared.inner.lock();
        EngineStats {
            state: inner.state,
            sensors_total: inner.sensors.len(),
            sensors_active: inner.sensors.iter().filter(|s| s.status() == SensorStatus::Active).count(),
            total_events: self.shared.total_events.load(Ordering::Relaxed),
            ticks: inner.ticks,
            fps: inner.fps.fps(),
            simulation_time: inner.clock.now(),
            elapsed: inner.clock.elapsed_display(),
            start_time: inner.start_time,
            speed_multiplier: inner.speed_multiplier,
            tick_interval_secs: inner.tick_interval,
        }
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.shared.inner.lock().state = EngineState::Stopped;
        if let Some(worker) = self.worker.get_mut().take() {
            worker.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::HomeTemplate;
    use crate::sensors::{Location, SensorModel, SensorSpec};
    use anyhow::{bail, Result};

    /// Always reports the same reading
    struct SteadyModel;

    impl SensorModel for SteadyModel {
        fn type_tag(&self) -> &'static str {
            "steady"
        }
        fn default_config(&self) -> Payload {
            Payload::new()
        }
        fn reading(&mut self) -> Result<Payload> {
            Ok(payload(json!({ "level": 1 })))
        }
    }

    /// Counts up on every reading
    struct CounterModel(u64);

    impl SensorModel for CounterModel {
        fn type_tag(&self) -> &'static str {
            "counter"
        }
        fn default_config(&self) -> Payload {
            Payload::new()
        }
        fn reading(&mut self) -> Result<Payload> {
            self.0 += 1;
            Ok(payload(json!({ "count": self.0 })))
        }
    }

    struct BrokenModel;

    impl SensorModel for BrokenModel {
        fn type_tag(&self) -> &'static str {
            "broken"
        }
        fn default_config(&self) -> Payload {
            Payload::new()
        }
        fn reading(&mut self) -> Result<Payload> {
            bail!("bus fault")
        }
    }

    struct PanickingModel;

    impl SensorModel for PanickingModel {
        fn type_tag(&self) -> &'static str {
            "panicking"
        }
        fn default_config(&self) -> Payload {
            Payload::new()
        }
        fn reading(&mut self) -> Result<Payload> {
            panic!("firmware crashed")
        }
    }

    fn sensor(model: impl SensorModel + 'static, id: &str) -> Sensor {
        Sensor::new(Box::new(model)).with_id(id)
    }

    fn engine(tick_interval_secs: f64) -> SimulationEngine {
        SimulationEngine::new(SimulationConfig {
            tick_interval_secs,
            ..SimulationConfig::default()
        })
    }

    fn record(engine: &SimulationEngine) -> Arc<Mutex<Vec<SensorEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        engine.subscribe(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        events
    }

    fn kinds(events: &Mutex<Vec<SensorEvent>>) -> Vec<EventKind> {
        events.lock().iter().map(|e| e.event_type()).collect()
    }

    fn count(events: &Mutex<Vec<SensorEvent>>, source: &str, kind: EventKind) -> usize {
        events
            .lock()
            .iter()
            .filter(|e| e.sensor_id() == source && e.event_type() == kind)
            .count()
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_state_machine_transitions() {
        let engine = engine(10.0);
        let events = record(&engine);
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.pause();
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.start();
        assert_eq!(engine.state(), EngineState::Running);
        engine.start();

        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        engine.pause();

        engine.start();
        assert_eq!(engine.state(), EngineState::Running);

        engine.stop();
        assert_eq!(engine.state(), EngineState::Stopped);
        engine.stop();

        engine.reset();
        assert_eq!(engine.state(), EngineState::Stopped);

        assert_eq!(
            kinds(&events),
            vec![
                EventKind::SimulationStarted,
                EventKind::SimulationPaused,
                EventKind::SimulationStarted,
                EventKind::SimulationStopped,
                EventKind::SimulationReset,
            ]
        );
    }

    #[test]
    fn test_reset_while_running_restarts() {
        let engine = engine(0.1);
        engine.add(sensor(CounterModel(0), "counter"));
        engine.start();
        assert!(wait_until(Duration::from_secs(2), || engine.stats().ticks >= 2));

        engine.reset();
        assert_eq!(engine.state(), EngineState::Running);
        let info = engine.sensor("counter").unwrap();
        assert_eq!(info.status, SensorStatus::Active);
        assert!(info.battery_level > 99.0);
        engine.stop();
    }

    #[test]
    fn test_reset_clears_runtime_state() {
        let engine = engine(10.0);
        engine.add(sensor(CounterModel(0), "counter"));
        engine.start();
        assert!(wait_until(Duration::from_secs(2), || {
            engine.sensor("counter").map_or(false, |s| s.last_reading.is_some())
        }));
        engine.stop();

        engine.reset();
        let info = engine.sensor("counter").unwrap();
        assert!(info.last_reading.is_none());
        assert!(info.last_update.is_none());
        assert_eq!(info.battery_level, 100.0);
        assert_eq!(engine.stats().ticks, 0);
        assert_eq!(engine.total_events(), 1);
        assert_eq!(engine.elapsed_display(), "00:00:00");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let engine = engine(10.0);
        assert!(engine.add(sensor(SteadyModel, "same")));
        assert!(!engine.add(sensor(SteadyModel, "same")));
        assert_eq!(engine.sensor_count(), 1);
    }

    #[test]
    fn test_remove_unknown_is_harmless() {
        let engine = engine(10.0);
        engine.add(sensor(SteadyModel, "kept"));
        let events = record(&engine);

        assert!(!engine.remove("missing"));
        assert_eq!(engine.sensor_count(), 1);
        assert!(events.lock().is_empty());

        assert!(engine.remove("kept"));
        assert_eq!(engine.sensor_count(), 0);
        assert_eq!(kinds(&events), vec![EventKind::SensorRemoved]);
    }

    #[test]
    fn test_failing_sensors_do_not_block_others() {
        let engine = engine(0.1);
        let events = record(&engine);
        engine.add(sensor(BrokenModel, "broken"));
        engine.add(sensor(PanickingModel, "panicking"));
        engine.add(sensor(CounterModel(0), "healthy"));

        engine.start();
        assert!(wait_until(Duration::from_secs(3), || {
            count(&events, "healthy", EventKind::SensorData) >= 3
        }));
        engine.stop();

        assert_eq!(count(&events, "broken", EventKind::SensorError), 1);
        assert_eq!(count(&events, "panicking", EventKind::SensorError), 1);
        assert_eq!(engine.sensor("broken").unwrap().status, SensorStatus::Inactive);
    }

    #[test]
    fn test_error_status_until_reactivated() {
        let engine = engine(0.1);
        engine.add(sensor(BrokenModel, "broken"));
        engine.start();
        assert!(wait_until(Duration::from_secs(2), || {
            engine.sensor("broken").map_or(false, |s| s.status == SensorStatus::Error)
        }));

        assert!(engine.deactivate_sensor("broken"));
        assert!(engine.activate_sensor("broken"));
        assert_eq!(engine.sensor("broken").unwrap().status, SensorStatus::Active);
        assert!(!engine.activate_sensor("missing"));
        engine.stop();
    }

    #[test]
    fn test_identical_readings_publish_once() {
        let engine = engine(0.1);
        let events = record(&engine);
        engine.add(sensor(SteadyModel, "steady"));

        engine.start();
        assert!(wait_until(Duration::from_secs(3), || engine.stats().ticks >= 4));
        engine.stop();

        assert_eq!(count(&events, "steady", EventKind::SensorData), 1);
    }

    #[test]
    fn test_clock_frozen_unless_running() {
        let engine = engine(0.1);
        let before = engine.simulation_time();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(engine.simulation_time(), before);

        engine.start();
        assert!(wait_until(Duration::from_secs(2), || engine.simulation_time() > before));

        let mut last = engine.simulation_time();
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(50));
            let now = engine.simulation_time();
            assert!(now >= last);
            last = now;
        }

        engine.pause();
        thread::sleep(Duration::from_millis(150));
        let paused = engine.simulation_time();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(engine.simulation_time(), paused);

        engine.stop();
        let stopped = engine.simulation_time();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(engine.simulation_time(), stopped);
    }

    #[test]
    fn test_speed_multiplier_scales_clock() {
        let engine = engine(0.1);
        engine.set_speed_multiplier(2.0);
        engine.start();
        thread::sleep(Duration::from_millis(150));

        let t0 = engine.simulation_time();
        thread::sleep(Duration::from_secs(1));
        let advanced = (engine.simulation_time() - t0).num_milliseconds() as f64 / 1000.0;
        engine.stop();

        assert!((1.4..=2.6).contains(&advanced), "virtual clock advanced {}s", advanced);
    }

    #[test]
    fn test_settings_are_clamped() {
        let engine = engine(1.0);
        let events = record(&engine);

        engine.set_speed_multiplier(50.0);
        assert_eq!(engine.speed_multiplier(), 10.0);
        engine.set_speed_multiplier(0.0);
        assert_eq!(engine.speed_multiplier(), 0.1);
        engine.set_tick_interval(0.01);
        assert_eq!(engine.tick_interval(), 0.1);
        engine.set_tick_interval(f64::NAN);
        assert_eq!(engine.tick_interval(), 1.0);

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data()["speed"], json!(10.0));
        assert!(events.iter().all(|e| e.event_type() == EventKind::SpeedChanged));
    }

    #[test]
    fn test_stop_does_not_wait_for_long_tick() {
        let engine = engine(10.0);
        engine.start();
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        engine.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_temperature_scenario() {
        let registry = SensorRegistry::with_builtin_types();
        let config = payload(json!({
            "base_temp": 22.0,
            "accuracy": 0.3,
            "threshold_change": 0.5,
            "min_temp": 21.0,
            "max_temp": 23.0,
        }));
        let thermometer = registry
            .create("temperature", "Living room", Location::new(200.0, 150.0), &config)
            .unwrap();
        let id = thermometer.id().to_string();

        let engine = engine(10.0);
        let events = record(&engine);
        assert!(engine.add(thermometer));
        engine.start();
        assert!(wait_until(Duration::from_secs(2), || count(&events, &id, EventKind::SensorData) == 1));
        engine.stop();

        let events = events.lock();
        let order: Vec<EventKind> = events.iter().map(|e| e.event_type()).take(4).collect();
        assert_eq!(
            order,
            vec![
                EventKind::SensorAdded,
                EventKind::SensorActivated,
                EventKind::SimulationStarted,
                EventKind::SensorData,
            ]
        );
        let temperature = events[3].data()["temperature"].as_f64().unwrap();
        assert!((21.0..=23.0).contains(&temperature));
    }

    #[test]
    fn test_observer_failure_does_not_reach_engine() {
        let engine = engine(10.0);
        engine.subscribe(|_| bail!("display crashed"));
        let events = record(&engine);

        assert!(engine.add(sensor(SteadyModel, "steady")));
        engine.start();
        engine.stop();

        assert_eq!(engine.state(), EngineState::Stopped);
        let seen = kinds(&events);
        for kind in [EventKind::SensorAdded, EventKind::SimulationStarted, EventKind::SimulationStopped] {
            assert!(seen.contains(&kind), "missing {}", kind);
        }
    }

    #[test]
    fn test_rule_hook_sees_sensor_events_only() {
        struct Collect(Mutex<Vec<EventKind>>);
        impl RuleHook for Collect {
            fn on_event(&self, event: &SensorEvent) {
                self.0.lock().push(event.event_type());
            }
        }

        let engine = engine(10.0);
        let hook = Arc::new(Collect(Mutex::new(Vec::new())));
        engine.set_rule_hook(hook.clone());
        engine.add(sensor(SteadyModel, "steady"));
        engine.start();
        assert!(wait_until(Duration::from_secs(2), || hook.0.lock().len() >= 2));
        engine.stop();

        assert_eq!(
            *hook.0.lock(),
            vec![EventKind::SensorActivated, EventKind::SensorData, EventKind::SensorDeactivated]
        );
    }

    #[test]
    fn test_sample_bypasses_gating() {
        let engine = engine(10.0);
        engine.add(sensor(CounterModel(0), "counter"));
        let events = record(&engine);

        let first = engine.sample("counter").unwrap().unwrap();
        let second = engine.sample("counter").unwrap().unwrap();
        assert_ne!(first, second);
        assert!(engine.sample("missing").is_none());
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_load_template_skips_unknown_types() {
        let registry = SensorRegistry::with_builtin_types();
        let engine = engine(10.0);
        engine.add(sensor(SteadyModel, "old"));
        let events = record(&engine);

        let template = HomeTemplate {
            name: "Garage".to_string(),
            description: String::new(),
            sensors: vec![
                SensorSpec {
                    sensor_id: Some("garage-door".to_string()),
                    sensor_type: "door_window".to_string(),
                    name: "Garage door".to_string(),
                    location: Location::new(10.0, 10.0),
                    config: Payload::new(),
                },
                SensorSpec {
                    sensor_id: None,
                    sensor_type: "flux_capacitor".to_string(),
                    name: "Mystery".to_string(),
                    location: Location::default(),
                    config: Payload::new(),
                },
            ],
        };

        assert_eq!(engine.load_template(&template, &registry), 1);
        assert_eq!(engine.sensor_ids(), vec!["garage-door".to_string()]);
        assert_eq!(
            kinds(&events),
            vec![EventKind::SensorRemoved, EventKind::SensorAdded, EventKind::TemplateLoaded]
        );
    }

    #[test]
    fn test_modified_flag() {
        let engine = engine(10.0);
        assert!(!engine.is_modified());
        engine.add(sensor(SteadyModel, "steady"));
        assert!(engine.is_modified());
        engine.set_modified(false);
        engine.with_sensor("steady", |s| s.set_location(1.0, 2.0));
        assert!(engine.is_modified());
        assert_eq!(engine.sensor("steady").unwrap().location, Location::new(1.0, 2.0));
    }

    #[test]
    fn test_sensor_data_stays_on_update_loop_while_caller_blocks() {
        let engine = engine(0.1);
        engine.add(sensor(CounterModel(0), "counter"));

        let threads = Arc::new(Mutex::new(Vec::new()));
        let sink = threads.clone();
        engine.subscribe(move |event| {
            match event.event_type() {
                EventKind::SensorData => sink.lock().push(thread::current().name().map(str::to_string)),
                EventKind::SpeedChanged => thread::sleep(Duration::from_millis(500)),
                _ => {}
            }
            Ok(())
        });

        engine.start();
        assert!(wait_until(Duration::from_secs(2), || engine.stats().ticks > 0));

        let before = engine.stats().ticks;
        engine.set_speed_multiplier(2.0);
        let during = engine.stats().ticks - before;
        engine.stop();

        assert!(during >= 3, "update loop stalled behind a slow observer: {} ticks", during);
        let threads = threads.lock();
        assert!(!threads.is_empty());
        assert!(threads.iter().all(|name| name.as_deref() == Some("homesim-engine")), "{:?}", threads);
    }

    #[test]
    fn test_battery_drains_to_dead() {
        let engine = SimulationEngine::new(SimulationConfig {
            tick_interval_secs: 0.1,
            battery_drain_rate: 30.0,
            ..SimulationConfig::default()
        });
        let events = record(&engine);
        engine.add(sensor(SteadyModel, "cell"));

        engine.start();
        assert!(wait_until(Duration::from_secs(3), || count(&events, "cell", EventKind::BatteryDead) > 0));

        let info = engine.sensor("cell").unwrap();
        assert_eq!(info.status, SensorStatus::Error);
        assert_eq!(info.battery_level, 0.0);
        engine.stop();

        let battery: Vec<EventKind> = events
            .lock()
            .iter()
            .filter(|e| e.sensor_id() == "cell")
            .map(|e| e.event_type())
            .filter(|kind| matches!(kind, EventKind::LowBattery | EventKind::BatteryDead))
            .collect();
        assert_eq!(battery, vec![EventKind::LowBattery, EventKind::BatteryDead]);
    }

    #[test]
    fn test_reloading_template_releases_registry_instances() {
        let engine = engine(10.0);
        let registry = SensorRegistry::with_builtin_types();
        let template = HomeTemplate::demo();

        engine.load_template(&template, &registry);
        engine.load_template(&template, &registry);

        assert_eq!(engine.sensor_count(), template.sensors.len());
        assert_eq!(registry.instance_count(), template.sensors.len());
    }
}
