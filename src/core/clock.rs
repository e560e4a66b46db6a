// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/homesim

//! Virtual simulation clock and tick-rate counter

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Virtual timestamp advanced by scaled real time on every running tick
#[derive(Debug, Clone)]
pub struct SimulationClock {
    now: DateTime<Utc>,
    origin: Option<DateTime<Utc>>,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            origin: None,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Move forward by `elapsed`; the clock never runs backwards
    pub fn advance(&mut self, elapsed: Duration) {
        if let Ok(step) = chrono::Duration::from_std(elapsed) {
            if let Some(next) = self.now.checked_add_signed(step) {
                self.now = next;
            }
        }
    }

    /// Remember the current virtual time as the start of a run
    pub fn mark_origin(&mut self) {
        self.origin = Some(self.now);
    }

    /// Back to wall-clock now, forgetting the run origin
    pub fn reset(&mut self) {
        self.now = Utc::now();
        self.origin = None;
    }

    /// Virtual time elapsed since the run started
    pub fn elapsed(&self) -> chrono::Duration {
        self.origin
            .map(|origin| self.now - origin)
            .unwrap_or_else(chrono::Duration::zero)
    }

    /// `HH:MM:SS` of [`Self::elapsed`]
    pub fn elapsed_display(&self) -> String {
        let secs = self.elapsed().num_seconds().max(0);
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling ticks-per-second measurement, refreshed once per wall-clock second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    ticks: u32,
    window_start: Instant,
    current: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            window_start: Instant::now(),
            current: 0.0,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.ticks += 1;
        let window = now.saturating_duration_since(self.window_start);
        if window >= Duration::from_secs(1) {
            self.current = self.ticks as f64 / window.as_secs_f64();
            self.ticks = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f64 {
        self.current
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
