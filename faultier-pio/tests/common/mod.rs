// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![allow(dead_code)]

use embassy_time::{Duration, Instant};

use faultier_core::{GlitcherSettings, GlitchOutput, TriggerPull, TriggerType};
use faultier_pio::sim::{SimLane, Stimulus};
use faultier_pio::{Capture, Clock, Glitcher, Indicator};

/// Trigger input used by the default settings: `Ext1`.
pub const TRIGGER_GPIO: u8 = 8;

/// Glitch output used by the default settings: `Ext0`.
pub const GLITCH_GPIO: u8 = 9;

/// Power cycle output used by [`power_cycle_settings()`]: `Crowbar`.
pub const POWER_GPIO: u8 = 17;

/// Advances by a fixed step every time it is read.
pub struct FakeClock {
    now: Instant,
    step: Duration,
}

impl FakeClock {
    pub fn new(step: Duration) -> Self {
        FakeClock {
            now: Instant::from_millis(0),
            step,
        }
    }

    pub fn millis() -> Self {
        FakeClock::new(Duration::from_millis(1))
    }

    /// Reads without advancing.
    pub fn peek(&self) -> Instant {
        self.now
    }
}

impl Clock for FakeClock {
    fn now(&mut self) -> Instant {
        let now = self.now;
        self.now += self.step;
        now
    }
}

/// Capture which fills its buffer with a ramp and counts calls.
#[derive(Debug, Default)]
pub struct RecordingCapture {
    pub sample_count: u32,
    pub prepared: u32,
    pub captured: u32,
    pub samples: Vec<u8>,
}

impl Capture for RecordingCapture {
    fn configure(&mut self, sample_count: u32) {
        self.sample_count = sample_count;
    }

    fn prepare_capture(&mut self) {
        self.prepared += 1;
    }

    fn run_capture(&mut self) {
        self.captured += 1;
        self.samples = (0..self.sample_count).map(|i| i as u8).collect();
    }

    fn samples(&self) -> &[u8] {
        &self.samples
    }
}

/// Indicator which records every change.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    pub ready: bool,
    pub triggered: bool,
    pub changes: Vec<(&'static str, bool)>,
}

impl Indicator for RecordingIndicator {
    fn set_ready(&mut self, on: bool) {
        self.ready = on;
        self.changes.push(("ready", on));
    }

    fn set_triggered(&mut self, on: bool) {
        self.triggered = on;
        self.changes.push(("triggered", on));
    }
}

pub type TestGlitcher = Glitcher<SimLane, RecordingCapture, RecordingIndicator>;

pub fn glitcher(lane: SimLane) -> TestGlitcher {
    Glitcher::new(lane, RecordingCapture::default(), RecordingIndicator::default())
}

pub fn edge_settings(delay: u32, pulse: u32) -> GlitcherSettings {
    GlitcherSettings {
        trigger_type: TriggerType::RisingEdge,
        trigger_pull: TriggerPull::PullDown,
        delay_cycles: delay,
        pulse_width_cycles: pulse,
        ..Default::default()
    }
}

pub fn power_cycle_settings(length: u32, delay: u32, pulse: u32) -> GlitcherSettings {
    GlitcherSettings {
        power_cycle_output: GlitchOutput::Crowbar,
        power_cycle_length: length,
        ..edge_settings(delay, pulse)
    }
}

pub fn rising_lane(edge: u64) -> SimLane {
    SimLane::new(Stimulus::rising_at(edge)).with_cycles_per_call(64)
}
