// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cycle timing of compiled glitch programs, run on the simulated lane.

mod common;

use common::{
    FakeClock, GLITCH_GPIO, POWER_GPIO, edge_settings, glitcher, power_cycle_settings,
    rising_lane,
};
use faultier_core::{GlitchOutput, GlitcherSettings, TriggerType};
use faultier_pio::sim::{SimLane, Stimulus};
use faultier_pio::{LaneState, Phase, RunResult, Signal};

fn run_to_completion(lane: SimLane, settings: &GlitcherSettings) -> SimLane {
    let mut glitcher = glitcher(lane);
    glitcher.configure(settings).unwrap();
    let result = glitcher.run_blocking(&mut FakeClock::millis(), || {});
    assert_eq!(result, Ok(RunResult::Ok));
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
    assert_eq!(glitcher.phase(), Phase::Idle);
    assert_eq!(glitcher.lane().fault(), None);
    glitcher.into_lane()
}

#[test]
fn rising_edge_glitch() {
    let lane = run_to_completion(rising_lane(500), &edge_settings(1000, 100));

    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(500));
    assert_eq!(lane.marker_cycle(Signal::Glitched), Some(1600));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((1500, 1600)));
    assert_eq!(lane.pin_edges(GLITCH_GPIO).len(), 2);
}

#[test]
fn delay_and_pulse_width_are_exact() {
    for (edge, delay, pulse) in [(10, 7, 2), (37, 50, 3), (200, 4096, 1000), (3, 123, 45)] {
        let lane = run_to_completion(rising_lane(edge), &edge_settings(delay, pulse));

        let triggered = lane.marker_cycle(Signal::Triggered).unwrap();
        assert_eq!(triggered, edge);
        let start = triggered + delay as u64;
        let end = start + pulse as u64;
        assert_eq!(
            lane.high_window(GLITCH_GPIO),
            Some((start, end)),
            "delay {delay} pulse {pulse}"
        );
        assert_eq!(lane.marker_cycle(Signal::Glitched), Some(end));
    }
}

#[test]
fn delay_without_glitch_output() {
    let settings = GlitcherSettings {
        glitch_output: GlitchOutput::None,
        ..edge_settings(1000, 100)
    };
    let lane = run_to_completion(rising_lane(500), &settings);

    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(500));
    assert_eq!(lane.marker_cycle(Signal::Glitched), Some(1500));
    assert!(lane.pin_edges(GLITCH_GPIO).is_empty());
}

#[test]
fn power_cycle_precedes_trigger() {
    let lane = run_to_completion(rising_lane(1000), &power_cycle_settings(200, 100, 10));

    assert_eq!(lane.high_window(POWER_GPIO), Some((3, 203)));
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(1000));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((1100, 1110)));
}

#[test]
fn level_triggers() {
    let high = GlitcherSettings {
        trigger_type: TriggerType::High,
        ..edge_settings(100, 10)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::rising_at(300)).with_cycles_per_call(64),
        &high,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(300));

    let low = GlitcherSettings {
        trigger_type: TriggerType::Low,
        ..edge_settings(100, 10)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::falling_at(300)).with_cycles_per_call(64),
        &low,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(300));

    // Already at the level, so triggers immediately
    let lane = run_to_completion(
        SimLane::new(Stimulus::constant(true)).with_cycles_per_call(64),
        &high,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(1));
}

#[test]
fn falling_edge_trigger() {
    let settings = GlitcherSettings {
        trigger_type: TriggerType::FallingEdge,
        ..edge_settings(100, 10)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::falling_at(250)).with_cycles_per_call(64),
        &settings,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(250));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((350, 360)));
}

#[test]
fn pulse_triggers_fire_at_pulse_end() {
    let positive = GlitcherSettings {
        trigger_type: TriggerType::PulsePositive,
        ..edge_settings(100, 10)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::pulse(100, 50, true)).with_cycles_per_call(64),
        &positive,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(150));

    let negative = GlitcherSettings {
        trigger_type: TriggerType::PulseNegative,
        ..edge_settings(100, 10)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::pulse(100, 50, false)).with_cycles_per_call(64),
        &negative,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(150));
}

#[test]
fn no_trigger_glitches_immediately() {
    let settings = GlitcherSettings {
        trigger_type: TriggerType::None,
        ..edge_settings(500, 20)
    };
    let lane = run_to_completion(
        SimLane::new(Stimulus::constant(false)).with_cycles_per_call(64),
        &settings,
    );
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(0));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((500, 520)));
}

#[test]
fn short_delay_is_clamped() {
    // Shorter than the delay block itself
    let lane = run_to_completion(rising_lane(100), &edge_settings(2, 100));
    assert_eq!(lane.marker_cycle(Signal::Triggered), Some(100));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((107, 207)));
}

#[test]
fn single_cycle_pulse_is_widened() {
    // The pulse block cannot drive the line for less than 2 cycles
    let lane = run_to_completion(rising_lane(100), &edge_settings(50, 1));
    assert_eq!(lane.high_window(GLITCH_GPIO), Some((150, 152)));
    assert_eq!(lane.marker_cycle(Signal::Glitched), Some(152));
}
