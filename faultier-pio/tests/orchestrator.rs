// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Glitcher lifecycle, timeouts and error handling.

mod common;

use core::task::Poll;

use common::{
    FakeClock, GLITCH_GPIO, TRIGGER_GPIO, edge_settings, glitcher, power_cycle_settings,
    rising_lane,
};
use embassy_futures::block_on;
use faultier_core::{
    CaptureSettings, ConfigError, GlitcherSettings, TriggerPull, TriggerSource, TriggerType,
};
use faultier_pio::lane::{LaneConfig, PadMode};
use faultier_pio::pins::Role;
use faultier_pio::sim::{SimLane, Stimulus};
use faultier_pio::{
    BindError, Clock, CompileError, GlitchError, Lane, LaneState, Phase, RunResult, Signal,
    Timeouts,
};

fn idle_snapshot() -> faultier_pio::sim::SimSnapshot {
    SimLane::default().snapshot()
}

#[test]
fn trigger_timeout_leaves_lane_idle() {
    let lane = SimLane::new(Stimulus::constant(false)).with_cycles_per_call(64);
    let mut glitcher = glitcher(lane);
    let settings = GlitcherSettings {
        trigger_timeout_ms: Some(50),
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let mut clock = FakeClock::millis();
    let result = glitcher.run_blocking(&mut clock, || {});
    assert_eq!(result, Ok(RunResult::TriggerTimeout));

    // Armed at 0ms, and the poll at 50ms finds the deadline passed
    assert_eq!(clock.peek().as_millis(), 51);
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
    assert_eq!(glitcher.phase(), Phase::Idle);
    assert_eq!(glitcher.lane().snapshot(), idle_snapshot());
    assert_eq!(glitcher.lane().marker_cycle(Signal::Triggered), None);

    assert_eq!(glitcher.capture().prepared, 1);
    assert_eq!(glitcher.capture().captured, 0);
    assert!(!glitcher.indicator().ready);
    assert!(!glitcher.indicator().triggered);
}

#[test]
fn trigger_just_before_disable_is_not_a_timeout() {
    // The lane only runs while being disabled, so the trigger can only be
    // seen by the check after the deadline
    let lane = SimLane::new(Stimulus::rising_at(500))
        .with_cycles_per_call(0)
        .with_disable_latency(600);
    let mut glitcher = glitcher(lane);
    let settings = GlitcherSettings {
        trigger_timeout_ms: Some(10),
        completion_timeout_ms: Some(10),
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let result = glitcher.run_blocking(&mut FakeClock::millis(), || {});
    assert_eq!(result, Ok(RunResult::Ok));
    assert_eq!(glitcher.capture().captured, 1);
    assert_eq!(glitcher.lane().marker_cycle(Signal::Triggered), Some(500));
    assert_eq!(glitcher.lane().marker_cycle(Signal::Glitched), None);
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
    assert_eq!(glitcher.lane().snapshot(), idle_snapshot());
}

// Returns a disabled lane with both signals left raised by a previous program.
fn lane_with_stale_signals(stimulus: Stimulus) -> SimLane {
    let mut lane = SimLane::new(stimulus).with_cycles_per_call(64);
    // irq 0; irq 1; jmp 2
    for (slot, word) in [0xC000u16, 0xC001, 0x0002].iter().enumerate() {
        lane.write_instruction(slot as u8, *word);
    }
    lane.configure(&LaneConfig {
        wrap_source: 31,
        ..Default::default()
    });
    lane.set_enabled(true);
    lane.run_for(4);
    lane.set_enabled(false);
    lane.reset();
    assert!(lane.signal(Signal::Triggered));
    assert!(lane.signal(Signal::Glitched));
    lane
}

#[test]
fn stale_signals_do_not_trigger_a_run() {
    let mut glitcher = glitcher(lane_with_stale_signals(Stimulus::constant(false)));
    let settings = GlitcherSettings {
        trigger_timeout_ms: Some(20),
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let result = glitcher.run_blocking(&mut FakeClock::millis(), || {});
    assert_eq!(result, Ok(RunResult::TriggerTimeout));
    assert_eq!(glitcher.capture().captured, 0);
    assert_eq!(glitcher.lane().snapshot(), idle_snapshot());
}

#[test]
fn stale_signals_do_not_end_a_run_early() {
    let mut glitcher = glitcher(lane_with_stale_signals(Stimulus::rising_at(500)));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();

    let result = glitcher.run_blocking(&mut FakeClock::millis(), || {});
    assert_eq!(result, Ok(RunResult::Ok));
    assert_eq!(glitcher.lane().marker_cycle(Signal::Triggered), Some(500));
    assert_eq!(glitcher.lane().marker_cycle(Signal::Glitched), Some(1600));
    assert_eq!(glitcher.lane().high_window(GLITCH_GPIO), Some((1500, 1600)));
}

#[test]
fn signals_raised_while_disabling_are_cleared() {
    // The lane keeps running while being disabled, long enough to finish
    let lane = SimLane::new(Stimulus::rising_at(500))
        .with_cycles_per_call(0)
        .with_disable_latency(2000);
    let mut glitcher = glitcher(lane);
    let settings = GlitcherSettings {
        trigger_timeout_ms: Some(10),
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let mut clock = FakeClock::millis();
    glitcher.arm(clock.now()).unwrap();
    assert_eq!(glitcher.poll(clock.now()), Poll::Pending);
    glitcher.abort();
    assert_eq!(glitcher.lane().marker_cycle(Signal::Triggered), Some(500));
    assert_eq!(glitcher.lane().marker_cycle(Signal::Glitched), Some(1600));
    assert_eq!(glitcher.lane().snapshot(), idle_snapshot());

    // The next run must wait for its own trigger
    let mut lane = glitcher.into_lane().with_cycles_per_call(64);
    lane.set_stimulus(Stimulus::constant(false));
    let mut glitcher = common::glitcher(lane);
    glitcher.configure(&settings).unwrap();
    assert_eq!(
        glitcher.run_blocking(&mut clock, || {}),
        Ok(RunResult::TriggerTimeout)
    );
    assert_eq!(glitcher.capture().captured, 0);
}

#[test]
fn rearming_gives_identical_runs() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();
    let mut clock = FakeClock::millis();

    assert_eq!(glitcher.run_blocking(&mut clock, || {}), Ok(RunResult::Ok));
    let first_trace = glitcher.lane().trace().to_vec();
    let first_snapshot = glitcher.lane().snapshot();

    assert_eq!(glitcher.run_blocking(&mut clock, || {}), Ok(RunResult::Ok));
    assert_eq!(glitcher.lane().trace(), first_trace.as_slice());
    assert_eq!(glitcher.lane().snapshot(), first_snapshot);
    assert_eq!(first_snapshot, idle_snapshot());
    assert_eq!(glitcher.runs(), 2);
}

#[test]
fn unsupported_trigger_touches_nothing() {
    let mut glitcher = glitcher(rising_lane(500));
    let settings = GlitcherSettings {
        trigger_type: TriggerType::Unsupported(9),
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let result = glitcher.run_blocking(&mut FakeClock::millis(), || {});
    assert_eq!(
        result,
        Err(GlitchError::Compile(CompileError::UnsupportedTrigger(9)))
    );
    assert_eq!(glitcher.lane().mutations(), 0);
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
    assert_eq!(glitcher.phase(), Phase::Idle);
    assert!(!glitcher.is_active());
    assert!(glitcher.indicator().changes.is_empty());
}

#[test]
fn pin_conflict_touches_nothing() {
    let mut glitcher = glitcher(rising_lane(500));
    let settings = GlitcherSettings {
        trigger_source: TriggerSource::Ext0,
        ..edge_settings(1000, 100)
    };
    glitcher.configure(&settings).unwrap();

    let result = glitcher.arm(FakeClock::millis().peek());
    assert_eq!(
        result,
        Err(GlitchError::Bind(BindError::Conflict {
            gpio: GLITCH_GPIO,
            first: Role::Trigger,
            second: Role::Glitch,
        }))
    );
    assert_eq!(glitcher.lane().mutations(), 0);
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
}

#[test]
fn oversized_sample_count_is_rejected() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher
        .configure_capture(&CaptureSettings { sample_count: 1200 })
        .unwrap();

    let result = glitcher.configure_capture(&CaptureSettings {
        sample_count: 30001,
    });
    assert_eq!(
        result,
        Err(GlitchError::Config(ConfigError::SampleCount(30001)))
    );
    assert_eq!(glitcher.configuration().adc_sample_count, 1200);
    assert_eq!(glitcher.capture().sample_count, 1200);
}

#[test]
fn capture_runs_once_triggered() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();
    glitcher.set_adc_sample_count(64).unwrap();

    assert_eq!(
        glitcher.run_blocking(&mut FakeClock::millis(), || {}),
        Ok(RunResult::Ok)
    );
    assert_eq!(glitcher.capture().prepared, 1);
    assert_eq!(glitcher.capture().captured, 1);
    assert_eq!(glitcher.capture().samples.len(), 64);
}

#[test]
fn indicators_follow_the_run() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();
    glitcher
        .run_blocking(&mut FakeClock::millis(), || {})
        .unwrap();

    assert_eq!(
        glitcher.indicator().changes,
        [
            ("ready", true),
            ("triggered", true),
            ("ready", false),
            ("triggered", false),
        ]
    );
}

#[test]
fn arming_configures_lane() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&power_cycle_settings(200, 100, 10)).unwrap();
    glitcher.arm(FakeClock::millis().peek()).unwrap();

    assert_eq!(glitcher.phase(), Phase::WaitingForTrigger);
    assert_eq!(glitcher.lane_state(), LaneState::Running);
    assert!(glitcher.indicator().ready);

    let lane = glitcher.lane();
    assert!(lane.is_enabled());
    // Power cycle length, delay, and pulse width
    assert_eq!(lane.fifo_len(), 3);
    assert_eq!(
        lane.pad(TRIGGER_GPIO),
        Some(PadMode::Input(TriggerPull::PullDown))
    );
    assert_eq!(lane.pad(GLITCH_GPIO), Some(PadMode::Output));
    assert_eq!(lane.pad(common::POWER_GPIO), Some(PadMode::Output));

    let loaded = glitcher.loaded().unwrap();
    assert_eq!(loaded.offset, 0);
    assert_eq!(loaded.config.in_base, Some(TRIGGER_GPIO));
    assert_eq!(loaded.config.set_base, Some(GLITCH_GPIO));
    assert_eq!(loaded.config.out_base, Some(common::POWER_GPIO));
}

#[test]
fn busy_while_armed() {
    let mut glitcher = glitcher(SimLane::new(Stimulus::constant(false)));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();

    let mut clock = FakeClock::millis();
    assert_eq!(glitcher.poll(clock.peek()), Poll::Ready(Err(GlitchError::NotArmed)));

    glitcher.arm(clock.now()).unwrap();
    assert_eq!(glitcher.poll(clock.now()), Poll::Pending);
    assert_eq!(
        glitcher.configure(&GlitcherSettings::default()),
        Err(GlitchError::Busy)
    );
    assert_eq!(glitcher.set_adc_sample_count(10), Err(GlitchError::Busy));
    assert_eq!(glitcher.set_timeouts(Timeouts::default()), Err(GlitchError::Busy));
    assert_eq!(glitcher.arm(clock.now()), Err(GlitchError::Busy));

    glitcher.abort();
    assert_eq!(glitcher.phase(), Phase::Idle);
    assert_eq!(glitcher.lane_state(), LaneState::Idle);
    assert_eq!(glitcher.lane().snapshot(), idle_snapshot());
    assert!(glitcher.configure(&GlitcherSettings::default()).is_ok());
}

#[test]
fn async_run() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();

    let mut clock = FakeClock::millis();
    let result = block_on(glitcher.run(&mut clock));
    assert_eq!(result, Ok(RunResult::Ok));
    assert_eq!(glitcher.lane().marker_cycle(Signal::Glitched), Some(1600));
}

#[test]
fn service_runs_between_polls() {
    let mut glitcher = glitcher(rising_lane(500));
    glitcher.configure(&edge_settings(1000, 100)).unwrap();

    let mut serviced = 0;
    glitcher
        .run_blocking(&mut FakeClock::millis(), || serviced += 1)
        .unwrap();
    assert!(serviced > 0);
}

#[test]
fn configured_timeouts_are_kept() {
    let mut glitcher = glitcher(SimLane::default());
    let settings = GlitcherSettings {
        trigger_timeout_ms: Some(250),
        ..Default::default()
    };
    glitcher.configure(&settings).unwrap();
    assert_eq!(glitcher.timeouts().trigger.as_millis(), 250);
    assert_eq!(glitcher.timeouts().completion.as_millis(), 3000);

    // Absent timeouts leave the current values alone
    glitcher.configure(&GlitcherSettings::default()).unwrap();
    assert_eq!(glitcher.timeouts().trigger.as_millis(), 250);
}
