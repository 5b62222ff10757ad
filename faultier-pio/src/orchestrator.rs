// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Glitch run orchestration
//!
//! A run goes through the following phases:
//!
//! ```text
//! Idle -> Compiling -> Loaded -> Armed -> WaitingForTrigger
//!     -> Triggered -> WaitingForCompletion -> Completed -> Idle
//!     -> TriggerTimedOut -> Triggered (late) -> ...
//!                        -> Aborted -> Idle
//! ```
//!
//! [`Glitcher::arm()`] runs everything up to `WaitingForTrigger` and returns
//! immediately.  [`Glitcher::poll()`] then advances the run by at most one
//! step without blocking (other than [`Capture::run_capture()`]), so the
//! caller can service other duties between polls.  [`Glitcher::run()`] and
//! [`Glitcher::run_blocking()`] wrap the two.

use core::task::Poll;
use embassy_futures::yield_now;
use embassy_time::{Duration, Instant};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use faultier_core::{CaptureSettings, GlitchConfiguration, GlitcherSettings};

use crate::capture::{Capture, Indicator};
use crate::compiler::compile;
use crate::lane::{Lane, LaneState, OwnedLane, Signal};
use crate::loader::{self, LoadedLane};
use crate::params::ParameterChannel;
use crate::pins::PinBinding;
use crate::program::ParameterKind;
use crate::{Clock, GlitchError};

/// Default time allowed for the trigger condition to occur.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(1);

/// Default time allowed, after triggering, for the glitch to complete.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded waits used by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Expiry is reported as [`RunResult::TriggerTimeout`].
    pub trigger: Duration,

    /// Expiry is logged, and the run still reports [`RunResult::Ok`].
    pub completion: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            trigger: DEFAULT_TRIGGER_TIMEOUT,
            completion: DEFAULT_COMPLETION_TIMEOUT,
        }
    }
}

/// Outcome of a glitch run which got as far as arming the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Ok,
    TriggerTimeout,
}

/// Orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Compiling,
    Loaded,
    Armed,
    WaitingForTrigger,
    Triggered { late: bool },
    TriggerTimedOut,
    WaitingForCompletion,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRun {
    binding: PinBinding,
    loaded: LoadedLane,

    // Trigger deadline while waiting for the trigger.  Completion deadline,
    // set on the first completion poll, afterwards.
    deadline: Option<Instant>,
}

/// Owns the lane, the active configuration, and the collaborators, and runs
/// glitches.
pub struct Glitcher<L: Lane, C: Capture = (), I: Indicator = ()> {
    lane: OwnedLane<L>,
    capture: C,
    indicator: I,
    config: GlitchConfiguration,
    timeouts: Timeouts,
    phase: Phase,
    run: Option<ActiveRun>,
    runs: u32,
}

impl<L: Lane, C: Capture, I: Indicator> Glitcher<L, C, I> {
    /// Creates a glitcher with the default configuration and timeouts.
    pub fn new(lane: L, capture: C, indicator: I) -> Self {
        Glitcher {
            lane: OwnedLane::new(lane),
            capture,
            indicator,
            config: GlitchConfiguration::default(),
            timeouts: Timeouts::default(),
            phase: Phase::Idle,
            run: None,
            runs: 0,
        }
    }

    pub fn configuration(&self) -> &GlitchConfiguration {
        &self.config
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lane_state(&self) -> LaneState {
        self.lane.state()
    }

    pub fn lane(&self) -> &L {
        self.lane.lane()
    }

    /// Releases the lane.  Any run in progress is abandoned first.
    pub fn into_lane(mut self) -> L {
        self.abort();
        self.lane.into_inner()
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Number of runs which reached a result.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn is_active(&self) -> bool {
        self.run.is_some()
    }

    /// Where the active run's program was loaded.
    pub fn loaded(&self) -> Option<LoadedLane> {
        self.run.map(|run| run.loaded)
    }

    /// Replaces the glitch configuration.  The sample count is retained.
    ///
    /// Returns:
    /// - `Ok(())`: If the settings were applied.
    /// - `Err(GlitchError::Busy)`: If a run is in progress.
    pub fn configure(&mut self, settings: &GlitcherSettings) -> Result<(), GlitchError> {
        self.check_idle()?;
        self.config.apply_settings(settings);
        if let Some(ms) = settings.trigger_timeout_ms {
            self.timeouts.trigger = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = settings.completion_timeout_ms {
            self.timeouts.completion = Duration::from_millis(ms as u64);
        }
        info!("OK:    Glitcher configured {}", self.config);
        Ok(())
    }

    /// Validates and applies capture settings.
    ///
    /// Returns:
    /// - `Ok(())`: If the settings were applied.
    /// - `Err(GlitchError::Config)`: If the sample count is too large.  The
    ///   previous count is retained.
    /// - `Err(GlitchError::Busy)`: If a run is in progress.
    pub fn configure_capture(&mut self, settings: &CaptureSettings) -> Result<(), GlitchError> {
        self.set_adc_sample_count(settings.sample_count)
    }

    pub fn set_adc_sample_count(&mut self, count: u32) -> Result<(), GlitchError> {
        self.check_idle()?;
        self.config.set_adc_sample_count(count).inspect_err(|e| {
            warn!("Error: {e}");
        })?;
        self.capture.configure(count);
        info!("OK:    Sample count {count}");
        Ok(())
    }

    pub fn set_timeouts(&mut self, timeouts: Timeouts) -> Result<(), GlitchError> {
        self.check_idle()?;
        self.timeouts = timeouts;
        Ok(())
    }

    /// Compiles the active configuration, loads and enables the lane, and
    /// pushes the run parameters.
    ///
    /// Compilation and pin resolution happen before the lane is touched, so
    /// an error from either leaves the hardware as it was.
    ///
    /// Returns:
    /// - `Ok(())`: The lane is waiting for the trigger.  Call
    ///   [`Self::poll()`] until it is ready.
    /// - `Err(GlitchError)`: The run did not start.  The lane is idle.
    pub fn arm(&mut self, now: Instant) -> Result<(), GlitchError> {
        self.check_idle()?;
        info!("Exec:  Arming glitcher {}", self.config);

        self.phase = Phase::Compiling;
        let prepared = compile(&self.config)
            .map_err(GlitchError::from)
            .and_then(|program| Ok((program, PinBinding::resolve(&self.config)?)));
        let (program, binding) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Error: Glitcher not armed: {e}");
                self.phase = Phase::Idle;
                return Err(e);
            }
        };
        debug!("Value: Program is {} instructions", program.len());

        let hw = self.lane.lane_mut();
        hw.clear_instructions();
        binding.apply(hw);
        let loaded = match loader::load(&mut self.lane, &program, &binding) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Error: Glitcher not armed: {e}");
                self.teardown(&binding);
                return Err(e.into());
            }
        };
        self.phase = Phase::Loaded;

        // IRQ flags survive a state machine restart
        let hw = self.lane.lane_mut();
        hw.clear_signal(Signal::Triggered);
        hw.clear_signal(Signal::Glitched);
        hw.set_enabled(true);
        self.lane.set_state(LaneState::Armed);
        self.phase = Phase::Armed;
        self.indicator.set_ready(true);

        let mut params = ParameterChannel::new(self.lane.lane_mut());
        if let Some(parameter) = program.parameter(ParameterKind::PowerCycleLength) {
            params.push_cycles(&parameter, self.config.power_cycle_length);
        }
        if let Some(parameter) = program.parameter(ParameterKind::Delay) {
            params.push_cycles(&parameter, self.config.delay_cycles);
        }
        self.capture.prepare_capture();
        if let Some(parameter) = program.parameter(ParameterKind::PulseWidth) {
            params.push_cycles(&parameter, self.config.pulse_width_cycles);
        }
        trace!("Value: Pushed {} parameters", params.pushed());

        self.lane.set_state(LaneState::Running);
        self.phase = Phase::WaitingForTrigger;
        self.run = Some(ActiveRun {
            binding,
            loaded,
            deadline: Some(now + self.timeouts.trigger),
        });
        debug!("OK:    Glitcher armed at offset {}", loaded.offset);
        Ok(())
    }

    /// Advances an armed run by at most one step.
    ///
    /// Returns:
    /// - `Poll::Pending`: The run is still in progress.
    /// - `Poll::Ready(Ok(RunResult))`: The run finished and the lane is idle.
    /// - `Poll::Ready(Err(GlitchError::NotArmed))`: There is no run.
    pub fn poll(&mut self, now: Instant) -> Poll<Result<RunResult, GlitchError>> {
        let Some(run) = self.run else {
            return Poll::Ready(Err(GlitchError::NotArmed));
        };

        match self.phase {
            Phase::WaitingForTrigger => self.poll_trigger(run, now),
            Phase::WaitingForCompletion => self.poll_completion(run, now),
            phase => {
                // Every other phase is passed through within a single call
                error!("Error: Glitcher run in unexpected phase {phase:?}");
                self.abort();
                Poll::Ready(Err(GlitchError::NotArmed))
            }
        }
    }

    /// Arms, then polls until the run is complete, calling `service` between
    /// polls.
    pub fn run_blocking<K: Clock>(
        &mut self,
        clock: &mut K,
        mut service: impl FnMut(),
    ) -> Result<RunResult, GlitchError> {
        self.arm(clock.now())?;
        loop {
            if let Poll::Ready(result) = self.poll(clock.now()) {
                return result;
            }
            service();
        }
    }

    /// Arms, then polls until the run is complete, yielding to the executor
    /// between polls.
    pub async fn run<K: Clock>(&mut self, clock: &mut K) -> Result<RunResult, GlitchError> {
        self.arm(clock.now())?;
        loop {
            if let Poll::Ready(result) = self.poll(clock.now()) {
                return result;
            }
            yield_now().await;
        }
    }

    /// Abandons any run in progress, returning the lane to idle.
    pub fn abort(&mut self) {
        if let Some(run) = self.run {
            info!("Note:  Glitch run aborted");
            self.phase = Phase::Aborted;
            self.teardown(&run.binding);
        }
    }
}

// Internal Glitcher methods
impl<L: Lane, C: Capture, I: Indicator> Glitcher<L, C, I> {
    fn check_idle(&self) -> Result<(), GlitchError> {
        if self.run.is_some() {
            Err(GlitchError::Busy)
        } else {
            Ok(())
        }
    }

    fn poll_trigger(&mut self, run: ActiveRun, now: Instant) -> Poll<Result<RunResult, GlitchError>> {
        if self.lane.lane_mut().signal(Signal::Triggered) {
            self.triggered(false);
            return Poll::Pending;
        }

        match run.deadline {
            Some(deadline) if now < deadline => return Poll::Pending,
            _ => {}
        }

        // The trigger may fire between the last check and the lane being
        // disabled, so check once more afterwards.
        self.phase = Phase::TriggerTimedOut;
        self.lane.lane_mut().set_enabled(false);
        if self.lane.lane_mut().signal(Signal::Triggered) {
            info!("Note:  Trigger seen after timeout");
            self.triggered(true);
            return Poll::Pending;
        }

        warn!(
            "Error: Trigger timed out after {}ms",
            self.timeouts.trigger.as_millis()
        );
        self.phase = Phase::Aborted;
        self.teardown(&run.binding);
        self.runs += 1;
        Poll::Ready(Ok(RunResult::TriggerTimeout))
    }

    fn poll_completion(
        &mut self,
        run: ActiveRun,
        now: Instant,
    ) -> Poll<Result<RunResult, GlitchError>> {
        let deadline = match run.deadline {
            Some(deadline) => deadline,
            None => {
                let deadline = now + self.timeouts.completion;
                self.run = Some(ActiveRun {
                    deadline: Some(deadline),
                    ..run
                });
                deadline
            }
        };

        if self.lane.lane_mut().signal(Signal::Glitched) {
            self.lane.set_state(LaneState::Signaled(Signal::Glitched));
            debug!("OK:    Glitch complete");
        } else if now >= deadline {
            // Not reported to the caller
            warn!(
                "Note:  Glitch completion timed out after {}ms",
                self.timeouts.completion.as_millis()
            );
        } else {
            return Poll::Pending;
        }

        self.phase = Phase::Completed;
        self.teardown(&run.binding);
        self.runs += 1;
        info!("OK:    Glitch run complete");
        Poll::Ready(Ok(RunResult::Ok))
    }

    fn triggered(&mut self, late: bool) {
        self.phase = Phase::Triggered { late };
        self.lane.set_state(LaneState::Signaled(Signal::Triggered));
        info!("OK:    Triggered");

        self.capture.run_capture();
        self.lane.lane_mut().clear_signal(Signal::Triggered);
        self.indicator.set_triggered(true);

        self.phase = Phase::WaitingForCompletion;
        if let Some(run) = self.run.as_mut() {
            run.deadline = None;
        }
    }

    // Returns the lane, pads, and indicators to their idle state.
    fn teardown(&mut self, binding: &PinBinding) {
        debug!("Exec:  Glitcher teardown");
        let hw = self.lane.lane_mut();
        // Disable first, so a running lane cannot raise a flag once cleared
        hw.set_enabled(false);
        hw.clear_signal(Signal::Triggered);
        hw.clear_signal(Signal::Glitched);
        hw.reset();
        hw.clear_instructions();
        binding.release(hw);

        self.indicator.set_ready(false);
        self.indicator.set_triggered(false);
        self.lane.set_state(LaneState::Idle);
        self.phase = Phase::Idle;
        self.run = None;
    }
}
