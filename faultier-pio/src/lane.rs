// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Lane hardware abstraction
//!
//! A lane is a single PIO state machine together with the instruction memory
//! and GPIO pads it uses.  The [`Lane`] trait is the only way the rest of
//! `faultier-pio` touches hardware.  Firmware implements it over the RP2040
//! PIO registers, and [`crate::sim::SimLane`] implements it in software.

use faultier_core::TriggerPull;

/// Number of instruction slots in a PIO block.
pub const INSTRUCTION_MEMORY_SIZE: usize = 32;

/// Depth of the state machine TX FIFO.
pub const TX_FIFO_DEPTH: usize = 4;

/// Number of user GPIOs.
pub const NUM_GPIOS: usize = 30;

/// Signal flags raised by a running glitch program.  The discriminant is the
/// PIO IRQ flag index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    /// Trigger condition seen, delay starting.
    Triggered = 0,

    /// Glitch pulse (or delay, if there is no pulse) complete.
    Glitched = 1,
}

impl Signal {
    pub fn irq_index(self) -> u8 {
        self as u8
    }
}

/// Electrical configuration of a GPIO pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Lane input with the given pull.
    Input(TriggerPull),

    /// Lane output, initially driven low.
    Output,
}

/// State machine configuration written by the loader.
///
/// Each pin group is one pin wide.  A `None` group is left unconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneConfig {
    /// Absolute instruction address execution starts at.
    pub entry: u8,
    pub wrap_target: u8,
    pub wrap_source: u8,

    /// `wait pin` and `mov x, pins` source.
    pub in_base: Option<u8>,

    /// `set pins` destination.
    pub set_base: Option<u8>,

    /// `out pins` and `mov pins` destination.
    pub out_base: Option<u8>,
}

/// Hardware operations required to run a glitch program.
///
/// Implementations must not block, except where stated.
pub trait Lane {
    /// Returns a bitmask of the occupied instruction slots.
    fn used_instructions(&self) -> u32;

    /// Writes a single, already relocated, instruction.
    fn write_instruction(&mut self, slot: u8, word: u16);

    /// Frees every instruction slot.
    fn clear_instructions(&mut self);

    fn configure_pad(&mut self, gpio: u8, mode: PadMode);

    /// Returns a pad to its reset state: input, no pulls, not driven.
    fn release_pad(&mut self, gpio: u8);

    /// Applies `config` and moves the program counter to `config.entry`.
    /// The lane must be disabled.
    fn configure(&mut self, config: &LaneConfig);

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Pushes a word onto the TX FIFO.  Returns false if the FIFO is full.
    fn try_push(&mut self, value: u32) -> bool;

    /// Returns whether `signal` is raised.
    fn signal(&mut self, signal: Signal) -> bool;

    fn clear_signal(&mut self, signal: Signal);

    /// Clears the FIFOs and internal registers.  Signals are left as they
    /// are.  The lane must be disabled.
    fn reset(&mut self);
}

/// Lifecycle of the owned lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneState {
    /// Nothing loaded.
    Idle,

    /// Program resident and configured, not enabled.
    Loaded,

    /// Enabled, parameters not yet all pushed.
    Armed,

    /// Enabled with all parameters pushed.
    Running,

    /// The given signal has been observed.
    Signaled(Signal),
}

/// Sole owner of a [`Lane`], tracking its lifecycle.
///
/// Only [`crate::Glitcher`] and the loader change the state.
pub struct OwnedLane<L: Lane> {
    lane: L,
    state: LaneState,
}

impl<L: Lane> OwnedLane<L> {
    /// Takes ownership of `lane`, which must not be running a program.
    pub fn new(lane: L) -> Self {
        OwnedLane {
            lane,
            state: LaneState::Idle,
        }
    }

    pub fn state(&self) -> LaneState {
        self.state
    }

    pub fn lane(&self) -> &L {
        &self.lane
    }

    pub fn into_inner(self) -> L {
        self.lane
    }

    pub(crate) fn lane_mut(&mut self) -> &mut L {
        &mut self.lane
    }

    pub(crate) fn set_state(&mut self, state: LaneState) {
        self.state = state;
    }
}
