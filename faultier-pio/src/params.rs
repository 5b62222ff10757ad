// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Parameter channel

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::lane::Lane;
use crate::program::Parameter;

/// Ordered, write-only queue of runtime values for the running program.
///
/// Values are consumed by the program's `pull` instructions in the order
/// they were pushed, so they must be pushed in the order of
/// [`crate::CompiledProgram::parameters`].
pub struct ParameterChannel<'a, L: Lane> {
    lane: &'a mut L,
    pushed: usize,
}

impl<'a, L: Lane> ParameterChannel<'a, L> {
    pub fn new(lane: &'a mut L) -> Self {
        ParameterChannel { lane, pushed: 0 }
    }

    /// Pushes a raw value, blocking until the lane's FIFO accepts it.
    pub fn push(&mut self, value: u32) {
        while !self.lane.try_push(value) {
            core::hint::spin_loop();
        }
        self.pushed += 1;
        trace!("Value: Pushed parameter {} = {value}", self.pushed);
    }

    /// Pushes the value making `parameter`'s block last `cycles`.
    pub fn push_cycles(&mut self, parameter: &Parameter, cycles: u32) {
        if !parameter.is_exact(cycles) {
            warn!(
                "Note:  {:?} of {cycles} cycles is below the minimum {}",
                parameter.kind, parameter.overhead
            );
        }
        self.push(parameter.encode(cycles));
    }

    /// Number of values pushed through this channel.
    pub fn pushed(&self) -> usize {
        self.pushed
    }
}
