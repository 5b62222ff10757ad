// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio library
//!
//! Voltage glitch generation using a single RP2040 PIO state machine.
//!
//! A [`GlitchConfiguration`](faultier_core::GlitchConfiguration) is compiled
//! into a short PIO program which waits for a trigger condition on an input
//! pin, waits a programmed number of cycles, then drives a glitch output for
//! a programmed number of cycles.  Cycle counts are not compiled in.  They
//! are pushed through the state machine's TX FIFO when the program is armed,
//! so the program itself only depends on the shape of the configuration.
//!
//! The following diagram shows the key `faultier-pio` concepts.
//!
//! ```text
//!   faultier firmware   |  bin::Api  ==  UART  ==   Host tooling
//! ----------------------
//!       Glitcher         \
//! ----------------------  \
//!   compile() / load()     |--  GlitchError
//! ----------------------  /
//!   Lane (PIO SM + pads) /
//! ----------------------
//!     RP2040 GPIO pins  >==================<  Glitch target
//!                          trigger / glitch / power
//! ```
//!
//! * [`Glitcher`] owns the lane and runs glitches, racing the trigger
//!   against a timeout.
//! * [`compile()`] turns a configuration into a [`CompiledProgram`].
//! * [`Lane`] is the hardware seam.  The firmware implements it over the PIO
//!   registers, and [`sim::SimLane`] is a cycle-counting software model used
//!   in testing.
//!
//! Also included is a server-side binary API implementation [`bin::Api`],
//! which faultier firmware uses to expose glitching to host tooling over the
//! framing defined in [`faultier_bin`].
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod bin;
pub mod capture;
pub mod compiler;
pub mod lane;
pub mod loader;
pub mod orchestrator;
pub mod params;
pub mod pins;
pub mod program;
pub mod sim;

#[doc(inline)]
pub use crate::capture::{Capture, Indicator};
#[doc(inline)]
pub use crate::compiler::{CompileError, compile};
#[doc(inline)]
pub use crate::lane::{Lane, LaneState, Signal};
#[doc(inline)]
pub use crate::loader::LoadError;
#[doc(inline)]
pub use crate::orchestrator::{Glitcher, Phase, RunResult, Timeouts};
#[doc(inline)]
pub use crate::pins::BindError;
#[doc(inline)]
pub use crate::program::CompiledProgram;

extern crate alloc;
use alloc::string::{String, ToString};
use core::fmt;
use embassy_time::Instant;
use serde::Serialize;

use faultier_core::ConfigError;

/// Source of the current time, used to bound waits within a glitch run.
///
/// Firmware implements this over [`embassy_time::Instant::now()`], and tests
/// over a fake clock.
pub trait Clock {
    fn now(&mut self) -> Instant;
}

/// Error type returned by [`Glitcher`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlitchError {
    /// A configuration change was rejected.
    Config(ConfigError),

    /// The configuration could not be compiled.
    Compile(CompileError),

    /// The configuration could not be bound to pins.
    Bind(BindError),

    /// The compiled program could not be loaded.
    Load(LoadError),

    /// A glitch run is in progress.
    Busy,

    /// There is no glitch run in progress.
    NotArmed,
}

impl GlitchError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            GlitchError::Config(e) => e.as_str(),
            GlitchError::Compile(e) => e.as_str(),
            GlitchError::Bind(e) => e.as_str(),
            GlitchError::Load(e) => e.as_str(),
            GlitchError::Busy => "Glitch in progress",
            GlitchError::NotArmed => "Glitcher not armed",
        }
    }

    /// Returns a message suitable for an error response.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GlitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlitchError::Config(e) => write!(f, "{e}"),
            GlitchError::Compile(e) => write!(f, "{e}"),
            GlitchError::Bind(e) => write!(f, "{e}"),
            GlitchError::Load(e) => write!(f, "{e}"),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl Serialize for GlitchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("GlitchError", 2)?;

        match self {
            GlitchError::Config(e) => {
                state.serialize_field("kind", "config")?;
                state.serialize_field("detail", e)?;
            }
            GlitchError::Compile(e) => {
                state.serialize_field("kind", "compile")?;
                state.serialize_field("detail", e)?;
            }
            GlitchError::Bind(e) => {
                state.serialize_field("kind", "bind")?;
                state.serialize_field("detail", e)?;
            }
            GlitchError::Load(e) => {
                state.serialize_field("kind", "load")?;
                state.serialize_field("detail", e)?;
            }
            GlitchError::Busy => {
                state.serialize_field("kind", "busy")?;
                state.serialize_field("detail", &None::<()>)?;
            }
            GlitchError::NotArmed => {
                state.serialize_field("kind", "not armed")?;
                state.serialize_field("detail", &None::<()>)?;
            }
        }

        state.end()
    }
}

impl From<ConfigError> for GlitchError {
    fn from(e: ConfigError) -> Self {
        GlitchError::Config(e)
    }
}

impl From<CompileError> for GlitchError {
    fn from(e: CompileError) -> Self {
        GlitchError::Compile(e)
    }
}

impl From<BindError> for GlitchError {
    fn from(e: BindError) -> Self {
        GlitchError::Bind(e)
    }
}

impl From<LoadError> for GlitchError {
    fn from(e: LoadError) -> Self {
        GlitchError::Load(e)
    }
}
