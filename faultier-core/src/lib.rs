// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-core - Core glitch configuration and board concepts used by
//! faultier.
//!
//! Designed to be used in conjunction with the `faultier-pio` library, which
//! compiles a [`GlitchConfiguration`] into a program for a PIO state machine
//! and supervises its execution, and `faultier-bin`, which carries
//! configuration and glitch requests over the wire.
//!
//! This library is `no_std` compatible, and requires an `alloc`
//! implementation.

#![no_std]

pub mod board;
pub mod glitch;

extern crate alloc;
use core::fmt;
use serde::Serialize;
use static_assertions::const_assert;

#[doc(inline)]
pub use crate::glitch::{
    CaptureSettings, GlitchConfiguration, GlitchOutput, GlitcherSettings, TriggerPull,
    TriggerSource, TriggerType,
};

/// Maximum number of analog samples that can be captured per glitch.
pub const MAX_ADC_SAMPLES: u32 = 30000;

// Samples are stored as bytes, and the capture buffer lives in RAM.
const_assert!(MAX_ADC_SAMPLES as usize <= 32 * 1024);

/// Error type returned when a configuration change is rejected.
///
/// A rejected change never alters the previously active configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Requested analog sample count exceeds [`MAX_ADC_SAMPLES`].  The
    /// rejected value is included.
    SampleCount(u32),
}

impl ConfigError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigError::SampleCount(_) => "Sample count exceeds maximum",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SampleCount(count) => {
                write!(f, "{}: {count} > {MAX_ADC_SAMPLES}", self.as_str())
            }
        }
    }
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ConfigError", 2)?;

        let kind = match self {
            ConfigError::SampleCount(_) => "sample count",
        };
        state.serialize_field("kind", kind)?;

        let detail = match self {
            ConfigError::SampleCount(count) => *count,
        };
        state.serialize_field("detail", &detail)?;
        state.end()
    }
}
