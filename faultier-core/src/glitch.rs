// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Glitch configuration objects.
//!
//! [`GlitchConfiguration`] is the complete, immutable description of one
//! glitch run.  It is built up from [`GlitcherSettings`] (the "configure
//! glitcher" request) and [`CaptureSettings`] (the "configure capture"
//! request).

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoStaticStr};

use crate::{ConfigError, MAX_ADC_SAMPLES};

/// Condition on the trigger input which starts the glitch timing.
///
/// The numeric values are those used on the wire.  Values this firmware
/// does not recognise are kept as [`TriggerType::Unsupported`] so that they
/// are rejected when the program is compiled, rather than silently mapped to
/// a different trigger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, IntoStaticStr, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerType {
    /// No trigger - the glitch timing starts as soon as the lane is armed.
    #[default]
    None,

    /// Input is high.
    High,

    /// Input is low.
    Low,

    /// Input goes from low to high.
    RisingEdge,

    /// Input goes from high to low.
    FallingEdge,

    /// A complete positive pulse: low, high, then low again.
    PulsePositive,

    /// A complete negative pulse: high, low, then high again.
    PulseNegative,

    /// An unrecognised trigger value.
    Unsupported(u8),
}

impl TriggerType {
    /// All trigger types the program compiler supports.
    pub const SUPPORTED: [TriggerType; 7] = [
        TriggerType::None,
        TriggerType::High,
        TriggerType::Low,
        TriggerType::RisingEdge,
        TriggerType::FallingEdge,
        TriggerType::PulsePositive,
        TriggerType::PulseNegative,
    ];

    /// Returns the wire value of this trigger type.
    pub fn to_byte(self) -> u8 {
        match self {
            TriggerType::None => 0,
            TriggerType::High => 1,
            TriggerType::Low => 2,
            TriggerType::RisingEdge => 3,
            TriggerType::FallingEdge => 4,
            TriggerType::PulsePositive => 5,
            TriggerType::PulseNegative => 6,
            TriggerType::Unsupported(value) => value,
        }
    }

    /// Returns whether a trigger block is required for this type.
    pub fn is_triggered(&self) -> bool {
        !matches!(self, TriggerType::None)
    }
}

impl From<u8> for TriggerType {
    fn from(value: u8) -> Self {
        match value {
            0 => TriggerType::None,
            1 => TriggerType::High,
            2 => TriggerType::Low,
            3 => TriggerType::RisingEdge,
            4 => TriggerType::FallingEdge,
            5 => TriggerType::PulsePositive,
            6 => TriggerType::PulseNegative,
            other => TriggerType::Unsupported(other),
        }
    }
}

impl From<TriggerType> for u8 {
    fn from(trigger: TriggerType) -> Self {
        trigger.to_byte()
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Unsupported(value) => write!(f, "unsupported({value})"),
            other => {
                let name: &'static str = other.into();
                write!(f, "{name}")
            }
        }
    }
}

/// Pull resistor applied to the trigger input.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerPull {
    #[default]
    None,
    PullUp,
    PullDown,
}

impl fmt::Display for TriggerPull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// External connector carrying the trigger signal.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerSource {
    Ext0,
    #[default]
    Ext1,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Named output line, used both for the glitch pulse and for power cycling.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GlitchOutput {
    /// No output.
    #[default]
    None,
    Ext0,
    Ext1,

    /// High power crowbar MOSFET gate.
    Crowbar,

    /// Analog multiplexer control lines.
    Mux0,
    Mux1,
    Mux2,
}

impl GlitchOutput {
    pub fn is_none(&self) -> bool {
        matches!(self, GlitchOutput::None)
    }
}

impl fmt::Display for GlitchOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        write!(f, "{name}")
    }
}

/// Complete description of a single glitch run.
///
/// All timings are in lane clock cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlitchConfiguration {
    pub trigger_type: TriggerType,
    pub trigger_source: TriggerSource,
    pub trigger_pull: TriggerPull,
    pub glitch_output: GlitchOutput,
    pub power_cycle_output: GlitchOutput,

    /// Only meaningful if `power_cycle_output` is set.
    pub power_cycle_length: u32,

    /// From trigger detection to the start of the glitch pulse.
    pub delay_cycles: u32,

    /// Only meaningful if `glitch_output` is set.
    pub pulse_width_cycles: u32,

    /// Number of analog samples captured once triggered.  Use
    /// [`Self::set_adc_sample_count()`] to change this, as it validates the
    /// count.
    pub adc_sample_count: u32,
}

impl Default for GlitchConfiguration {
    fn default() -> Self {
        GlitchConfiguration {
            trigger_type: TriggerType::None,
            trigger_source: TriggerSource::Ext1,
            trigger_pull: TriggerPull::None,
            glitch_output: GlitchOutput::Ext0,
            power_cycle_output: GlitchOutput::None,
            power_cycle_length: 0,
            delay_cycles: 0,
            pulse_width_cycles: 0,
            adc_sample_count: 0,
        }
    }
}

impl GlitchConfiguration {
    /// Returns whether the program needs a power-cycle block.
    pub fn has_power_cycle(&self) -> bool {
        !self.power_cycle_output.is_none()
    }

    /// Returns whether the program needs a pulse block.
    pub fn has_glitch_output(&self) -> bool {
        !self.glitch_output.is_none()
    }

    /// Changes the number of analog samples captured per run.
    ///
    /// Arguments:
    /// - `count`: The new sample count.
    ///
    /// Returns:
    /// - `Ok(())`: If the count was accepted.
    /// - `Err(ConfigError::SampleCount)`: If the count exceeds
    ///   [`MAX_ADC_SAMPLES`].  The previous count is retained.
    pub fn set_adc_sample_count(&mut self, count: u32) -> Result<(), ConfigError> {
        if count > MAX_ADC_SAMPLES {
            debug!("Invalid sample count: {count}");
            return Err(ConfigError::SampleCount(count));
        }
        self.adc_sample_count = count;
        Ok(())
    }

    /// Replaces the glitch fields with those from `settings`.  The sample
    /// count is unchanged.
    pub fn apply_settings(&mut self, settings: &GlitcherSettings) {
        self.trigger_type = settings.trigger_type;
        self.trigger_source = settings.trigger_source;
        self.trigger_pull = settings.trigger_pull;
        self.glitch_output = settings.glitch_output;
        self.power_cycle_output = settings.power_cycle_output;
        self.power_cycle_length = settings.power_cycle_length;
        self.delay_cycles = settings.delay_cycles;
        self.pulse_width_cycles = settings.pulse_width_cycles;
    }
}

impl fmt::Display for GlitchConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trigger={} source={} pull={} output={} delay={} pulse={}",
            self.trigger_type,
            self.trigger_source,
            self.trigger_pull,
            self.glitch_output,
            self.delay_cycles,
            self.pulse_width_cycles
        )?;
        if self.has_power_cycle() {
            write!(
                f,
                " power_cycle={} length={}",
                self.power_cycle_output, self.power_cycle_length
            )?;
        }
        Ok(())
    }
}

/// Settings carried by a "configure glitcher" request.
///
/// Missing fields default to those of [`GlitchConfiguration::default()`].
/// The optional timeouts, in milliseconds, replace the orchestrator's
/// current timeouts when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitcherSettings {
    pub trigger_type: TriggerType,
    pub trigger_source: TriggerSource,
    pub trigger_pull: TriggerPull,
    pub glitch_output: GlitchOutput,
    pub power_cycle_output: GlitchOutput,
    pub power_cycle_length: u32,
    pub delay_cycles: u32,
    pub pulse_width_cycles: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_timeout_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_timeout_ms: Option<u32>,
}

impl Default for GlitcherSettings {
    fn default() -> Self {
        let config = GlitchConfiguration::default();
        GlitcherSettings {
            trigger_type: config.trigger_type,
            trigger_source: config.trigger_source,
            trigger_pull: config.trigger_pull,
            glitch_output: config.glitch_output,
            power_cycle_output: config.power_cycle_output,
            power_cycle_length: config.power_cycle_length,
            delay_cycles: config.delay_cycles,
            pulse_width_cycles: config.pulse_width_cycles,
            trigger_timeout_ms: None,
            completion_timeout_ms: None,
        }
    }
}

/// Settings carried by a "configure capture" request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub sample_count: u32,
}
