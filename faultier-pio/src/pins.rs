// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Pin binding
//!
//! Maps the logical roles of a [`GlitchConfiguration`] onto GPIOs using the
//! [`faultier_core::board`] tables, then applies the pad configuration
//! through the [`Lane`].

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use faultier_core::board;
use faultier_core::{GlitchConfiguration, TriggerPull};

use crate::lane::{Lane, PadMode};

/// Logical use of a GPIO during a glitch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Trigger,
    Glitch,
    PowerCycle,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Trigger => write!(f, "trigger"),
            Role::Glitch => write!(f, "glitch"),
            Role::PowerCycle => write!(f, "power cycle"),
        }
    }
}

/// Error returned when a configuration cannot be bound to pins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The same GPIO was selected for two roles.
    Conflict { gpio: u8, first: Role, second: Role },
}

impl BindError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            BindError::Conflict { .. } => "Pin conflict",
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Conflict {
                gpio,
                first,
                second,
            } => write!(
                f,
                "{}: GPIO {gpio} used for {first} and {second}",
                self.as_str()
            ),
        }
    }
}

impl Serialize for BindError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BindError", 2)?;
        match self {
            BindError::Conflict { gpio, .. } => {
                state.serialize_field("kind", "pin conflict")?;
                state.serialize_field("detail", gpio)?;
            }
        }
        state.end()
    }
}

/// Trigger input line and its pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerLine {
    pub gpio: u8,
    pub pull: TriggerPull,
}

/// GPIOs used by one glitch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinBinding {
    /// Only bound if a trigger is configured.
    pub trigger: Option<TriggerLine>,
    pub glitch: Option<u8>,
    pub power_cycle: Option<u8>,
}

impl PinBinding {
    /// Resolves the lines for `config`, without touching hardware.
    ///
    /// Returns:
    /// - `Ok(PinBinding)`: The lines to use.
    /// - `Err(BindError::Conflict)`: If two roles resolve to the same GPIO.
    pub fn resolve(config: &GlitchConfiguration) -> Result<Self, BindError> {
        let binding = PinBinding {
            trigger: config.trigger_type.is_triggered().then(|| TriggerLine {
                gpio: board::trigger_line(config.trigger_source),
                pull: config.trigger_pull,
            }),
            glitch: board::output_line(config.glitch_output),
            power_cycle: board::output_line(config.power_cycle_output),
        };

        let roles = binding.roles();
        for (index, (gpio, first)) in roles.iter().enumerate() {
            if let Some((_, second)) = roles[index + 1..].iter().find(|(g, _)| g == gpio) {
                debug!("GPIO {gpio} bound twice");
                return Err(BindError::Conflict {
                    gpio: *gpio,
                    first: *first,
                    second: *second,
                });
            }
        }

        Ok(binding)
    }

    /// Configures the pads for this binding.  Applying the same binding
    /// again leaves the pads unchanged.
    pub fn apply<L: Lane>(&self, lane: &mut L) {
        for (gpio, role) in self.roles() {
            let mode = match role {
                Role::Trigger => PadMode::Input(self.trigger.map(|t| t.pull).unwrap_or_default()),
                Role::Glitch | Role::PowerCycle => PadMode::Output,
            };
            trace!("Exec:  Pad {gpio} {role} {mode:?}");
            lane.configure_pad(gpio, mode);
        }
    }

    /// Returns every pad in this binding to its reset state.
    pub fn release<L: Lane>(&self, lane: &mut L) {
        for (gpio, _) in self.roles() {
            lane.release_pad(gpio);
        }
    }

    /// Returns the bound GPIOs with their roles.
    pub fn roles(&self) -> heapless::Vec<(u8, Role), 3> {
        let mut roles = heapless::Vec::new();
        let lines = [
            (self.trigger.map(|t| t.gpio), Role::Trigger),
            (self.glitch, Role::Glitch),
            (self.power_cycle, Role::PowerCycle),
        ];
        for (gpio, role) in lines {
            if let Some(gpio) = gpio {
                // At most three entries
                let _ = roles.push((gpio, role));
            }
        }
        roles
    }
}

/// Resolves and applies the pin binding for `config`.
///
/// Nothing is changed if resolution fails.
pub fn bind<L: Lane>(config: &GlitchConfiguration, lane: &mut L) -> Result<PinBinding, BindError> {
    let binding = PinBinding::resolve(config)?;
    binding.apply(lane);
    Ok(binding)
}
