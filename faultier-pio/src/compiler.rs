// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Glitch program compiler

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;
use static_assertions::const_assert;

use faultier_core::{GlitchConfiguration, TriggerType};

use crate::lane::{INSTRUCTION_MEMORY_SIZE, Signal};
use crate::program::{CompiledProgram, ProgramBuilder};

/// Longest program [`compile()`] can produce: power cycle (5), pulse trigger
/// (3), marker, delay (3), pulse (5), marker, park.
pub const MAX_PROGRAM_LEN: usize = 19;
const_assert!(MAX_PROGRAM_LEN <= INSTRUCTION_MEMORY_SIZE);

/// Error returned when a configuration cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The trigger type is not one this compiler knows.  The raw value is
    /// included.
    UnsupportedTrigger(u8),
}

impl CompileError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompileError::UnsupportedTrigger(_) => "Unsupported trigger type",
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnsupportedTrigger(value) => write!(f, "{}: {value}", self.as_str()),
        }
    }
}

impl Serialize for CompileError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("CompileError", 2)?;
        match self {
            CompileError::UnsupportedTrigger(value) => {
                state.serialize_field("kind", "unsupported trigger")?;
                state.serialize_field("detail", value)?;
            }
        }
        state.end()
    }
}

/// Compiles `config` into a glitch program.
///
/// The program is, in order:
/// - a power-cycle block, if `power_cycle_output` is set
/// - the trigger block for `trigger_type` (empty for [`TriggerType::None`])
/// - the [`Signal::Triggered`] marker
/// - the delay block
/// - a pulse block, if `glitch_output` is set
/// - the [`Signal::Glitched`] marker
///
/// Returns:
/// - `Ok(CompiledProgram)`: The assembled program.
/// - `Err(CompileError::UnsupportedTrigger)`: If the trigger type is not
///   recognised.  Nothing is assembled in this case.
pub fn compile(config: &GlitchConfiguration) -> Result<CompiledProgram, CompileError> {
    if let TriggerType::Unsupported(value) = config.trigger_type {
        debug!("Unsupported trigger type: {value}");
        return Err(CompileError::UnsupportedTrigger(value));
    }

    let mut builder = ProgramBuilder::new();

    if config.has_power_cycle() {
        builder.append_power_cycle();
    }

    match config.trigger_type {
        TriggerType::None => {}
        TriggerType::High => _ = builder.append_trigger_level(true),
        TriggerType::Low => _ = builder.append_trigger_level(false),
        TriggerType::RisingEdge => _ = builder.append_trigger_edge(true),
        TriggerType::FallingEdge => _ = builder.append_trigger_edge(false),
        TriggerType::PulsePositive => _ = builder.append_trigger_pulse(true),
        TriggerType::PulseNegative => _ = builder.append_trigger_pulse(false),
        TriggerType::Unsupported(_) => unreachable!("Unsupported trigger already rejected"),
    }

    builder.append_marker(Signal::Triggered);
    builder.append_delay();

    if config.has_glitch_output() {
        builder.append_pulse();
    }

    builder.append_marker(Signal::Glitched);

    let program = builder.finish();
    trace!("Compiled program: {:04X?}", program.code);
    Ok(program)
}

/// Returns the number of trigger block instructions for `trigger`.
pub fn trigger_block_len(trigger: TriggerType) -> Option<usize> {
    match trigger {
        TriggerType::None => Some(0),
        TriggerType::High | TriggerType::Low => Some(1),
        TriggerType::RisingEdge | TriggerType::FallingEdge => Some(2),
        TriggerType::PulsePositive | TriggerType::PulseNegative => Some(3),
        TriggerType::Unsupported(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Block, ParameterKind};
    use alloc::vec::Vec;
    use faultier_core::GlitchOutput;

    fn config(trigger_type: TriggerType) -> GlitchConfiguration {
        GlitchConfiguration {
            trigger_type,
            ..Default::default()
        }
    }

    #[test]
    fn trigger_block_sizes() {
        for trigger in TriggerType::SUPPORTED {
            let program = compile(&config(trigger)).unwrap();
            assert_eq!(
                program.instructions_in(Block::is_trigger),
                trigger_block_len(trigger).unwrap(),
                "{trigger}"
            );
            assert_eq!(program.count_blocks(Block::is_trigger), trigger.is_triggered() as usize);
        }
    }

    #[test]
    fn markers_and_delay_appear_once() {
        for trigger in TriggerType::SUPPORTED {
            let program = compile(&config(trigger)).unwrap();
            let count = |block| program.count_blocks(|b| *b == block);
            assert_eq!(count(Block::Marker(Signal::Triggered)), 1);
            assert_eq!(count(Block::Marker(Signal::Glitched)), 1);
            assert_eq!(count(Block::Delay), 1);
            assert_eq!(count(Block::Pulse), 1);
            assert_eq!(count(Block::PowerCycle), 0);

            let triggered = program.marker(Signal::Triggered).unwrap();
            let glitched = program.marker(Signal::Glitched).unwrap();
            assert_eq!(triggered.position as usize, trigger_block_len(trigger).unwrap());
            assert!(glitched.position > triggered.position);
        }
    }

    #[test]
    fn no_glitch_output_means_no_pulse() {
        let mut config = config(TriggerType::RisingEdge);
        config.glitch_output = GlitchOutput::None;
        let program = compile(&config).unwrap();

        assert_eq!(program.count_blocks(|b| *b == Block::Pulse), 0);
        let kinds: Vec<_> = program.parameters.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, [ParameterKind::Delay]);
        assert_eq!(program.parameter(ParameterKind::Delay).unwrap().overhead, 4);
    }

    #[test]
    fn parameter_order_with_power_cycle() {
        let mut config = config(TriggerType::High);
        config.power_cycle_output = GlitchOutput::Crowbar;
        config.glitch_output = GlitchOutput::Ext0;
        let program = compile(&config).unwrap();

        let kinds: Vec<_> = program.parameters.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                ParameterKind::PowerCycleLength,
                ParameterKind::Delay,
                ParameterKind::PulseWidth
            ]
        );
        assert_eq!(program.blocks[0].block, Block::PowerCycle);
        assert_eq!(program.parameter(ParameterKind::Delay).unwrap().overhead, 7);
    }

    #[test]
    fn longest_program_fits() {
        let config = GlitchConfiguration {
            trigger_type: TriggerType::PulseNegative,
            power_cycle_output: GlitchOutput::Mux0,
            glitch_output: GlitchOutput::Crowbar,
            ..Default::default()
        };
        let program = compile(&config).unwrap();
        assert_eq!(program.len(), MAX_PROGRAM_LEN);
        assert_eq!(program.wrap_source as usize, MAX_PROGRAM_LEN - 1);
        assert_eq!(program.wrap_target, 0);
    }

    #[test]
    fn unsupported_trigger() {
        let err = compile(&config(TriggerType::Unsupported(7))).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedTrigger(7));
    }

    #[test]
    fn encodes_pio_instructions() {
        let program = compile(&config(TriggerType::RisingEdge)).unwrap();
        // wait 0 pin 0; wait 1 pin 0; irq 0
        assert_eq!(program.code[0], 0x2020);
        assert_eq!(program.code[1], 0x20A0);
        assert_eq!(program.code[2], 0xC000);
        // pull block; out x, 32
        assert_eq!(program.code[3], 0x80A0);
        assert_eq!(program.code[4], 0x6020);
        // jmp x-- 5
        assert_eq!(program.code[5], 0x0045);
        // Park loop jumps to itself
        let last = program.len() - 1;
        assert_eq!(program.code[last], last as u16);
    }
}
