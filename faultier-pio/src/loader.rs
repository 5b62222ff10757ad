// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Program loader

use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::Serialize;

use crate::lane::{INSTRUCTION_MEMORY_SIZE, Lane, LaneConfig, LaneState, OwnedLane};
use crate::pins::PinBinding;
use crate::program::CompiledProgram;

// JMP is the only instruction encoding an absolute address.
const OPCODE_MASK: u16 = 0xE000;
const OPCODE_JMP: u16 = 0x0000;
const JMP_ADDR_MASK: u16 = 0x001F;

/// Error returned when a program cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No contiguous run of free instruction slots is long enough.  The
    /// program length is included.
    NoSpace(usize),
}

impl LoadError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadError::NoSpace(_) => "No instruction memory",
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::NoSpace(len) => write!(f, "{}: {len} instructions", self.as_str()),
        }
    }
}

impl Serialize for LoadError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("LoadError", 2)?;
        match self {
            LoadError::NoSpace(len) => {
                state.serialize_field("kind", "no space")?;
                state.serialize_field("detail", len)?;
            }
        }
        state.end()
    }
}

/// Where a program was loaded and how the lane was configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedLane {
    pub offset: u8,
    pub len: u8,
    pub config: LaneConfig,
}

/// Loads `program` into the lane's instruction memory and configures the
/// lane's pin groups from `binding`.  The lane is left [`LaneState::Loaded`]
/// and disabled.
///
/// Panics if the lane is not [`LaneState::Idle`].
///
/// Returns:
/// - `Ok(LoadedLane)`: The load location and lane configuration.
/// - `Err(LoadError::NoSpace)`: If the program does not fit in the free
///   instruction slots.
pub fn load<L: Lane>(
    lane: &mut OwnedLane<L>,
    program: &CompiledProgram,
    binding: &PinBinding,
) -> Result<LoadedLane, LoadError> {
    assert_eq!(
        lane.state(),
        LaneState::Idle,
        "Lane must be idle to load a program"
    );

    let used = lane.lane().used_instructions();
    let offset = find_offset(used, program.len()).ok_or(LoadError::NoSpace(program.len()))?;

    let hw = lane.lane_mut();
    for (index, word) in program.code.iter().enumerate() {
        hw.write_instruction(offset + index as u8, relocate(*word, offset));
    }

    let config = LaneConfig {
        entry: offset,
        wrap_target: offset + program.wrap_target,
        wrap_source: offset + program.wrap_source,
        in_base: binding.trigger.map(|t| t.gpio),
        set_base: binding.glitch,
        out_base: binding.power_cycle,
    };
    hw.configure(&config);
    lane.set_state(LaneState::Loaded);

    debug!(
        "OK:    Loaded {} instructions at offset {offset}",
        program.len()
    );
    Ok(LoadedLane {
        offset,
        len: program.len() as u8,
        config,
    })
}

/// Returns the lowest offset at which `len` contiguous slots are free in
/// `used`.
pub fn find_offset(used: u32, len: usize) -> Option<u8> {
    if len == 0 || len > INSTRUCTION_MEMORY_SIZE {
        return None;
    }
    let mask = if len == INSTRUCTION_MEMORY_SIZE {
        u32::MAX
    } else {
        (1u32 << len) - 1
    };
    (0..=(INSTRUCTION_MEMORY_SIZE - len))
        .find(|offset| used & (mask << offset) == 0)
        .map(|offset| offset as u8)
}

/// Adjusts an instruction assembled at address 0 to run from `offset`.
pub fn relocate(word: u16, offset: u8) -> u16 {
    if word & OPCODE_MASK == OPCODE_JMP {
        let addr = (word & JMP_ADDR_MASK) + offset as u16;
        (word & !JMP_ADDR_MASK) | (addr & JMP_ADDR_MASK)
    } else {
        word
    }
}
