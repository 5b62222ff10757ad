// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Glitch program builder
//!
//! [`ProgramBuilder`] is an append-only sequence of named blocks.  Each
//! `append_*` method emits one block and returns where it landed, plus any
//! marker or parameter it introduced.  Instruction encoding is left to the
//! [`pio`] assembler.
//!
//! Block timings, with one cycle per instruction and a `jmp x--` loop loaded
//! with `n` running for `n + 1` cycles:
//!
//! | Block       | Instructions                                              | Overhead |
//! |-------------|-----------------------------------------------------------|----------|
//! | power cycle | `pull; out x, 32; mov pins, !null; jmp x--; mov pins, null` | 2        |
//! | delay       | `pull; out x, 32; jmp x--`                                | 4 (7 with pulse) |
//! | pulse       | `pull; out y, 32; set pins, 1; jmp y--; set pins, 0`      | 2        |
//!
//! The overhead is subtracted from the requested cycle count before the
//! value is pushed, so the block takes exactly the requested time.  The
//! delay overhead covers the "triggered" marker, and, when a pulse follows,
//! the first three pulse instructions, so that the glitch line rises exactly
//! `delay_cycles` after the "triggered" marker.

use alloc::vec::Vec;
use pio::{
    Assembler, JmpCondition, Label, MovDestination, MovOperation, MovSource, OutDestination,
    SetDestination, WaitSource,
};

use crate::lane::{INSTRUCTION_MEMORY_SIZE, Signal};

// Trigger input is pin 0 of the IN pin group.
const TRIGGER_PIN_INDEX: u8 = 0;

const POWER_CYCLE_OVERHEAD: u32 = 2;
const DELAY_OVERHEAD: u32 = 4;
const PULSE_OVERHEAD: u32 = 2;

// Cycles from the start of the pulse block until the glitch line is high.
const PULSE_LEAD: u32 = 3;

/// Kind of runtime value a program consumes from the TX FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    PowerCycleLength,
    Delay,
    PulseWidth,
}

/// Placeholder for a runtime value, in the order the program pulls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub kind: ParameterKind,

    /// Index of the `pull` instruction which consumes the value.
    pub position: u8,

    /// Fixed cycles the block adds on top of the pushed value.
    pub overhead: u32,
}

impl Parameter {
    /// Returns the word to push so that the block lasts `cycles`.
    ///
    /// The overhead is the shortest the block can be, and values below it
    /// give that shortest block:
    /// - pulse: 2 cycles, so a 1 cycle pulse is 2 cycles wide
    /// - delay: 4 cycles, or 7 when followed by a pulse
    /// - power cycle: 2 cycles
    pub fn encode(&self, cycles: u32) -> u32 {
        cycles.saturating_sub(self.overhead)
    }

    /// Returns whether `cycles` can be honoured exactly.
    pub fn is_exact(&self, cycles: u32) -> bool {
        cycles >= self.overhead
    }
}

/// Position of a signal marker instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub signal: Signal,
    pub position: u8,
}

/// Named program blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    PowerCycle,
    TriggerLevel { high: bool },
    TriggerEdge { rising: bool },
    TriggerPulse { positive: bool },
    Marker(Signal),
    Delay,
    Pulse,
    Park,
}

impl Block {
    pub fn is_trigger(&self) -> bool {
        matches!(
            self,
            Block::TriggerLevel { .. } | Block::TriggerEdge { .. } | Block::TriggerPulse { .. }
        )
    }
}

/// Where a block was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub block: Block,
    pub start: u8,
    pub len: u8,
}

/// An assembled glitch program, addressed from 0.  Relocation happens at
/// load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub code: Vec<u16>,
    pub wrap_target: u8,
    pub wrap_source: u8,
    pub blocks: Vec<BlockSpan>,
    pub markers: Vec<Marker>,
    pub parameters: Vec<Parameter>,
}

impl CompiledProgram {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn marker(&self, signal: Signal) -> Option<Marker> {
        self.markers.iter().copied().find(|m| m.signal == signal)
    }

    pub fn parameter(&self, kind: ParameterKind) -> Option<Parameter> {
        self.parameters.iter().copied().find(|p| p.kind == kind)
    }

    /// Returns the total instruction count of blocks matching `f`.
    pub fn instructions_in(&self, f: impl Fn(&Block) -> bool) -> usize {
        self.blocks
            .iter()
            .filter(|span| f(&span.block))
            .map(|span| span.len as usize)
            .sum()
    }

    /// Returns the number of blocks matching `f`.
    pub fn count_blocks(&self, f: impl Fn(&Block) -> bool) -> usize {
        self.blocks.iter().filter(|span| f(&span.block)).count()
    }
}

/// Append-only glitch program builder.
pub struct ProgramBuilder {
    asm: Assembler<INSTRUCTION_MEMORY_SIZE>,
    wrap_target: Label,
    len: u8,
    blocks: Vec<BlockSpan>,
    markers: Vec<Marker>,
    parameters: Vec<Parameter>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut asm = Assembler::<INSTRUCTION_MEMORY_SIZE>::new();
        let mut wrap_target = asm.label();
        asm.bind(&mut wrap_target);
        ProgramBuilder {
            asm,
            wrap_target,
            len: 0,
            blocks: Vec::new(),
            markers: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Number of instructions emitted so far.
    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drives the OUT pin high for the pulled number of cycles, then low.
    pub fn append_power_cycle(&mut self) -> (BlockSpan, Parameter) {
        let start = self.len;
        let parameter = self.pull_into(
            OutDestination::X,
            ParameterKind::PowerCycleLength,
            POWER_CYCLE_OVERHEAD,
        );
        self.asm
            .mov(MovDestination::PINS, MovOperation::Invert, MovSource::NULL);
        self.len += 1;
        self.countdown(JmpCondition::XDecNonZero);
        self.asm
            .mov(MovDestination::PINS, MovOperation::None, MovSource::NULL);
        self.len += 1;
        (self.span(Block::PowerCycle, start), parameter)
    }

    /// Waits for the trigger input to be at the given level.
    pub fn append_trigger_level(&mut self, high: bool) -> BlockSpan {
        let start = self.len;
        self.wait_trigger(high);
        self.span(Block::TriggerLevel { high }, start)
    }

    /// Waits for a transition to the given level.
    pub fn append_trigger_edge(&mut self, rising: bool) -> BlockSpan {
        let start = self.len;
        self.wait_trigger(!rising);
        self.wait_trigger(rising);
        self.span(Block::TriggerEdge { rising }, start)
    }

    /// Waits for a complete pulse.  A positive pulse is low, high, then low.
    pub fn append_trigger_pulse(&mut self, positive: bool) -> BlockSpan {
        let start = self.len;
        self.wait_trigger(!positive);
        self.wait_trigger(positive);
        self.wait_trigger(!positive);
        self.span(Block::TriggerPulse { positive }, start)
    }

    /// Raises `signal`.
    pub fn append_marker(&mut self, signal: Signal) -> Marker {
        let start = self.len;
        self.asm.irq(false, false, signal.irq_index(), false);
        self.len += 1;
        let marker = Marker {
            signal,
            position: start,
        };
        self.markers.push(marker);
        self.span(Block::Marker(signal), start);
        marker
    }

    /// Busy waits for the pulled number of cycles.
    pub fn append_delay(&mut self) -> (BlockSpan, Parameter) {
        let start = self.len;
        let parameter = self.pull_into(OutDestination::X, ParameterKind::Delay, DELAY_OVERHEAD);
        self.countdown(JmpCondition::XDecNonZero);
        (self.span(Block::Delay, start), parameter)
    }

    /// Drives the SET pin high for the pulled number of cycles, then low.
    pub fn append_pulse(&mut self) -> (BlockSpan, Parameter) {
        // The delay now also has to cover the pulse block lead in
        if let Some(delay) = self
            .parameters
            .iter_mut()
            .rev()
            .find(|p| p.kind == ParameterKind::Delay)
        {
            delay.overhead += PULSE_LEAD;
        }

        let start = self.len;
        let parameter =
            self.pull_into(OutDestination::Y, ParameterKind::PulseWidth, PULSE_OVERHEAD);
        self.asm.set(SetDestination::PINS, 1);
        self.len += 1;
        self.countdown(JmpCondition::YDecNonZero);
        self.asm.set(SetDestination::PINS, 0);
        self.len += 1;
        (self.span(Block::Pulse, start), parameter)
    }

    /// Terminates the program and assembles it.
    ///
    /// The program ends in a self loop, so the state machine stays parked
    /// until it is disabled.
    pub fn finish(mut self) -> CompiledProgram {
        let start = self.len;
        let mut park = self.asm.label();
        self.asm.bind(&mut park);
        self.asm.jmp(JmpCondition::Always, &mut park);
        self.len += 1;
        self.span(Block::Park, start);

        let mut wrap_source = self.asm.label();
        self.asm.bind(&mut wrap_source);

        let program = self.asm.assemble_with_wrap(wrap_source, self.wrap_target);
        CompiledProgram {
            code: program.code.iter().copied().collect(),
            wrap_target: program.wrap.target,
            wrap_source: program.wrap.source,
            blocks: self.blocks,
            markers: self.markers,
            parameters: self.parameters,
        }
    }
}

// Internal ProgramBuilder methods
impl ProgramBuilder {
    fn wait_trigger(&mut self, high: bool) {
        self.asm
            .wait(high as u8, WaitSource::PIN, TRIGGER_PIN_INDEX, false);
        self.len += 1;
    }

    fn pull_into(
        &mut self,
        destination: OutDestination,
        kind: ParameterKind,
        overhead: u32,
    ) -> Parameter {
        let parameter = Parameter {
            kind,
            position: self.len,
            overhead,
        };
        self.asm.pull(false, true);
        self.asm.out(destination, 32);
        self.len += 2;
        self.parameters.push(parameter);
        parameter
    }

    fn countdown(&mut self, condition: JmpCondition) {
        let mut top = self.asm.label();
        self.asm.bind(&mut top);
        self.asm.jmp(condition, &mut top);
        self.len += 1;
    }

    fn span(&mut self, block: Block, start: u8) -> BlockSpan {
        let span = BlockSpan {
            block,
            start,
            len: self.len - start,
        };
        self.blocks.push(span);
        span
    }
}
