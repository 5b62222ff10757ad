// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Simulated lane
//!
//! [`SimLane`] executes glitch programs one instruction per cycle, in
//! software, so that program timing can be checked without hardware.  It
//! models the subset of the PIO instruction set that glitch programs use,
//! the TX FIFO, the IRQ flags, and the pads of a single state machine.
//!
//! Timing follows the hardware:
//! - every instruction, including a taken `jmp`, takes one cycle, plus any
//!   delay encoded in it
//! - a `wait` or `pull` that cannot complete stalls, re-executing each cycle
//! - a pin written in cycle `k` shows the new level from cycle `k + 1`
//! - a `wait` executed in cycle `k` sees the input as it is at `k + 1`
//!
//! The lane only advances while enabled, by [`SimLane::cycles_per_call`]
//! cycles on each [`Lane::signal()`] call, and by [`SimLane::disable_latency`]
//! cycles when it is disabled.  [`SimLane::run_for()`] advances it directly.
//! Cycles are counted from the most recent enable.

use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::lane::{
    INSTRUCTION_MEMORY_SIZE, Lane, LaneConfig, NUM_GPIOS, PadMode, Signal, TX_FIFO_DEPTH,
};

const DEFAULT_CYCLES_PER_CALL: u32 = 16;

/// External level applied to every GPIO not configured as an output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stimulus {
    /// Level at cycle 0.
    pub initial: bool,

    /// Cycles at which the level inverts, ascending.
    pub edges: Vec<u64>,
}

impl Stimulus {
    pub fn constant(level: bool) -> Self {
        Stimulus {
            initial: level,
            edges: Vec::new(),
        }
    }

    /// Low, then high from `cycle`.
    pub fn rising_at(cycle: u64) -> Self {
        Stimulus {
            initial: false,
            edges: alloc::vec![cycle],
        }
    }

    /// High, then low from `cycle`.
    pub fn falling_at(cycle: u64) -> Self {
        Stimulus {
            initial: true,
            edges: alloc::vec![cycle],
        }
    }

    /// A pulse starting at `start` lasting `len` cycles.  A positive pulse
    /// idles low.
    pub fn pulse(start: u64, len: u64, positive: bool) -> Self {
        Stimulus {
            initial: !positive,
            edges: alloc::vec![start, start + len],
        }
    }

    pub fn level_at(&self, cycle: u64) -> bool {
        let toggles = self.edges.iter().take_while(|&&edge| edge <= cycle).count();
        self.initial ^ (toggles % 2 == 1)
    }
}

/// Observable event recorded by a [`SimLane`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The program raised `signal` in `cycle`.
    Marker { signal: Signal, cycle: u64 },

    /// An output pad changed level, visible from `cycle`.
    Pin { gpio: u8, level: bool, cycle: u64 },
}

/// Externally visible lane state, compared between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSnapshot {
    pub enabled: bool,
    pub used: u32,
    pub pads: [Option<PadMode>; NUM_GPIOS],
    pub levels: [bool; NUM_GPIOS],
    pub irq: u8,
}

enum Step {
    Next,
    Jump(u8),
    Stall,
}

/// Software model of a single PIO state machine, see the module
/// documentation.
pub struct SimLane {
    memory: [u16; INSTRUCTION_MEMORY_SIZE],
    used: u32,
    config: LaneConfig,
    enabled: bool,
    pads: [Option<PadMode>; NUM_GPIOS],
    levels: [bool; NUM_GPIOS],
    fifo: heapless::Deque<u32, TX_FIFO_DEPTH>,
    osr: u32,
    x: u32,
    y: u32,
    pc: u8,
    delay: u8,
    irq: u8,
    cycle: u64,
    stimulus: Stimulus,
    trace: Vec<Event>,
    mutations: u32,
    fault: Option<u16>,

    /// Cycles executed by each [`Lane::signal()`] call while enabled.
    pub cycles_per_call: u32,

    /// Cycles executed when an enabled lane is disabled.
    pub disable_latency: u32,
}

impl Default for SimLane {
    fn default() -> Self {
        Self::new(Stimulus::default())
    }
}

impl SimLane {
    pub fn new(stimulus: Stimulus) -> Self {
        SimLane {
            memory: [0; INSTRUCTION_MEMORY_SIZE],
            used: 0,
            config: LaneConfig::default(),
            enabled: false,
            pads: [None; NUM_GPIOS],
            levels: [false; NUM_GPIOS],
            fifo: heapless::Deque::new(),
            osr: 0,
            x: 0,
            y: 0,
            pc: 0,
            delay: 0,
            irq: 0,
            cycle: 0,
            stimulus,
            trace: Vec::new(),
            mutations: 0,
            fault: None,
            cycles_per_call: DEFAULT_CYCLES_PER_CALL,
            disable_latency: 0,
        }
    }

    pub fn with_cycles_per_call(mut self, cycles: u32) -> Self {
        self.cycles_per_call = cycles;
        self
    }

    pub fn with_disable_latency(mut self, cycles: u32) -> Self {
        self.disable_latency = cycles;
        self
    }

    pub fn set_stimulus(&mut self, stimulus: Stimulus) {
        self.stimulus = stimulus;
    }

    /// Executes `cycles` cycles if enabled.
    pub fn run_for(&mut self, cycles: u64) {
        if self.enabled {
            for _ in 0..cycles {
                self.step();
            }
        }
    }

    /// Cycles executed since the most recent enable.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Events since the most recent enable.
    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    /// Cycle of the first `signal` marker since the most recent enable.
    pub fn marker_cycle(&self, signal: Signal) -> Option<u64> {
        self.trace.iter().find_map(|event| match event {
            Event::Marker { signal: s, cycle } if *s == signal => Some(*cycle),
            _ => None,
        })
    }

    /// Level changes of `gpio` since the most recent enable, as
    /// `(cycle, level)`.
    pub fn pin_edges(&self, gpio: u8) -> Vec<(u64, bool)> {
        self.trace
            .iter()
            .filter_map(|event| match event {
                Event::Pin {
                    gpio: g,
                    level,
                    cycle,
                } if *g == gpio => Some((*cycle, *level)),
                _ => None,
            })
            .collect()
    }

    /// First period `[start, end)` during which `gpio` was driven high.
    pub fn high_window(&self, gpio: u8) -> Option<(u64, u64)> {
        let edges = self.pin_edges(gpio);
        let start = edges.iter().find(|(_, level)| *level)?.0;
        let end = edges
            .iter()
            .find(|(cycle, level)| !*level && *cycle > start)?
            .0;
        Some((start, end))
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn memory(&self) -> &[u16; INSTRUCTION_MEMORY_SIZE] {
        &self.memory
    }

    pub fn pad(&self, gpio: u8) -> Option<PadMode> {
        self.pads.get(gpio as usize).copied().flatten()
    }

    /// Number of values waiting in the TX FIFO.
    pub fn fifo_len(&self) -> usize {
        self.fifo.len()
    }

    /// Number of state changing [`Lane`] calls made, other than
    /// [`Lane::signal()`].
    pub fn mutations(&self) -> u32 {
        self.mutations
    }

    /// The instruction the lane stopped on, if it met one it does not model.
    pub fn fault(&self) -> Option<u16> {
        self.fault
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            enabled: self.enabled,
            used: self.used,
            pads: self.pads,
            levels: self.levels,
            irq: self.irq,
        }
    }
}

// Internal SimLane methods
impl SimLane {
    fn step(&mut self) {
        let cycle = self.cycle;
        self.cycle += 1;

        if self.delay > 0 {
            self.delay -= 1;
            return;
        }
        if self.fault.is_some() {
            return;
        }

        let word = self.memory[self.pc as usize % INSTRUCTION_MEMORY_SIZE];
        let delay = ((word >> 8) & 0x1F) as u8;
        match self.execute(word, cycle) {
            Step::Stall => {}
            Step::Jump(addr) => {
                self.pc = addr;
                self.delay = delay;
            }
            Step::Next => {
                self.pc = if self.pc == self.config.wrap_source {
                    self.config.wrap_target
                } else {
                    (self.pc + 1) % INSTRUCTION_MEMORY_SIZE as u8
                };
                self.delay = delay;
            }
        }
    }

    fn execute(&mut self, word: u16, cycle: u64) -> Step {
        match word >> 13 {
            0b000 => self.jmp(word, cycle),
            0b001 => self.wait(word, cycle),
            0b011 => self.out(word, cycle),
            0b100 if word & 0x80 != 0 => self.pull(word),
            0b101 => self.mov(word, cycle),
            0b110 => self.irq(word, cycle),
            0b111 => self.set(word, cycle),
            _ => self.unmodelled(word),
        }
    }

    fn jmp(&mut self, word: u16, cycle: u64) -> Step {
        let addr = (word & 0x1F) as u8;
        let taken = match (word >> 5) & 0x7 {
            0 => true,
            1 => self.x == 0,
            2 => {
                let taken = self.x != 0;
                self.x = self.x.wrapping_sub(1);
                taken
            }
            3 => self.y == 0,
            4 => {
                let taken = self.y != 0;
                self.y = self.y.wrapping_sub(1);
                taken
            }
            5 => self.x != self.y,
            6 => self.input(self.config.in_base, cycle),
            _ => return self.unmodelled(word),
        };
        if taken { Step::Jump(addr) } else { Step::Next }
    }

    fn wait(&mut self, word: u16, cycle: u64) -> Step {
        let polarity = word & 0x80 != 0;
        let index = (word & 0x1F) as u8;
        let level = match (word >> 5) & 0x3 {
            0 => self.level(index, cycle + 1),
            1 => match self.config.in_base {
                Some(base) => self.level(base + index, cycle + 1),
                None => return self.unmodelled(word),
            },
            _ => return self.unmodelled(word),
        };
        if level == polarity {
            Step::Next
        } else {
            Step::Stall
        }
    }

    fn pull(&mut self, word: u16) -> Step {
        let block = word & 0x20 != 0;
        match self.fifo.pop_front() {
            Some(value) => {
                self.osr = value;
                Step::Next
            }
            None if block => Step::Stall,
            None => {
                self.osr = self.x;
                Step::Next
            }
        }
    }

    fn out(&mut self, word: u16, cycle: u64) -> Step {
        let count = match word & 0x1F {
            0 => 32,
            n => n as u32,
        };
        let value = if count == 32 {
            let value = self.osr;
            self.osr = 0;
            value
        } else {
            let value = self.osr & ((1 << count) - 1);
            self.osr >>= count;
            value
        };
        match (word >> 5) & 0x7 {
            0 => self.drive(self.config.out_base, value & 1 != 0, cycle),
            1 => self.x = value,
            2 => self.y = value,
            3 => {}
            _ => return self.unmodelled(word),
        }
        Step::Next
    }

    fn mov(&mut self, word: u16, cycle: u64) -> Step {
        let source = match word & 0x7 {
            0 => self.input(self.config.in_base, cycle) as u32,
            1 => self.x,
            2 => self.y,
            3 => 0,
            7 => self.osr,
            _ => return self.unmodelled(word),
        };
        let value = match (word >> 3) & 0x3 {
            0 => source,
            1 => !source,
            2 => source.reverse_bits(),
            _ => return self.unmodelled(word),
        };
        match (word >> 5) & 0x7 {
            0 => self.drive(self.config.out_base, value & 1 != 0, cycle),
            1 => self.x = value,
            2 => self.y = value,
            7 => self.osr = value,
            _ => return self.unmodelled(word),
        }
        Step::Next
    }

    fn irq(&mut self, word: u16, cycle: u64) -> Step {
        if word & 0x30 != 0 {
            // Waiting and relative IRQs are not used by glitch programs
            return self.unmodelled(word);
        }
        let index = (word & 0x7) as u8;
        if word & 0x40 != 0 {
            self.irq &= !(1 << index);
        } else {
            self.irq |= 1 << index;
            let signal = match index {
                0 => Some(Signal::Triggered),
                1 => Some(Signal::Glitched),
                _ => None,
            };
            if let Some(signal) = signal {
                self.trace.push(Event::Marker { signal, cycle });
            }
        }
        Step::Next
    }

    fn set(&mut self, word: u16, cycle: u64) -> Step {
        let data = (word & 0x1F) as u32;
        match (word >> 5) & 0x7 {
            0 => self.drive(self.config.set_base, data & 1 != 0, cycle),
            1 => self.x = data,
            2 => self.y = data,
            _ => return self.unmodelled(word),
        }
        Step::Next
    }

    fn unmodelled(&mut self, word: u16) -> Step {
        warn!(
            "Error: Simulated lane halted on {word:04X} at pc {}",
            self.pc
        );
        self.fault = Some(word);
        Step::Stall
    }

    fn input(&self, base: Option<u8>, cycle: u64) -> bool {
        match base {
            Some(gpio) => self.level(gpio, cycle + 1),
            None => false,
        }
    }

    fn level(&self, gpio: u8, cycle: u64) -> bool {
        match self.pads.get(gpio as usize).copied().flatten() {
            Some(PadMode::Output) => self.levels[gpio as usize],
            _ => self.stimulus.level_at(cycle),
        }
    }

    // Writes to pads not configured as outputs have no visible effect
    fn drive(&mut self, base: Option<u8>, level: bool, cycle: u64) {
        let Some(gpio) = base else {
            return;
        };
        if self.pad(gpio) != Some(PadMode::Output) {
            return;
        }
        if self.levels[gpio as usize] != level {
            self.levels[gpio as usize] = level;
            self.trace.push(Event::Pin {
                gpio,
                level,
                cycle: cycle + 1,
            });
        }
    }

    fn mutated(&mut self) {
        self.mutations += 1;
    }
}

impl Lane for SimLane {
    fn used_instructions(&self) -> u32 {
        self.used
    }

    fn write_instruction(&mut self, slot: u8, word: u16) {
        self.mutated();
        let slot = slot as usize % INSTRUCTION_MEMORY_SIZE;
        self.memory[slot] = word;
        self.used |= 1 << slot;
    }

    fn clear_instructions(&mut self) {
        self.mutated();
        self.memory = [0; INSTRUCTION_MEMORY_SIZE];
        self.used = 0;
    }

    fn configure_pad(&mut self, gpio: u8, mode: PadMode) {
        self.mutated();
        if let Some(pad) = self.pads.get_mut(gpio as usize) {
            *pad = Some(mode);
            self.levels[gpio as usize] = false;
        }
    }

    fn release_pad(&mut self, gpio: u8) {
        self.mutated();
        if let Some(pad) = self.pads.get_mut(gpio as usize) {
            *pad = None;
            self.levels[gpio as usize] = false;
        }
    }

    fn configure(&mut self, config: &LaneConfig) {
        self.mutated();
        self.config = *config;
        self.pc = config.entry;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.mutated();
        if enabled && !self.enabled {
            self.cycle = 0;
            self.trace.clear();
        } else if !enabled && self.enabled {
            for _ in 0..self.disable_latency {
                self.step();
            }
        }
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn try_push(&mut self, value: u32) -> bool {
        self.mutated();
        self.fifo.push_back(value).is_ok()
    }

    fn signal(&mut self, signal: Signal) -> bool {
        if self.enabled {
            for _ in 0..self.cycles_per_call {
                self.step();
            }
        }
        self.irq & (1 << signal.irq_index()) != 0
    }

    fn clear_signal(&mut self, signal: Signal) {
        self.mutated();
        self.irq &= !(1 << signal.irq_index());
    }

    fn reset(&mut self) {
        self.mutated();
        self.fifo.clear();
        self.osr = 0;
        self.x = 0;
        self.y = 0;
        self.delay = 0;
        self.fault = None;
        self.pc = self.config.entry;
    }
}
