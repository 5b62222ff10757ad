// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier - PIO0 state machine 0 as a glitch lane

use embassy_rp::Peri;
use embassy_rp::pac;
use embassy_rp::peripherals::PIO0;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use faultier_core::TriggerPull;
use faultier_pio::Signal;
use faultier_pio::lane::{INSTRUCTION_MEMORY_SIZE, Lane, LaneConfig, PadMode};

// State machine used within PIO0.
const SM: usize = 0;

// IO_BANK0 function selects.
const FUNCSEL_PIO0: u8 = 6;
const FUNCSEL_NULL: u8 = 31;

// `set pins, 0` and `set pindirs, 0`, with the value in the low bits.
const SET_PINS: u16 = 0xE000;
const SET_PINDIRS: u16 = 0xE080;

/// Drives PIO0 state machine 0 directly through its registers.
///
/// Instruction memory is shared by the four state machines of PIO0, and this
/// lane assumes it is the only user.
pub struct PioLane {
    _pio: Peri<'static, PIO0>,
    used: u32,
    entry: u8,
}

impl PioLane {
    /// Takes PIO0 out of reset and returns a lane with nothing loaded.
    pub fn new(pio: Peri<'static, PIO0>) -> Self {
        pac::RESETS.reset().modify(|w| w.set_pio0(false));
        while !pac::RESETS.reset_done().read().pio0() {}

        let mut lane = PioLane {
            _pio: pio,
            used: 0,
            entry: 0,
        };
        lane.set_enabled(false);
        lane.clear_instructions();
        debug!("OK:    PIO0 SM{SM} lane ready");
        lane
    }

    fn sm(&self) -> pac::pio::StateMachine {
        pac::PIO0.sm(SM)
    }

    // Executes a single instruction immediately.
    fn exec(&mut self, instr: u16) {
        self.sm().instr().write(|w| w.set_instr(instr));
    }

    // Runs `instr` with the SET pin group temporarily pointed at `gpio`.
    fn exec_on_pin(&mut self, gpio: u8, instr: u16) {
        let pinctrl = self.sm().pinctrl().read();
        self.sm().pinctrl().write(|w| {
            w.set_set_base(gpio);
            w.set_set_count(1);
        });
        self.exec(instr);
        self.sm().pinctrl().write_value(pinctrl);
    }

    fn jump_to_entry(&mut self) {
        // `jmp entry`
        self.exec(self.entry as u16 & 0x1F);
    }
}

impl Lane for PioLane {
    fn used_instructions(&self) -> u32 {
        self.used
    }

    fn write_instruction(&mut self, slot: u8, word: u16) {
        pac::PIO0
            .instr_mem(slot as usize)
            .write(|w| w.set_instr_mem(word));
        self.used |= 1 << slot;
    }

    fn clear_instructions(&mut self) {
        for slot in 0..INSTRUCTION_MEMORY_SIZE {
            pac::PIO0.instr_mem(slot).write(|w| w.set_instr_mem(0));
        }
        self.used = 0;
    }

    fn configure_pad(&mut self, gpio: u8, mode: PadMode) {
        pac::PADS_BANK0.gpio(gpio as usize).write(|w| {
            w.set_ie(true);
            w.set_od(false);
            w.set_schmitt(true);
            if let PadMode::Input(pull) = mode {
                w.set_pue(pull == TriggerPull::PullUp);
                w.set_pde(pull == TriggerPull::PullDown);
            } else {
                w.set_slewfast(true);
            }
        });
        pac::IO_BANK0
            .gpio(gpio as usize)
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_PIO0));

        match mode {
            PadMode::Input(_) => self.exec_on_pin(gpio, SET_PINDIRS),
            PadMode::Output => {
                self.exec_on_pin(gpio, SET_PINS);
                self.exec_on_pin(gpio, SET_PINDIRS | 1);
            }
        }
    }

    fn release_pad(&mut self, gpio: u8) {
        self.exec_on_pin(gpio, SET_PINDIRS);
        pac::IO_BANK0
            .gpio(gpio as usize)
            .ctrl()
            .write(|w| w.set_funcsel(FUNCSEL_NULL));
        pac::PADS_BANK0.gpio(gpio as usize).write(|w| {
            w.set_ie(true);
            w.set_od(false);
            w.set_pue(false);
            w.set_pde(false);
        });
    }

    fn configure(&mut self, config: &LaneConfig) {
        let sm = self.sm();
        sm.clkdiv().write(|w| {
            w.set_int(1);
            w.set_frac(0);
        });
        sm.execctrl().write(|w| {
            w.set_wrap_bottom(config.wrap_target);
            w.set_wrap_top(config.wrap_source);
        });
        sm.shiftctrl().write(|w| {
            w.set_autopull(false);
            w.set_autopush(false);
        });
        sm.pinctrl().write(|w| {
            if let Some(base) = config.in_base {
                w.set_in_base(base);
            }
            if let Some(base) = config.set_base {
                w.set_set_base(base);
                w.set_set_count(1);
            }
            if let Some(base) = config.out_base {
                w.set_out_base(base);
                w.set_out_count(1);
            }
        });

        self.entry = config.entry;
        self.jump_to_entry();
    }

    fn set_enabled(&mut self, enabled: bool) {
        pac::PIO0.ctrl().modify(|w| {
            let mask = w.sm_enable();
            w.set_sm_enable(if enabled {
                mask | 1 << SM
            } else {
                mask & !(1 << SM)
            });
        });
    }

    fn is_enabled(&self) -> bool {
        pac::PIO0.ctrl().read().sm_enable() & (1 << SM) != 0
    }

    fn try_push(&mut self, value: u32) -> bool {
        if pac::PIO0.fstat().read().txfull() & (1 << SM) != 0 {
            return false;
        }
        pac::PIO0.txf(SM).write_value(value);
        true
    }

    fn signal(&mut self, signal: Signal) -> bool {
        pac::PIO0.irq().read().irq() & (1 << signal.irq_index()) != 0
    }

    fn clear_signal(&mut self, signal: Signal) {
        // Write one to clear
        pac::PIO0
            .irq()
            .write(|w| w.set_irq(1 << signal.irq_index()));
    }

    fn reset(&mut self) {
        pac::PIO0.ctrl().modify(|w| w.set_sm_restart(1 << SM));

        // Changing the FIFO join clears both FIFOs
        let sm = self.sm();
        sm.shiftctrl().modify(|w| w.set_fjoin_rx(!w.fjoin_rx()));
        sm.shiftctrl().modify(|w| w.set_fjoin_rx(!w.fjoin_rx()));

        self.jump_to_entry();
    }
}
