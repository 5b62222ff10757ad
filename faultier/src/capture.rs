// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier - ADC capture and status LEDs

use alloc::vec::Vec;
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::{Level, Output};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use faultier_pio::{Capture, Indicator};

/// Samples the analog input as fast as the ADC allows once triggered.
///
/// Each 12-bit conversion is stored as its top 8 bits.
pub struct AdcCapture {
    adc: Adc<'static, Blocking>,
    channel: Channel<'static>,
    sample_count: u32,
    samples: Vec<u8>,
}

impl AdcCapture {
    pub fn new(adc: Adc<'static, Blocking>, channel: Channel<'static>) -> Self {
        AdcCapture {
            adc,
            channel,
            sample_count: 0,
            samples: Vec::new(),
        }
    }
}

impl Capture for AdcCapture {
    fn configure(&mut self, sample_count: u32) {
        self.sample_count = sample_count;
    }

    fn prepare_capture(&mut self) {
        self.samples.clear();
        self.samples.reserve(self.sample_count as usize);
    }

    fn run_capture(&mut self) {
        for _ in 0..self.sample_count {
            match self.adc.blocking_read(&mut self.channel) {
                Ok(value) => self.samples.push((value >> 4) as u8),
                Err(e) => {
                    warn!("Error: ADC read failed after {} samples: {e:?}", self.samples.len());
                    break;
                }
            }
        }
        trace!("Value: Captured {} samples", self.samples.len());
    }

    fn samples(&self) -> &[u8] {
        &self.samples
    }
}

/// Ready and triggered LEDs.
pub struct Leds {
    ready: Output<'static>,
    triggered: Output<'static>,
}

impl Leds {
    pub fn new(ready: Output<'static>, triggered: Output<'static>) -> Self {
        Leds { ready, triggered }
    }
}

fn level(on: bool) -> Level {
    if on { Level::High } else { Level::Low }
}

impl Indicator for Leds {
    fn set_ready(&mut self, on: bool) {
        self.ready.set_level(level(on));
    }

    fn set_triggered(&mut self, on: bool) {
        self.triggered.set_level(level(on));
    }
}
