// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier - Default Firmware
//!
//! Runs a single glitcher on PIO0 state machine 0, controlled over the
//! binary API on UART0.  Logs go to USB CDC.
//!
//! To change configuration:
//! - `HEAP_SIZE`: Size of the heap used by the application.  It must hold
//!   the capture buffer, so it must be more than
//!   [`faultier_core::MAX_ADC_SAMPLES`] bytes.
//! - `LOG_BUFFER_SIZE`: Size of the USB logger buffer.
//! - `UART_TX_BUF_SIZE` and `UART_RX_BUF_SIZE`: The command link buffers.
//! - [`link::BAUD_RATE`]: The command link baud rate.
//!
//! The GPIO assignments are fixed by the board, see
//! [`faultier_core::board`].

#![no_std]
#![no_main]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]

extern crate alloc;
use alloc::format;
use core::mem::MaybeUninit;
use embassy_executor::Spawner;
use embassy_rp::adc::{self, Adc, Channel};
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output, Pull};
use embassy_rp::peripherals::{UART0, USB};
use embassy_rp::uart::{self, BufferedUart};
use embassy_rp::usb::{self, Driver};
use embassy_time::{Instant, Timer};
use embedded_alloc::LlffHeap as Heap;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use panic_halt as _;
use static_cell::make_static;

use faultier_core::{MAX_ADC_SAMPLES, board};
use faultier_pio::bin::{Api, ServeError};
use faultier_pio::{Clock, Glitcher};

mod capture;
mod lane;
mod link;

use capture::{AdcCapture, Leds};
use lane::PioLane;
use link::{LinkReader, LinkWriter};

include!(concat!(env!("OUT_DIR"), "/built.rs"));
pub const AUTHOR: &str = "Piers Finlayson";
pub const AUTHOR_EMAIL: &str = "piers@piers.rocks";

// Heap size for the application.
const HEAP_SIZE: usize = 64 * 1024;
const _: () = assert!(HEAP_SIZE > MAX_ADC_SAMPLES as usize);

const LOG_BUFFER_SIZE: usize = 1024;
const UART_TX_BUF_SIZE: usize = 1024;
const UART_RX_BUF_SIZE: usize = 512;

#[global_allocator]
static HEAP: Heap = Heap::empty();

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => usb::InterruptHandler<USB>;
    UART0_IRQ => uart::BufferedInterruptHandler<UART0>;
});

/// Time source for glitch runs.
struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }
}

#[embassy_executor::task]
async fn logger_task(driver: Driver<'static, USB>) {
    embassy_usb_logger::run!(LOG_BUFFER_SIZE, log::LevelFilter::Info, driver);
}

// faultier default firmware's main function.
//
// - Set up the heap
// - Set up the HAL and start USB logging
// - Set up the glitcher: lane, ADC capture and LEDs
// - Serve the binary API on UART0 forever
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Set up the heap allocator
    {
        static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
        unsafe { HEAP.init(&raw mut HEAP_MEM as usize, HEAP_SIZE) }
    }

    // Set up the HAL
    let p = embassy_rp::init(Default::default());

    // Set up the logger
    let driver = Driver::new(p.USB, Irqs);
    spawner.must_spawn(logger_task(driver));

    info!("*** faultier ***");
    info!("Value: {PKG_NAME} v{PKG_VERSION} built with {RUSTC_VERSION}");

    // Set up the glitcher
    let lane = PioLane::new(p.PIO0);
    let adc = Adc::new_blocking(p.ADC, adc::Config::default());
    let channel = Channel::new_pin(p.PIN_26, Pull::None);
    let leds = Leds::new(
        Output::new(p.PIN_14, Level::Low),
        Output::new(p.PIN_15, Level::Low),
    );
    let mut glitcher = Glitcher::new(lane, AdcCapture::new(adc, channel), leds);
    info!(
        "Value: ADC on GPIO {}, LEDs on GPIO {} and {}",
        board::ADC_INPUT,
        board::LED_READY,
        board::LED_TRIGGERED
    );

    // Set up the command link
    let mut uart_config = uart::Config::default();
    uart_config.baudrate = link::BAUD_RATE;
    let tx_buf = make_static!([0u8; UART_TX_BUF_SIZE]);
    let rx_buf = make_static!([0u8; UART_RX_BUF_SIZE]);
    let uart = BufferedUart::new(p.UART0, p.PIN_0, p.PIN_1, Irqs, tx_buf, rx_buf, uart_config);
    let (tx, rx) = uart.split();
    let mut reader = LinkReader(rx);
    let mut writer = LinkWriter(tx);
    info!(
        "Value: Binary API on GPIO {} (TX) and {} (RX) at {} baud",
        board::UART_TX,
        board::UART_RX,
        link::BAUD_RATE
    );

    let mut api = Api::new(format!("{PKG_NAME} {PKG_VERSION}"));
    let mut clock = SystemClock;
    loop {
        match api
            .serve(&mut glitcher, &mut clock, &mut reader, &mut writer)
            .await
        {
            ServeError::Read(e) => warn!("Error: Binary API read failure {e:?}"),
            ServeError::Write(e) => warn!("Error: Binary API write failure {e:?}"),
        }

        // A run may have been abandoned part way through
        glitcher.abort();
        Timer::after_millis(10).await;
    }
}
