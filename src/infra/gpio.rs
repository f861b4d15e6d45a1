//! The RP2040 pin adapter.
//!
//! Sixteen GPIOs in `Flex` mode: eight data lines and eight control
//! lines, switched between input-pull-up and output per the
//! (bits, mask, mode) contract.  The board's hardware watchdog rides
//! along and is fed from the timing primitives, so even a
//! full-timeout handshake wait keeps the board alive.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use defmt::{debug, error, info, trace, warn};
use embassy_rp::gpio::{Flex, Pull};
use embassy_rp::watchdog::Watchdog;
use embassy_time::Instant;

use crate::pins::{Ctrl, GpibPins, Level, PinOp};
use crate::util::time::Ticker;

/// GPIO assignments: DIO1..8 then the control lines in mask-bit order
/// (IFC, NDAC, NRFD, DAV, EOI, REN, SRQ, ATN).
pub struct RpGpibPins {
    dio: [Flex<'static>; 8],
    ctrl: [Flex<'static>; 8],
    watchdog: Watchdog,
}

impl RpGpibPins {
    pub fn new(mut dio: [Flex<'static>; 8], mut ctrl: [Flex<'static>; 8], watchdog: Watchdog) -> Self {
        for pin in dio.iter_mut().chain(ctrl.iter_mut()) {
            pin.set_as_input();
            pin.set_pull(Pull::Up);
        }
        Self {
            dio,
            ctrl,
            watchdog,
        }
    }

    /// Hard reset through the watchdog, for `++rst`.
    pub fn reboot(&mut self) -> ! {
        info!("rebooting");
        self.watchdog.trigger_reset();
        #[allow(clippy::empty_loop)]
        loop {}
    }

    fn line_index(line: Ctrl) -> usize {
        line.bits().trailing_zeros() as usize
    }
}

impl GpibPins for RpGpibPins {
    fn read_data_bus(&mut self) -> u8 {
        let mut db = 0;
        for (i, pin) in self.dio.iter_mut().enumerate() {
            pin.set_as_input();
            pin.set_pull(Pull::Up);
            if pin.is_low() {
                db |= 1 << i;
            }
        }
        db
    }

    fn write_data_bus(&mut self, db: u8) {
        for (i, pin) in self.dio.iter_mut().enumerate() {
            if db & (1 << i) != 0 {
                pin.set_low();
            } else {
                pin.set_high();
            }
            pin.set_as_output();
        }
    }

    fn set_control(&mut self, bits: u8, mask: u8, op: PinOp) {
        for (i, pin) in self.ctrl.iter_mut().enumerate() {
            if mask & (1 << i) == 0 {
                continue;
            }
            let bit = bits & (1 << i) != 0;
            match op {
                PinOp::Direction => {
                    if bit {
                        pin.set_as_output();
                    } else {
                        pin.set_as_input();
                        pin.set_pull(Pull::Up);
                    }
                }
                PinOp::Level => {
                    if bit {
                        pin.set_high();
                    } else {
                        pin.set_low();
                    }
                }
            }
        }
    }

    fn read_control(&mut self, line: Ctrl) -> Level {
        let pin = &mut self.ctrl[Self::line_index(line)];
        if pin.is_low() {
            Level::Low
        } else {
            Level::High
        }
    }
}

impl Ticker for RpGpibPins {
    fn now_ms(&mut self) -> u64 {
        // Handshake waits poll this continuously; feeding here keeps
        // the watchdog happy through the longest configurable timeout.
        self.watchdog.feed();
        Instant::now().as_millis()
    }

    fn delay_us(&mut self, us: u32) {
        self.watchdog.feed();
        let deadline = Instant::now() + embassy_time::Duration::from_micros(u64::from(us));
        while Instant::now() < deadline {}
    }
}
