//! RP2040 board support: GPIO adapter, USB host port, watchdog and
//! flash-backed configuration storage.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub(crate) mod gpio;
pub(crate) mod storage;
pub(crate) mod usb;
pub(crate) mod watchdog;

use log::{LevelFilter, Metadata, Record};

/// Forwards the core's `log` records to defmt.
struct DefmtLogger;

impl log::Log for DefmtLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        defmt::info!("{}", defmt::Display2Format(record.args()));
    }

    fn flush(&self) {}
}

static LOGGER: DefmtLogger = DefmtLogger;

/// Install the defmt bridge.  Racy variants because the Cortex-M0 has
/// no compare-and-swap; called once before any task starts.
pub(crate) fn init_logging() {
    unsafe {
        let _ = log::set_logger_racy(&LOGGER);
        log::set_max_level_racy(LevelFilter::Debug);
    }
}
