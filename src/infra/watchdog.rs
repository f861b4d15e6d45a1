//! Hardware watchdog setup.
//!
//! The watchdog itself travels with the pin adapter (see
//! `infra::gpio`), which feeds it from the handshake timing
//! primitives.  This module only knows how to arm it.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use defmt::{debug, error, info, trace, warn};
use embassy_rp::peripherals::WATCHDOG;
use embassy_rp::watchdog::Watchdog;

use crate::constants::WATCHDOG_TIMEOUT;

/// Arm the hardware watchdog.
pub fn start(p_watchdog: WATCHDOG) -> Watchdog {
    let mut watchdog = Watchdog::new(p_watchdog);
    watchdog.start(WATCHDOG_TIMEOUT);
    info!("watchdog armed");
    watchdog
}
