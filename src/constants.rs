//! Constants for pico488.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// Firmware identification, reported by `++ver`.
pub const FWVER: &str = "pico488 GPIB controller, ver 0.51.9";

/// Capacity of the host-line parse buffer.
pub const PARSE_BUF_LEN: usize = 256;

/// Capacity of the attention-service command burst buffer.  Bursts
/// longer than this occur only with pathological controllers.
pub const ATN_BURST_LEN: usize = 35;

/// Most addresses a `++trg` command will trigger in one go.
pub const MAX_TRIGGER_ADDRS: usize = 15;

/// Highest valid primary GPIB address.
pub const MAX_ADDR: u8 = 30;

#[cfg(feature = "rp2040")]
pub use firmware::*;

#[cfg(feature = "rp2040")]
mod firmware {
    use embassy_time::Duration;

    /// USB vendor/product identity of the adapter.
    pub const USB_VENDOR_ID: u16 = 0x1209;
    pub const USB_PRODUCT_ID: u16 = 0x0488;
    pub const USB_MANUFACTURER: &str = "pico488";
    pub const USB_PRODUCT: &str = "pico488 GPIB-USB adapter";

    /// USB descriptor information - maximum control endpoint packet size.
    pub const USB_MAX_PACKET_SIZE_0: u8 = 64;

    /// USB descriptor information - what current in mA this device draws.
    pub const USB_POWER_MA: u16 = 100;

    /// How long the watchdog waits for the main loop before resetting
    /// the board.
    pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(8);

    /// How often the service loop pauses to let other tasks run.
    pub const SERVICE_LOOP_PAUSE: Duration = Duration::from_millis(1);

    /// Flash offset of the persisted configuration image: the last
    /// 4 KiB sector of a 2 MiB part.
    pub const CONFIG_FLASH_OFFSET: u32 = 2048 * 1024 - 4096;

    /// Size of the flash part on the Pico.
    pub const FLASH_SIZE: usize = 2048 * 1024;
}
