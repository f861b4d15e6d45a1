//! Flash-backed configuration storage.
//!
//! The configuration image lives in the last 4 KiB sector of the
//! Pico's flash, well clear of the firmware.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use defmt::{debug, error, info, trace, warn};
use embassy_rp::flash::{Blocking, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;

use crate::config::{NvStore, CFG_IMAGE_SIZE};
use crate::constants::{CONFIG_FLASH_OFFSET, FLASH_SIZE};

// The image is written as one page.
const PAGE: usize = 256;
static_assertions::const_assert!(CFG_IMAGE_SIZE <= PAGE);

pub struct FlashStore {
    flash: Flash<'static, FLASH, Blocking, FLASH_SIZE>,
}

impl FlashStore {
    pub fn new(p_flash: FLASH) -> Self {
        Self {
            flash: Flash::new_blocking(p_flash),
        }
    }
}

impl NvStore for FlashStore {
    fn read(&mut self, image: &mut [u8; CFG_IMAGE_SIZE]) {
        if let Err(e) = self.flash.blocking_read(CONFIG_FLASH_OFFSET, image) {
            warn!("config read failed: {}", e);
            image.fill(0xFF);
        }
    }

    fn write(&mut self, image: &[u8; CFG_IMAGE_SIZE]) {
        let mut page = [0xFF; PAGE];
        page[..CFG_IMAGE_SIZE].copy_from_slice(image);
        let end = CONFIG_FLASH_OFFSET + ERASE_SIZE as u32;
        if let Err(e) = self.flash.blocking_erase(CONFIG_FLASH_OFFSET, end) {
            warn!("config erase failed: {}", e);
            return;
        }
        if let Err(e) = self.flash.blocking_write(CONFIG_FLASH_OFFSET, &page) {
            warn!("config write failed: {}", e);
        }
    }
}
