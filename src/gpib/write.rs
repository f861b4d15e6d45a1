//! Talker-side byte handshake and the send path.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use super::{ControlState, GpibBus, HandshakeError, WaitAbort};
use crate::pins::{Ctrl, GpibPins, PinOp};
use crate::util::time::Ticker;

impl<P: GpibPins + Ticker> GpibBus<P> {
    /// Source one byte with the three-wire handshake.  The caller must
    /// already be in CCMS, CTAS or DTAS.
    ///
    /// When `is_last` is set and EOI-on-send is configured, EOI is
    /// asserted together with DAV and released with it.
    pub fn write_byte(&mut self, db: u8, is_last: bool) -> Result<(), HandshakeError> {
        let abort = if self.is_controller() {
            WaitAbort::None
        } else {
            WaitAbort::Write
        };
        let with_eoi = self.cfg.eoi && is_last;
        let assert_mask = if with_eoi {
            Ctrl::DAV.bits() | Ctrl::EOI.bits()
        } else {
            Ctrl::DAV.bits()
        };

        // All listeners present and attending.
        self.wait_ctrl(Ctrl::NDAC, true, 4, abort)?;
        // All listeners ready for data.
        self.wait_ctrl(Ctrl::NRFD, false, 5, abort)?;

        // Present the byte and declare it valid.
        self.pins.write_data_bus(db);
        self.pins.set_control(0x00, assert_mask, PinOp::Level);

        // Handshake started: slowest listener goes busy.
        self.wait_ctrl(Ctrl::NRFD, true, 7, abort)?;
        // Data accepted by every listener.
        self.wait_ctrl(Ctrl::NDAC, false, 8, abort)?;

        // Withdraw the byte.
        self.pins.set_control(assert_mask, assert_mask, PinOp::Level);
        self.pins.release_data_bus();

        Ok(())
    }

    /// Send a payload followed by the configured EOS terminator bytes.
    ///
    /// In controller role the configured device is addressed to listen
    /// first (unless it still is from a previous partial send), and the
    /// bus is unaddressed afterwards unless `keep_addressed` marks this
    /// as the leading fragment of an oversized line.
    pub fn send_data(&mut self, data: &[u8], keep_addressed: bool) -> Result<(), HandshakeError> {
        if self.is_controller() {
            if !self.have_addressed_device() {
                let addr = self.cfg.paddr;
                self.address_listen(addr)?;
            }
            self.set_controls(ControlState::Ctas);
        } else {
            self.set_controls(ControlState::Dtas);
        }

        // A buffer-overflow fragment is the middle of a line: no
        // terminators yet, and EOI waits for the real final byte.
        let term: &[u8] = if keep_addressed {
            b""
        } else {
            match self.cfg.eos & 3 {
                0 => b"\r\n",
                1 => b"\r",
                2 => b"\n",
                _ => b"",
            }
        };

        let total = data.len() + term.len();
        let mut sent = 0usize;
        let mut result = Ok(());
        for &db in data.iter().chain(term.iter()) {
            sent += 1;
            if let Err(e) = self.write_byte(db, !keep_addressed && sent == total) {
                log::debug!("send aborted after {} bytes: {:?}", sent - 1, e);
                result = Err(e);
                break;
            }
        }

        if self.is_controller() {
            if !keep_addressed {
                let _ = self.unaddress();
            }
            self.set_controls(ControlState::Cids);
        } else {
            self.set_controls(ControlState::Dids);
        }

        result
    }
}
