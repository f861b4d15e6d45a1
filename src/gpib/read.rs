//! Listener-side byte handshake and the receive loop.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use super::{ControlState, GpibBus, HandshakeError, WaitAbort};
use crate::host::HostPort;
use crate::pins::{Ctrl, GpibPins, PinOp};
use crate::util::time::{Deadline, Ticker};

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const ETX: u8 = 0x03;

/// How a receive loop finished, when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveEnd {
    /// EOI was asserted with the final byte.
    Eoi,
    /// The user-specified end byte arrived.
    EndByte,
    /// The configured terminator sequence arrived.
    Terminator,
    /// The host interrupted with a `++` command or the break flag.
    Break,
    /// ATN asserted (device role: the controller wants to address).
    Atn,
    /// IFC asserted.
    Ifc,
}

/// Hook polled between received bytes so the host link can interrupt a
/// long transfer.
pub trait BreakCheck {
    fn pending_break(&mut self, host: &mut dyn HostPort) -> bool;
}

/// A no-op hook for callers with nothing to interrupt for.
pub struct NoBreak;

impl BreakCheck for NoBreak {
    fn pending_break(&mut self, _host: &mut dyn HostPort) -> bool {
        false
    }
}

impl<P: GpibPins + Ticker> GpibBus<P> {
    /// Wait for `line` to reach the wanted level, with the configured
    /// per-stage timeout and the device-role abort rules.
    pub(crate) fn wait_ctrl(
        &mut self,
        line: Ctrl,
        want_low: bool,
        stage: u8,
        abort: WaitAbort,
    ) -> Result<(), HandshakeError> {
        let rtmo = u64::from(self.cfg.rtmo);
        let deadline = Deadline::after_ms(&mut self.pins, rtmo);
        loop {
            match abort {
                WaitAbort::None => {}
                WaitAbort::Read { atn_at_start } => {
                    if self.is_asserted(Ctrl::IFC) {
                        return Err(HandshakeError::Ifc);
                    }
                    if atn_at_start && !self.is_asserted(Ctrl::ATN) {
                        return Err(HandshakeError::Atn);
                    }
                }
                WaitAbort::Write => {
                    if self.is_asserted(Ctrl::IFC) {
                        self.set_controls(ControlState::Dlas);
                        return Err(HandshakeError::Ifc);
                    }
                    if self.is_asserted(Ctrl::ATN) {
                        self.set_controls(ControlState::Dlas);
                        return Err(HandshakeError::Atn);
                    }
                }
            }
            if self.pins.read_control(line).is_low() == want_low {
                return Ok(());
            }
            if deadline.expired(&mut self.pins) {
                return Err(HandshakeError::Timeout(stage));
            }
        }
    }

    /// Accept one byte with the three-wire handshake.  The caller must
    /// already be in CLAS or DLAS.
    ///
    /// Returns the byte and whether EOI accompanied it (only sampled
    /// when `with_eoi` is set).
    pub fn read_byte(&mut self, with_eoi: bool) -> Result<(u8, bool), HandshakeError> {
        let abort = if self.is_controller() {
            WaitAbort::None
        } else {
            WaitAbort::Read {
                atn_at_start: self.is_asserted(Ctrl::ATN),
            }
        };

        // Ready for data: release NRFD.
        self.pins
            .set_control(Ctrl::NRFD.bits(), Ctrl::NRFD.bits(), PinOp::Level);

        // Talker signals data valid.
        self.wait_ctrl(Ctrl::DAV, true, 6, abort)?;

        // Busy reading: assert NRFD, sample EOI and the data lines.
        self.pins.set_control(0x00, Ctrl::NRFD.bits(), PinOp::Level);
        let eoi = with_eoi && self.is_asserted(Ctrl::EOI);
        let db = self.pins.read_data_bus();

        // Data accepted: release NDAC.
        self.pins
            .set_control(Ctrl::NDAC.bits(), Ctrl::NDAC.bits(), PinOp::Level);

        // Talker withdraws the data.
        self.wait_ctrl(Ctrl::DAV, false, 8, abort)?;

        // Re-arm for the next byte.
        self.pins.set_control(0x00, Ctrl::NDAC.bits(), PinOp::Level);

        Ok((db, eoi))
    }

    /// Receive data until a terminator, forwarding each byte to the
    /// host.
    ///
    /// `detect_eoi` forces EOI-terminated reads regardless of the
    /// configured terminator; `end_byte` selects a single terminating
    /// byte instead of the EOR sequence.
    pub fn receive_data(
        &mut self,
        host: &mut dyn HostPort,
        brk: &mut dyn BreakCheck,
        detect_eoi: bool,
        end_byte: Option<u8>,
    ) -> Result<ReceiveEnd, HandshakeError> {
        let eor = self.cfg.eor & 7;
        let mut read_with_eoi = self.cfg.eoi || detect_eoi || self.cfg.eor == 7;

        self.tx_break = false;

        if self.is_controller() {
            let addr = self.cfg.paddr;
            self.address_talk(addr)?;
            self.set_controls(ControlState::Clas);
        } else {
            self.set_controls(ControlState::Dlas);
            // A device always honors EOI from the talker.
            read_with_eoi = true;
        }
        self.pins.release_data_bus();

        let mut window = [0u8; 3];
        let mut eoi_detected = false;

        let outcome = loop {
            if self.take_break() || brk.pending_break(host) {
                break Ok(ReceiveEnd::Break);
            }
            if self.is_asserted(Ctrl::ATN) {
                break Ok(ReceiveEnd::Atn);
            }

            match self.read_byte(read_with_eoi) {
                Ok((db, eoi)) => {
                    host.write_all(&[db]);
                    window[2] = window[1];
                    window[1] = window[0];
                    window[0] = db;

                    if read_with_eoi {
                        if eoi {
                            eoi_detected = true;
                            break Ok(ReceiveEnd::Eoi);
                        }
                    } else if let Some(eb) = end_byte {
                        if db == eb {
                            break Ok(ReceiveEnd::EndByte);
                        }
                    } else if terminator_detected(&window, eor) {
                        break Ok(ReceiveEnd::Terminator);
                    }
                }
                Err(HandshakeError::Atn) => break Ok(ReceiveEnd::Atn),
                Err(HandshakeError::Ifc) => break Ok(ReceiveEnd::Ifc),
                Err(e) => break Err(e),
            }
        };

        if eoi_detected && self.cfg.eot_en {
            let eot = self.cfg.eot_ch;
            host.write_all(&[eot]);
        }

        // Return to a defined idle state whatever happened.
        if self.is_controller() {
            let _ = self.unaddress();
            self.set_controls(ControlState::Cids);
        } else {
            self.set_controls(ControlState::Dids);
        }
        self.tx_break = false;

        outcome
    }
}

/// Check the last bytes received against the configured terminator
/// sequence.  `window[0]` is the newest byte.
fn terminator_detected(window: &[u8; 3], eor: u8) -> bool {
    match eor {
        1 => window[0] == CR,
        2 => window[0] == LF,
        // Rely on EOI or timeout only.
        3 | 7 => false,
        // Keithley instruments can use LF+CR instead of CR+LF.
        4 => window[0] == CR && window[1] == LF,
        // Solartron and friends can terminate with ETX.
        5 => window[0] == ETX,
        6 => window[0] == ETX && window[1] == LF && window[2] == CR,
        // CR+LF, also the fallback.
        _ => window[0] == LF && window[1] == CR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_terminator_needs_both_bytes() {
        assert!(terminator_detected(&[LF, CR, 0], 0));
        assert!(!terminator_detected(&[LF, 0, 0], 0));
        assert!(!terminator_detected(&[CR, LF, 0], 0));
    }

    #[test]
    fn single_byte_terminators() {
        assert!(terminator_detected(&[CR, 0, 0], 1));
        assert!(terminator_detected(&[LF, 0, 0], 2));
        assert!(terminator_detected(&[ETX, 0, 0], 5));
    }

    #[test]
    fn no_terminator_modes_never_match() {
        for b in [CR, LF, ETX, b'x'] {
            assert!(!terminator_detected(&[b, CR, LF], 3));
            assert!(!terminator_detected(&[b, CR, LF], 7));
        }
    }

    #[test]
    fn three_byte_terminator() {
        assert!(terminator_detected(&[ETX, LF, CR], 6));
        assert!(!terminator_detected(&[ETX, CR, LF], 6));
    }
}
