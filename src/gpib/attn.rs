//! Device-role attention service.
//!
//! Runs when the controller asserts ATN.  Captures the multiline
//! command burst with the listener handshake, classifies it, and acts
//! once ATN releases.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use heapless::Vec;

use super::read::NoBreak;
use super::{cmd, ControlState, GpibBus, HandshakeError};
use crate::constants::ATN_BURST_LEN;
use crate::host::HostPort;
use crate::pins::{Ctrl, GpibPins};
use crate::util::time::Ticker;

/// Device-role pass-through modes that change how addressing is
/// honored.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttnOptions {
    /// Receive all bus traffic regardless of addressing.
    pub promiscuous: bool,
    /// Listen-only mode.
    pub listen_only: bool,
}

/// What the caller still has to do after the service returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttnOutcome {
    /// We are addressed to talk: send any pending host data.
    pub talk: bool,
    /// A device clear was addressed to us; the caller performs the soft
    /// reset.
    pub soft_reset: bool,
}

impl<P: GpibPins + Ticker> GpibBus<P> {
    /// Service an ATN assertion.  Returns once ATN has released and all
    /// immediately-executable commands have been handled.
    pub fn attention_required(
        &mut self,
        host: &mut dyn HostPort,
        opts: AttnOptions,
    ) -> AttnOutcome {
        let mut outcome = AttnOutcome::default();
        let my_lad = cmd::LAD + self.cfg.paddr;
        let my_tad = cmd::TAD + self.cfg.paddr;

        // Participate in the command handshake.
        self.set_controls(ControlState::Dlas);

        let mut burst: Vec<u8, ATN_BURST_LEN> = Vec::new();
        while self.is_asserted(Ctrl::ATN) {
            match self.read_byte(false) {
                Ok((db, _)) => {
                    if burst.push(db).is_err() {
                        log::warn!("attention burst overflow, byte 0x{:02x} dropped", db);
                    }
                }
                Err(HandshakeError::Atn) | Err(HandshakeError::Ifc) => break,
                // No byte within the timeout; the controller may just be
                // pausing, so re-check ATN and keep waiting.
                Err(HandshakeError::Timeout(_)) => {}
            }
        }

        // Classify the burst in arrival order: UNL then LAD+us leaves
        // us listening, LAD+us then UNL does not.
        let mut addressed_listen = false;
        let mut addressed_talk = false;
        let mut primaries: Vec<u8, ATN_BURST_LEN> = Vec::new();
        for &db in &burst {
            match db {
                cmd::UNL => addressed_listen = false,
                cmd::UNT => addressed_talk = false,
                _ if db == my_lad => addressed_listen = true,
                _ if db == my_tad => addressed_talk = true,
                0x60..=0x7F => {
                    // Secondary address, used only by storage extensions.
                    self.cfg.saddr = db - cmd::SAD;
                }
                0x00..=0x1F => {
                    if primaries.push(db).is_err() {
                        log::warn!("primary command 0x{:02x} dropped", db);
                    }
                }
                _ => {
                    // Some other node's listen or talk address.  Ignored
                    // unless a pass-through mode is active, which is
                    // handled below.
                }
            }
        }

        // In a pass-through mode the device listens no matter who was
        // addressed.
        if opts.promiscuous || opts.listen_only {
            let _ = self.receive_data(host, &mut NoBreak, false, None);
            return outcome;
        }

        // The queued primary commands run once ATN has released.
        for &p in &primaries {
            match p {
                cmd::SDC if addressed_listen => {
                    outcome.soft_reset = true;
                    self.request_reset();
                }
                cmd::DCL => {
                    outcome.soft_reset = true;
                    self.request_reset();
                }
                cmd::SPE => self.spoll_enabled = true,
                cmd::SPD => {
                    self.spoll_enabled = false;
                    self.set_controls(ControlState::Dids);
                }
                // GTL, LLO, GET and the rest need no local action in an
                // interface adapter.
                _ => {}
            }
        }

        // Finally the data phase, if we are still addressed.
        if addressed_talk && self.spoll_enabled {
            self.send_status();
        } else if addressed_talk {
            self.set_controls(ControlState::Dtas);
            outcome.talk = true;
        } else if addressed_listen {
            let _ = self.receive_data(host, &mut NoBreak, false, None);
        } else if self.state() == Some(ControlState::Dlas) {
            // Nothing for us in this burst.
            self.set_controls(ControlState::Dids);
        }

        outcome
    }
}
