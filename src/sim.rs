//! In-memory loopback bus.
//!
//! Models the sixteen GPIB wires as wired-AND lines with two parties on
//! them: the adapter under test (through the [`GpibPins`] primitives)
//! and a scripted remote party.  Time is virtual; every pin observation
//! advances it a little and gives the remote a chance to react, so the
//! blocking handshakes of the bus engine run to completion
//! single-threaded.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use heapless::Vec;

use crate::gpib::cmd;
use crate::pins::{Ctrl, GpibPins, Level, PinOp};
use crate::util::time::Ticker;

/// Virtual microseconds consumed by one control-line sample.
const POLL_STEP_US: u64 = 10;

/// The wires, as seen and driven by both parties.
#[derive(Default)]
pub struct Wire {
    pub(crate) our_dir: u8,
    pub(crate) our_lvl: u8,
    pub(crate) our_data_drive: bool,
    pub(crate) our_data: u8,
    pub(crate) rem_dir: u8,
    pub(crate) rem_lvl: u8,
    pub(crate) rem_data_drive: bool,
    pub(crate) rem_data: u8,
}

impl Wire {
    /// Resolved level of one control line: high unless some driver
    /// holds it low.
    pub fn level(&self, line: Ctrl) -> Level {
        let b = line.bits();
        let our_low = self.our_dir & b != 0 && self.our_lvl & b == 0;
        let rem_low = self.rem_dir & b != 0 && self.rem_lvl & b == 0;
        if our_low || rem_low {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Resolved logical data byte (a bit is 1 when some driver pulls
    /// the wire low).
    pub fn data(&self) -> u8 {
        let mut v = 0;
        if self.our_data_drive {
            v |= self.our_data;
        }
        if self.rem_data_drive {
            v |= self.rem_data;
        }
        v
    }

    pub fn rem_assert(&mut self, lines: Ctrl) {
        self.rem_dir |= lines.bits();
        self.rem_lvl &= !lines.bits();
    }

    pub fn rem_release(&mut self, lines: Ctrl) {
        self.rem_dir &= !lines.bits();
        self.rem_lvl |= lines.bits();
    }

    pub fn rem_put_data(&mut self, db: u8) {
        self.rem_data_drive = true;
        self.rem_data = db;
    }

    pub fn rem_float_data(&mut self) {
        self.rem_data_drive = false;
    }
}

/// The remote party on the simulated bus.
pub trait Remote {
    fn tick(&mut self, wire: &mut Wire, now_us: u64);
}

/// A bus with nobody else on it.
pub struct IdleRemote;

impl Remote for IdleRemote {
    fn tick(&mut self, _wire: &mut Wire, _now_us: u64) {}
}

/// The simulated bus: implements the pin adapter and the clock for the
/// engine, stepping the remote party as a side effect of being
/// observed.
pub struct SimBus<R: Remote> {
    pub wire: Wire,
    pub remote: R,
    now_us: u64,
}

impl<R: Remote> SimBus<R> {
    pub fn new(remote: R) -> Self {
        Self {
            wire: Wire::default(),
            remote,
            now_us: 0,
        }
    }

    fn step(&mut self, us: u64) {
        self.now_us += us;
        self.remote.tick(&mut self.wire, self.now_us);
    }
}

impl<R: Remote> GpibPins for SimBus<R> {
    fn read_data_bus(&mut self) -> u8 {
        self.wire.our_data_drive = false;
        self.step(1);
        self.wire.data()
    }

    fn write_data_bus(&mut self, db: u8) {
        self.wire.our_data_drive = true;
        self.wire.our_data = db;
        self.step(1);
    }

    fn set_control(&mut self, bits: u8, mask: u8, op: PinOp) {
        match op {
            PinOp::Direction => {
                self.wire.our_dir = (self.wire.our_dir & !mask) | (bits & mask);
            }
            PinOp::Level => {
                self.wire.our_lvl = (self.wire.our_lvl & !mask) | (bits & mask);
            }
        }
        self.step(1);
    }

    fn read_control(&mut self, line: Ctrl) -> Level {
        self.step(POLL_STEP_US);
        self.wire.level(line)
    }
}

impl<R: Remote> Ticker for SimBus<R> {
    fn now_ms(&mut self) -> u64 {
        self.step(1);
        self.now_us / 1000
    }

    fn delay_us(&mut self, us: u32) {
        let mut left = u64::from(us);
        while left > 0 {
            let chunk = left.min(POLL_STEP_US);
            self.step(chunk);
            left -= chunk;
        }
    }
}

/// Listener-side handshake engine for remote parties.
#[derive(Default)]
struct Acceptor {
    phase: u8,
}

impl Acceptor {
    /// Returns the byte (and the EOI level sampled with it) when one
    /// completes.
    fn tick(&mut self, wire: &mut Wire) -> Option<(u8, bool)> {
        match self.phase {
            0 => {
                wire.rem_assert(Ctrl::NDAC);
                wire.rem_release(Ctrl::NRFD);
                self.phase = 1;
                None
            }
            1 => {
                if wire.level(Ctrl::DAV).is_low() {
                    let db = wire.data();
                    let eoi = wire.level(Ctrl::EOI).is_low();
                    wire.rem_assert(Ctrl::NRFD);
                    wire.rem_release(Ctrl::NDAC);
                    self.phase = 2;
                    Some((db, eoi))
                } else {
                    None
                }
            }
            _ => {
                if wire.level(Ctrl::DAV).is_high() {
                    wire.rem_assert(Ctrl::NDAC);
                    wire.rem_release(Ctrl::NRFD);
                    self.phase = 1;
                }
                None
            }
        }
    }

    fn detach(&mut self, wire: &mut Wire) {
        wire.rem_release(Ctrl::NRFD.union(Ctrl::NDAC));
        self.phase = 0;
    }
}

/// Talker-side handshake engine for remote parties.
#[derive(Default)]
struct Source {
    phase: u8,
}

impl Source {
    /// Returns true once the offered byte has been accepted.
    fn tick(&mut self, wire: &mut Wire, db: u8, eoi: bool) -> bool {
        match self.phase {
            0 => {
                if wire.level(Ctrl::NDAC).is_low() && wire.level(Ctrl::NRFD).is_high() {
                    wire.rem_put_data(db);
                    wire.rem_assert(Ctrl::DAV);
                    if eoi {
                        wire.rem_assert(Ctrl::EOI);
                    }
                    self.phase = 1;
                }
                false
            }
            _ => {
                if wire.level(Ctrl::NDAC).is_high() {
                    wire.rem_release(Ctrl::DAV.union(Ctrl::EOI));
                    wire.rem_float_data();
                    self.phase = 0;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// A simulated instrument: accepts multiline commands, listens when
/// addressed, talks back its scripted reply, answers serial polls, and
/// holds SRQ while its RQS bit is set.
pub struct InstrumentSim {
    pub my_addr: u8,
    /// Status byte returned to a serial poll; bit 6 drives SRQ.
    pub status: u8,
    /// Bytes this instrument will talk when addressed, with per-byte
    /// EOI.
    pub reply: Vec<(u8, bool), 64>,
    /// Every multiline command byte seen while ATN was low.
    pub seen_cmds: Vec<u8, 64>,
    /// Every data byte accepted as an addressed listener.
    pub seen_data: Vec<u8, 512>,
    /// EOI level observed with the most recent data byte.
    pub last_data_eoi: bool,
    listener: bool,
    talker: bool,
    spoll: bool,
    cmd_mode: bool,
    reply_idx: usize,
    acceptor: Acceptor,
    source: Source,
}

impl InstrumentSim {
    pub fn new(my_addr: u8) -> Self {
        Self {
            my_addr,
            status: 0,
            reply: Vec::new(),
            seen_cmds: Vec::new(),
            seen_data: Vec::new(),
            last_data_eoi: false,
            listener: false,
            talker: false,
            spoll: false,
            cmd_mode: false,
            reply_idx: 0,
            acceptor: Acceptor::default(),
            source: Source::default(),
        }
    }

    /// Queue a reply payload, asserting EOI with the final byte.
    pub fn set_reply(&mut self, payload: &[u8]) {
        self.reply.clear();
        for (i, &b) in payload.iter().enumerate() {
            self.reply
                .push((b, i + 1 == payload.len()))
                .expect("reply too long");
        }
        self.reply_idx = 0;
    }

    fn on_command(&mut self, db: u8) {
        let _ = self.seen_cmds.push(db);
        match db {
            cmd::UNL => self.listener = false,
            cmd::UNT => self.talker = false,
            cmd::SPE => self.spoll = true,
            cmd::SPD => self.spoll = false,
            _ if db == cmd::LAD + self.my_addr => self.listener = true,
            _ if db == cmd::TAD + self.my_addr => {
                self.talker = true;
                self.reply_idx = 0;
            }
            _ => {}
        }
    }
}

impl Remote for InstrumentSim {
    fn tick(&mut self, wire: &mut Wire, _now_us: u64) {
        // SRQ follows the RQS bit.
        if self.status & 0x40 != 0 {
            wire.rem_assert(Ctrl::SRQ);
        } else {
            wire.rem_release(Ctrl::SRQ);
        }

        if wire.level(Ctrl::ATN).is_low() {
            // Every device accepts multiline commands; a talker caught
            // mid-byte stops driving.
            if !self.cmd_mode {
                self.cmd_mode = true;
                self.acceptor = Acceptor::default();
                self.source = Source::default();
                wire.rem_release(Ctrl::DAV.union(Ctrl::EOI));
                wire.rem_float_data();
            }
            if let Some((db, _)) = self.acceptor.tick(wire) {
                self.on_command(db);
            }
            return;
        }

        if self.cmd_mode {
            self.cmd_mode = false;
            if !self.listener {
                self.acceptor.detach(wire);
            }
            self.source = Source::default();
        }

        if self.talker && self.spoll {
            let status = self.status;
            if self.source.tick(wire, status, false) {
                // Polled: RQS clears and SRQ releases.
                self.talker = false;
                self.status &= !0x40;
            }
        } else if self.talker {
            if self.reply_idx < self.reply.len() {
                let (db, eoi) = self.reply[self.reply_idx];
                if self.source.tick(wire, db, eoi) {
                    self.reply_idx += 1;
                }
            }
        } else if self.listener {
            if let Some((db, eoi)) = self.acceptor.tick(wire) {
                let _ = self.seen_data.push(db);
                self.last_data_eoi = eoi;
            }
        } else {
            self.acceptor.detach(wire);
        }
    }
}

/// One scripted action of a [`ControllerSim`].
#[derive(Clone, Copy, Debug)]
pub enum CtlOp {
    /// Drive or release ATN.
    Atn(bool),
    /// Source one byte with the talker handshake (commands while ATN is
    /// held low, data otherwise).
    Send(u8),
    /// Source one byte with EOI asserted alongside it.
    SendEoi(u8),
    /// Accept this many bytes with the listener handshake.
    Recv(usize),
    /// Let this much virtual time pass.
    Pause(u64),
}

/// A scripted controller-in-charge, used to exercise the device role.
pub struct ControllerSim {
    ops: Vec<CtlOp, 32>,
    idx: usize,
    pause_until: u64,
    remaining: usize,
    pub received: Vec<u8, 256>,
    acceptor: Acceptor,
    source: Source,
}

impl ControllerSim {
    pub fn new(ops: &[CtlOp]) -> Self {
        let mut v = Vec::new();
        for &op in ops {
            v.push(op).expect("controller script too long");
        }
        Self {
            ops: v,
            idx: 0,
            pause_until: 0,
            remaining: 0,
            received: Vec::new(),
            acceptor: Acceptor::default(),
            source: Source::default(),
        }
    }

    pub fn done(&self) -> bool {
        self.idx >= self.ops.len()
    }
}

impl Remote for ControllerSim {
    fn tick(&mut self, wire: &mut Wire, now_us: u64) {
        let Some(&op) = self.ops.get(self.idx) else {
            return;
        };
        match op {
            CtlOp::Atn(assert) => {
                if assert {
                    wire.rem_assert(Ctrl::ATN);
                } else {
                    wire.rem_release(Ctrl::ATN);
                }
                self.idx += 1;
            }
            CtlOp::Send(db) => {
                if self.source.tick(wire, db, false) {
                    self.idx += 1;
                }
            }
            CtlOp::SendEoi(db) => {
                if self.source.tick(wire, db, true) {
                    self.idx += 1;
                }
            }
            CtlOp::Recv(n) => {
                if self.remaining == 0 {
                    self.remaining = n;
                    self.acceptor = Acceptor::default();
                }
                if let Some((db, _)) = self.acceptor.tick(wire) {
                    let _ = self.received.push(db);
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.acceptor.detach(wire);
                        self.idx += 1;
                    }
                }
            }
            CtlOp::Pause(us) => {
                if self.pause_until == 0 {
                    self.pause_until = now_us + us;
                } else if now_us >= self.pause_until {
                    self.pause_until = 0;
                    self.idx += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wired_and_resolution() {
        let mut wire = Wire::default();
        assert_eq!(wire.level(Ctrl::DAV), Level::High);
        wire.rem_assert(Ctrl::DAV);
        assert_eq!(wire.level(Ctrl::DAV), Level::Low);
        wire.rem_release(Ctrl::DAV);
        assert_eq!(wire.level(Ctrl::DAV), Level::High);
    }

    #[test]
    fn data_bus_is_logical_or_of_drivers() {
        let mut wire = Wire::default();
        wire.rem_put_data(0x41);
        assert_eq!(wire.data(), 0x41);
        wire.our_data_drive = true;
        wire.our_data = 0x10;
        assert_eq!(wire.data(), 0x51);
        wire.rem_float_data();
        assert_eq!(wire.data(), 0x10);
    }

    #[test]
    fn pin_adapter_loopback_round_trips() {
        let mut bus = SimBus::new(IdleRemote);
        for db in [0x00u8, 0x41, 0xA5, 0xFF] {
            bus.write_data_bus(db);
            // Another party reading the wires sees the byte we drive.
            assert_eq!(bus.wire.data(), db);
        }
    }
}
