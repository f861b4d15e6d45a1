//! The GPIB bus engine.
//!
//! Owns the bus-role state machine, the configuration record and the
//! addressing state, and drives the wires through a [`GpibPins`]
//! adapter.  The byte-level handshakes live in [`read`] and [`write`],
//! the device-role attention service in [`attn`].

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod attn;
pub mod read;
pub mod write;

use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::{Config, Mode};
use crate::host::{respond, HostPort};
use crate::pins::{Ctrl, GpibPins, PinOp};
use crate::util::time::bus::{
    ALL_CLEAR_STAGE_MS, IFC_PULSE_US, MODE_SETTLE_US, PPOLL_HOLD_US, UNADDRESS_SETTLE_US,
};
use crate::util::time::Ticker;

/// IEEE-488.1 multiline command bytes.
pub mod cmd {
    /// Go to local.
    pub const GTL: u8 = 0x01;
    /// Selected device clear.
    pub const SDC: u8 = 0x04;
    /// Group execute trigger.
    pub const GET: u8 = 0x08;
    /// Local lockout.
    pub const LLO: u8 = 0x11;
    /// Universal device clear.
    pub const DCL: u8 = 0x14;
    /// Parallel poll unconfigure.
    pub const PPU: u8 = 0x15;
    /// Serial poll enable.
    pub const SPE: u8 = 0x18;
    /// Serial poll disable.
    pub const SPD: u8 = 0x19;
    /// Listen address base (LAD+n addresses device n to listen).
    pub const LAD: u8 = 0x20;
    /// Talk address base.
    pub const TAD: u8 = 0x40;
    /// Secondary address base.
    pub const SAD: u8 = 0x60;
    /// Unlisten.
    pub const UNL: u8 = 0x3F;
    /// Untalk.
    pub const UNT: u8 = 0x5F;
}

/// Bus-role states.  `C*` states apply to the controller role, `D*` to
/// the device role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Controller power-on initialisation.
    Cini,
    /// Controller idle.
    Cids,
    /// Controller sending a multiline command (ATN asserted).
    Ccms,
    /// Controller talking to an addressed listener.
    Ctas,
    /// Controller listening to an addressed talker.
    Clas,
    /// Device power-on initialisation.
    Dini,
    /// Device idle, ready to honor ATN.
    Dids,
    /// Device actively listening.
    Dlas,
    /// Device actively talking.
    Dtas,
}

/// Error from a single byte handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// IFC asserted mid-handshake (device role).
    Ifc,
    /// ATN changed mid-handshake (device role); the controller wants to
    /// address.
    Atn,
    /// The wait at this stage exhausted the configured timeout.
    Timeout(u8),
}

/// Which abort conditions a handshake wait watches (device role only).
#[derive(Clone, Copy)]
pub(crate) enum WaitAbort {
    None,
    /// A listener-side read: abort when ATN releases after having been
    /// asserted at the start of the byte (command burst over).
    Read { atn_at_start: bool },
    /// A talker-side write: abort as soon as ATN asserts.
    Write,
}

// Attention/SRQ flags raised by the line-change interrupt (or the
// simulation's hook) and consumed by the service loop.  They are
// advisory: the consumer re-samples the lines.
static ATN_FLAG: AtomicBool = AtomicBool::new(false);
static SRQ_FLAG: AtomicBool = AtomicBool::new(false);

/// Note an ATN edge.  Called from the platform's line-change interrupt
/// or from a test harness.
pub fn signal_atn() {
    ATN_FLAG.store(true, Ordering::Relaxed);
}

/// Note an SRQ edge.
pub fn signal_srq() {
    SRQ_FLAG.store(true, Ordering::Relaxed);
}

pub(crate) fn take_atn() -> bool {
    ATN_FLAG.swap(false, Ordering::Relaxed)
}

pub(crate) fn take_srq() -> bool {
    SRQ_FLAG.swap(false, Ordering::Relaxed)
}

/// The bus engine.
pub struct GpibBus<P: GpibPins + Ticker> {
    pub(crate) pins: P,
    pub cfg: Config,
    cstate: Option<ControlState>,
    device_addressed: bool,
    pub(crate) tx_break: bool,
    reset_requested: bool,
    /// Device role: between SPE and SPD the next talk addressing means
    /// "send the status byte".
    pub(crate) spoll_enabled: bool,
}

impl<P: GpibPins + Ticker> GpibBus<P> {
    pub fn new(pins: P, cfg: Config) -> Self {
        Self {
            pins,
            cfg,
            cstate: None,
            device_addressed: false,
            tx_break: false,
            reset_requested: false,
            spoll_enabled: false,
        }
    }

    /// Enter the configured role.  Called once at boot and again on a
    /// `++mode` switch.
    pub fn begin(&mut self) {
        if self.is_controller() {
            self.start_controller_mode();
        } else {
            self.start_device_mode();
        }
    }

    /// Release every control line to input with pull-up and float the
    /// data bus.  Precedes any role switch.
    pub fn stop(&mut self) {
        self.cstate = None;
        self.pins.set_control(0x00, 0xFF, PinOp::Direction);
        self.pins.set_control(0xFF, 0xFF, PinOp::Level);
        self.pins.release_data_bus();
    }

    pub fn start_device_mode(&mut self) {
        self.stop();
        self.pins.delay_us(MODE_SETTLE_US);
        self.cfg.cmode = Mode::Device;
        self.set_controls(ControlState::Dini);
        self.set_controls(ControlState::Dids);
    }

    pub fn start_controller_mode(&mut self) {
        // Return all devices to local before seizing the bus.
        self.send_all_clear();
        self.stop();
        self.pins.delay_us(MODE_SETTLE_US);
        self.cfg.cmode = Mode::Controller;
        self.set_controls(ControlState::Cini);
        self.set_controls(ControlState::Cids);
        self.send_ifc();
        if self.cfg.paddr > 1 {
            // Address the configured device up front; it stays
            // addressed until something unlistens the bus.
            let addr = self.cfg.paddr;
            if self.address_listen(addr).is_err() {
                log::debug!("no listener at {} during startup", addr);
            }
            self.set_controls(ControlState::Cids);
        }
    }

    pub fn is_controller(&self) -> bool {
        self.cfg.is_controller()
    }

    pub fn state(&self) -> Option<ControlState> {
        self.cstate
    }

    pub fn have_addressed_device(&self) -> bool {
        self.device_addressed
    }

    pub fn is_asserted(&mut self, line: Ctrl) -> bool {
        self.pins.read_control(line).is_low()
    }

    /// Request the receive loop to stop after the byte in flight.
    pub fn signal_break(&mut self) {
        self.tx_break = true;
    }

    pub(crate) fn take_break(&mut self) -> bool {
        core::mem::take(&mut self.tx_break)
    }

    /// Ask the platform for a soft reset.  Raised by `++rst` and by a
    /// selected device clear in device role.
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    pub fn take_reset_request(&mut self) -> bool {
        core::mem::take(&mut self.reset_requested)
    }

    /// Drive the control lines into one of the predefined bus states.
    ///
    /// Each state is a (direction, level) recipe over a masked subset of
    /// the eight control lines; lines outside the mask keep whatever the
    /// previous state left them with.
    pub fn set_controls(&mut self, state: ControlState) {
        const ATN: u8 = Ctrl::ATN.bits();
        const EOI_DAV: u8 = Ctrl::EOI.bits() | Ctrl::DAV.bits();
        const NRFD_NDAC: u8 = Ctrl::NRFD.bits() | Ctrl::NDAC.bits();
        const HANDSHAKE: u8 = EOI_DAV | NRFD_NDAC;

        match state {
            ControlState::Cini => {
                // All lines set up; ATN/REN/EOI/DAV driven, REN asserted.
                self.pins
                    .set_control(ATN | Ctrl::REN.bits() | EOI_DAV, 0xFF, PinOp::Direction);
                self.pins.set_control(!Ctrl::REN.bits(), 0xFF, PinOp::Level);
            }
            ControlState::Cids => {
                self.pins
                    .set_control(ATN | EOI_DAV, ATN | HANDSHAKE, PinOp::Direction);
                self.pins.set_control(0xFF, ATN | HANDSHAKE, PinOp::Level);
            }
            ControlState::Ccms => {
                let mask = ATN | HANDSHAKE | Ctrl::IFC.bits();
                self.pins
                    .set_control(ATN | EOI_DAV | Ctrl::IFC.bits(), mask, PinOp::Direction);
                self.pins.set_control(!ATN, mask, PinOp::Level);
            }
            ControlState::Clas => {
                self.pins
                    .set_control(ATN | NRFD_NDAC, ATN | HANDSHAKE, PinOp::Direction);
                self.pins
                    .set_control(!NRFD_NDAC, ATN | HANDSHAKE, PinOp::Level);
            }
            ControlState::Ctas => {
                self.pins
                    .set_control(ATN | EOI_DAV, ATN | HANDSHAKE, PinOp::Direction);
                self.pins.set_control(0xFF, ATN | HANDSHAKE, PinOp::Level);
            }
            ControlState::Dini => {
                self.pins.set_control(0x00, 0xFF, PinOp::Direction);
                self.pins.set_control(0xFF, 0xFF, PinOp::Level);
                self.pins.release_data_bus();
            }
            ControlState::Dids => {
                let mask = Ctrl::DAV.bits() | NRFD_NDAC;
                self.pins.set_control(0x00, mask, PinOp::Direction);
                self.pins.set_control(0xFF, mask, PinOp::Level);
                self.pins.release_data_bus();
            }
            ControlState::Dlas => {
                self.pins
                    .set_control(NRFD_NDAC, HANDSHAKE, PinOp::Direction);
                self.pins.set_control(!NRFD_NDAC, HANDSHAKE, PinOp::Level);
            }
            ControlState::Dtas => {
                self.pins.set_control(EOI_DAV, HANDSHAKE, PinOp::Direction);
                self.pins.set_control(EOI_DAV, HANDSHAKE, PinOp::Level);
            }
        }
        log::trace!("bus state {:?}", state);
        self.cstate = Some(state);
    }

    /// Raw (bits, mask, mode) access for the diagnostic command.
    pub fn set_control_val(&mut self, bits: u8, mask: u8, op: PinOp) {
        self.pins.set_control(bits, mask, op);
    }

    /// Drive the data bus directly for the diagnostic command.
    pub fn set_data_val(&mut self, db: u8) {
        self.pins.write_data_bus(db);
    }

    /// Pulse IFC low.  Places all devices in idle and makes this node
    /// controller-in-charge.
    pub fn send_ifc(&mut self) {
        self.pins
            .set_control(Ctrl::IFC.bits(), Ctrl::IFC.bits(), PinOp::Direction);
        self.pins.set_control(0x00, Ctrl::IFC.bits(), PinOp::Level);
        self.pins.delay_us(IFC_PULSE_US);
        self.pins
            .set_control(Ctrl::IFC.bits(), Ctrl::IFC.bits(), PinOp::Level);
    }

    /// Drive or release REN.
    pub fn set_ren(&mut self, assert: bool) {
        self.pins
            .set_control(Ctrl::REN.bits(), Ctrl::REN.bits(), PinOp::Direction);
        let bits = if assert { 0x00 } else { Ctrl::REN.bits() };
        self.pins.set_control(bits, Ctrl::REN.bits(), PinOp::Level);
    }

    /// The power-on sequence that returns every device to local: REN
    /// released, then ATN+REN asserted together, then ATN released.
    pub fn send_all_clear(&mut self) {
        let ren = Ctrl::REN.bits();
        let atn_ren = Ctrl::ATN.bits() | ren;
        self.pins.set_control(atn_ren, atn_ren, PinOp::Direction);
        self.pins.set_control(ren, ren, PinOp::Level);
        self.delay_ms(ALL_CLEAR_STAGE_MS);
        self.pins.set_control(0x00, atn_ren, PinOp::Level);
        self.delay_ms(ALL_CLEAR_STAGE_MS);
        self.pins
            .set_control(Ctrl::ATN.bits(), Ctrl::ATN.bits(), PinOp::Level);
    }

    pub fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.pins.delay_us(1000);
        }
    }

    /// Send one multiline command byte with ATN asserted.
    pub fn send_cmd(&mut self, db: u8) -> Result<(), HandshakeError> {
        if self.cstate != Some(ControlState::Ccms) {
            self.set_controls(ControlState::Ccms);
        }
        self.write_byte(db, false)
    }

    /// Address `addr` to listen (with this controller as talker):
    /// UNL, TAD+own, LAD+addr.
    pub fn address_listen(&mut self, addr: u8) -> Result<(), HandshakeError> {
        self.send_cmd(cmd::UNL)?;
        let own = self.cfg.caddr;
        self.send_cmd(cmd::TAD + own)?;
        self.send_cmd(cmd::LAD + addr)?;
        self.device_addressed = true;
        Ok(())
    }

    /// Address `addr` to talk (with this controller as listener):
    /// UNL, LAD+own, TAD+addr.
    pub fn address_talk(&mut self, addr: u8) -> Result<(), HandshakeError> {
        self.send_cmd(cmd::UNL)?;
        let own = self.cfg.caddr;
        self.send_cmd(cmd::LAD + own)?;
        self.send_cmd(cmd::TAD + addr)?;
        self.device_addressed = true;
        Ok(())
    }

    /// Unlisten and untalk the bus.
    pub fn unaddress(&mut self) -> Result<(), HandshakeError> {
        self.pins.delay_us(UNADDRESS_SETTLE_US);
        self.send_cmd(cmd::UNL)?;
        self.send_cmd(cmd::UNT)?;
        self.device_addressed = false;
        Ok(())
    }

    /// Unlisten the bus and return to idle.
    pub fn send_unl(&mut self) -> Result<(), HandshakeError> {
        self.send_cmd(cmd::UNL)?;
        self.set_controls(ControlState::Cids);
        self.device_addressed = false;
        Ok(())
    }

    /// Untalk the bus and return to idle.
    pub fn send_unt(&mut self) -> Result<(), HandshakeError> {
        self.send_cmd(cmd::UNT)?;
        self.set_controls(ControlState::Cids);
        self.device_addressed = false;
        Ok(())
    }

    /// Address the configured device, send one command byte, unaddress,
    /// and return to idle.
    fn addressed_cmd(&mut self, addr: u8, db: u8) -> Result<(), HandshakeError> {
        let result = (|| {
            self.address_listen(addr)?;
            self.send_cmd(db)?;
            self.unaddress()
        })();
        self.set_controls(ControlState::Cids);
        result
    }

    /// Selected device clear to the configured address.
    pub fn send_sdc(&mut self) -> Result<(), HandshakeError> {
        let addr = self.cfg.paddr;
        self.addressed_cmd(addr, cmd::SDC)
    }

    /// Local lockout of the configured address.
    pub fn send_llo(&mut self) -> Result<(), HandshakeError> {
        let addr = self.cfg.paddr;
        self.addressed_cmd(addr, cmd::LLO)
    }

    /// Return the configured address to local.
    pub fn send_gtl(&mut self) -> Result<(), HandshakeError> {
        let addr = self.cfg.paddr;
        self.addressed_cmd(addr, cmd::GTL)
    }

    /// Group execute trigger to one address.
    pub fn send_get(&mut self, addr: u8) -> Result<(), HandshakeError> {
        self.addressed_cmd(addr, cmd::GET)
    }

    /// An unaddressed universal command (DCL, LLO to all), followed by a
    /// return to idle.
    pub fn send_universal(&mut self, db: u8) -> Result<(), HandshakeError> {
        let result = self.send_cmd(db);
        self.set_controls(ControlState::Cids);
        result
    }

    /// Serial poll the given addresses.  With `all` set, a line
    /// `SRQ:<addr>,<status>` is printed for every device found with the
    /// RQS bit set; otherwise each status byte is printed in decimal.
    pub fn serial_poll(
        &mut self,
        host: &mut dyn HostPort,
        addrs: &[u8],
        all: bool,
    ) -> Result<(), HandshakeError> {
        let result = self.serial_poll_inner(host, addrs, all);
        // Always unwind the poll framing, even after an error.
        let _ = self.send_cmd(cmd::SPD);
        let _ = self.send_cmd(cmd::UNT);
        let _ = self.send_cmd(cmd::UNL);
        self.device_addressed = false;
        self.set_controls(ControlState::Cids);
        result
    }

    fn serial_poll_inner(
        &mut self,
        host: &mut dyn HostPort,
        addrs: &[u8],
        all: bool,
    ) -> Result<(), HandshakeError> {
        self.send_cmd(cmd::UNL)?;
        let own = self.cfg.caddr;
        self.send_cmd(cmd::LAD + own)?;
        self.send_cmd(cmd::SPE)?;
        for &addr in addrs {
            self.send_cmd(cmd::TAD + addr)?;
            self.set_controls(ControlState::Clas);
            match self.read_byte(false) {
                Ok((sb, _eoi)) => {
                    if all {
                        if sb & 0x40 != 0 {
                            respond!(host, "SRQ:{},{}", addr, sb);
                        }
                    } else {
                        respond!(host, "{}", sb);
                    }
                }
                Err(HandshakeError::Timeout(_)) if all => {
                    // Nobody home at this address; keep scanning.
                }
                Err(e) => return Err(e),
            }
            self.set_controls(ControlState::Ccms);
        }
        Ok(())
    }

    /// Parallel poll: assert ATN and EOI together, sample the data bus
    /// without a handshake, release.
    pub fn parallel_poll(&mut self) -> u8 {
        let atn_eoi = Ctrl::ATN.bits() | Ctrl::EOI.bits();
        self.set_controls(ControlState::Cids);
        self.pins.set_control(atn_eoi, atn_eoi, PinOp::Direction);
        self.pins.set_control(0x00, atn_eoi, PinOp::Level);
        self.pins.delay_us(PPOLL_HOLD_US);
        let db = self.pins.read_data_bus();
        self.pins.set_control(atn_eoi, atn_eoi, PinOp::Level);
        self.set_controls(ControlState::Cids);
        db
    }

    /// Device role: answer a serial poll with the configured status
    /// byte, then clear the RQS bit and release SRQ.
    pub fn send_status(&mut self) {
        if self.cstate != Some(ControlState::Dtas) {
            self.set_controls(ControlState::Dtas);
        }
        let stat = self.cfg.stat;
        if let Err(e) = self.write_byte(stat, false) {
            log::debug!("status byte not collected: {:?}", e);
        }
        self.set_controls(ControlState::Dids);
        self.cfg.stat &= !0x40;
        self.clr_srq_sig();
    }

    /// Device role: set the status byte, asserting SRQ when the RQS bit
    /// is included.
    pub fn set_status(&mut self, stat: u8) {
        self.cfg.stat = stat;
        if stat & 0x40 != 0 {
            self.set_srq_sig();
        } else {
            self.clr_srq_sig();
        }
    }

    fn set_srq_sig(&mut self) {
        self.pins
            .set_control(Ctrl::SRQ.bits(), Ctrl::SRQ.bits(), PinOp::Direction);
        self.pins.set_control(0x00, Ctrl::SRQ.bits(), PinOp::Level);
    }

    fn clr_srq_sig(&mut self) {
        self.pins
            .set_control(0x00, Ctrl::SRQ.bits(), PinOp::Direction);
        self.pins
            .set_control(Ctrl::SRQ.bits(), Ctrl::SRQ.bits(), PinOp::Level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pins::Level;
    use crate::sim::{CtlOp, ControllerSim, IdleRemote, InstrumentSim, Remote, SimBus, Wire};

    fn controller_bus<R: Remote>(remote: R, target: u8) -> GpibBus<SimBus<R>> {
        let mut cfg = Config::default();
        cfg.cmode = Mode::Controller;
        cfg.caddr = 0;
        cfg.paddr = target;
        cfg.rtmo = 5;
        GpibBus::new(SimBus::new(remote), cfg)
    }

    #[test]
    fn write_byte_reaches_addressed_listener() {
        let mut bus = controller_bus(InstrumentSim::new(9), 9);
        bus.address_listen(9).unwrap();
        bus.set_controls(ControlState::Ctas);
        bus.write_byte(b'A', false).unwrap();
        bus.write_byte(b'B', false).unwrap();
        assert_eq!(&bus.pins.remote.seen_data[..], b"AB");
    }

    #[test]
    fn read_byte_collects_from_talker() {
        let mut instrument = InstrumentSim::new(9);
        instrument.set_reply(b"Z");
        let mut bus = controller_bus(instrument, 9);
        bus.address_talk(9).unwrap();
        bus.set_controls(ControlState::Clas);
        let (db, eoi) = bus.read_byte(true).unwrap();
        assert_eq!(db, b'Z');
        assert!(eoi);
    }

    #[test]
    fn write_times_out_at_the_attention_stage_on_an_empty_bus() {
        let mut bus = controller_bus(IdleRemote, 9);
        bus.set_controls(ControlState::Ccms);
        assert_eq!(bus.write_byte(cmd::UNL, false), Err(HandshakeError::Timeout(4)));
    }

    #[test]
    fn read_times_out_waiting_for_data_valid() {
        let mut bus = controller_bus(IdleRemote, 9);
        bus.set_controls(ControlState::Clas);
        assert_eq!(bus.read_byte(false), Err(HandshakeError::Timeout(6)));
    }

    #[test]
    fn addressing_tracks_the_device_addressed_flag() {
        let mut bus = controller_bus(InstrumentSim::new(9), 9);
        assert!(!bus.have_addressed_device());
        bus.address_listen(9).unwrap();
        assert!(bus.have_addressed_device());
        bus.unaddress().unwrap();
        assert!(!bus.have_addressed_device());
        bus.address_talk(9).unwrap();
        assert!(bus.have_addressed_device());
    }

    #[test]
    fn addressed_commands_end_in_controller_idle() {
        let mut bus = controller_bus(InstrumentSim::new(9), 9);
        bus.send_sdc().unwrap();
        assert_eq!(bus.state(), Some(ControlState::Cids));
        bus.send_universal(cmd::DCL).unwrap();
        assert_eq!(bus.state(), Some(ControlState::Cids));
        bus.send_get(9).unwrap();
        assert_eq!(bus.state(), Some(ControlState::Cids));
        let seen = &bus.pins.remote.seen_cmds;
        assert!(seen.contains(&cmd::SDC));
        assert!(seen.contains(&cmd::DCL));
        assert!(seen.contains(&cmd::GET));
    }

    #[test]
    fn failed_bus_operation_still_returns_to_idle() {
        let mut bus = controller_bus(IdleRemote, 9);
        assert!(bus.send_sdc().is_err());
        assert_eq!(bus.state(), Some(ControlState::Cids));
    }

    #[test]
    fn ifc_pulse_is_observable_and_released() {
        struct IfcSpy {
            saw_low: bool,
        }
        impl Remote for IfcSpy {
            fn tick(&mut self, wire: &mut Wire, _now_us: u64) {
                if wire.level(Ctrl::IFC).is_low() {
                    self.saw_low = true;
                }
            }
        }
        let mut bus = controller_bus(IfcSpy { saw_low: false }, 9);
        bus.send_ifc();
        assert!(bus.pins.remote.saw_low);
        assert_eq!(bus.pins.wire.level(Ctrl::IFC), Level::High);
    }

    #[test]
    fn srq_line_follows_the_status_byte() {
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.rtmo = 5;
        let mut bus = GpibBus::new(SimBus::new(IdleRemote), cfg);
        bus.set_status(0x41);
        assert_eq!(bus.pins.wire.level(Ctrl::SRQ), Level::Low);
        bus.set_status(0x01);
        assert_eq!(bus.pins.wire.level(Ctrl::SRQ), Level::High);
    }

    #[test]
    fn send_status_clears_rqs_and_releases_srq() {
        let script = [CtlOp::Recv(1)];
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.rtmo = 5;
        let mut bus = GpibBus::new(SimBus::new(ControllerSim::new(&script)), cfg);
        bus.set_status(0x41);
        bus.send_status();
        assert_eq!(&bus.pins.remote.received[..], &[0x41]);
        assert_eq!(bus.cfg.stat, 0x01);
        assert_eq!(bus.pins.wire.level(Ctrl::SRQ), Level::High);
        assert_eq!(bus.state(), Some(ControlState::Dids));
    }

    #[test]
    fn stop_releases_every_control_line() {
        let mut bus = controller_bus(IdleRemote, 1);
        bus.set_controls(ControlState::Ccms);
        bus.stop();
        assert_eq!(bus.pins.wire.our_dir, 0);
        assert_eq!(bus.state(), None);
    }

    #[test]
    fn send_data_appends_configured_terminators() {
        for (eos, tail) in [(0u8, "\r\n"), (1, "\r"), (2, "\n"), (3, "")] {
            let mut bus = controller_bus(InstrumentSim::new(9), 9);
            bus.cfg.eos = eos;
            bus.send_data(b"M3", false).unwrap();
            let mut expect = b"M3".to_vec();
            expect.extend_from_slice(tail.as_bytes());
            assert_eq!(&bus.pins.remote.seen_data[..], &expect[..], "eos={}", eos);
        }
    }
}
