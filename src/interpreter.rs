//! The host line interpreter and the main service loop.
//!
//! Reads bytes from the host link into a parse buffer, recognises
//! `++`-prefixed interface commands, forwards everything else as
//! instrument data, and drives the auto-read and device pass-through
//! modes.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::commands::{err_bad_cmd, receive_and_report, CommandSet, Context, Modes};
use crate::config::{Mode, NvStore};
use crate::constants::PARSE_BUF_LEN;
use crate::gpib::attn::AttnOptions;
use crate::gpib::read::{BreakCheck, ReceiveEnd};
use crate::gpib::{self, GpibBus};
use crate::host::{respond, HostPort};
use crate::pins::{Ctrl, GpibPins};
use crate::util::time::Ticker;

const ESC: u8 = 0x1B;
const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const PLUS: u8 = b'+';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Command,
    Data,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    kind: LineKind,
    /// Set when the buffer overflowed before a terminator arrived.
    partial: bool,
}

/// Interpreter state: the parse buffer and the volatile operating
/// flags.
pub struct Interpreter {
    pbuf: [u8; PARSE_BUF_LEN],
    pbptr: usize,
    escape_pending: bool,
    plus_escaped: bool,
    line_ready: Option<Line>,
    /// Interactive prompt after each handled line.
    pub verbose: bool,
    /// Device role: listen-only pass-through.
    pub lon: bool,
    /// Device role: talk-only pass-through (0 off, 1 unbuffered, 2
    /// buffered).
    pub ton: u8,
    /// Device role: receive regardless of addressing.
    pub prom: bool,
    /// Controller role: serial poll automatically when SRQ asserts.
    pub srq_auto: bool,
    /// Continuous-read parameters while an `auto 3` read is running.
    continuous: Option<(bool, Option<u8>)>,
    /// Device role: a data line parked until the controller addresses
    /// us to talk.
    pending_out: Option<([u8; PARSE_BUF_LEN], usize)>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            pbuf: [0; PARSE_BUF_LEN],
            pbptr: 0,
            escape_pending: false,
            plus_escaped: false,
            line_ready: None,
            verbose: false,
            lon: false,
            ton: 0,
            prom: false,
            srq_auto: false,
            continuous: None,
            pending_out: None,
        }
    }

    /// Forget the volatile pass-through modes (factory reset).
    pub fn reset_modes(&mut self) {
        self.lon = false;
        self.ton = 0;
        self.prom = false;
        self.srq_auto = false;
        self.continuous = None;
    }

    pub(crate) fn start_continuous(&mut self, detect_eoi: bool, end_byte: Option<u8>) {
        self.continuous = Some((detect_eoi, end_byte));
    }

    /// One iteration of the cooperative main loop: honor the bus, then
    /// the host.
    pub fn service<P: GpibPins + Ticker + 'static>(
        &mut self,
        bus: &mut GpibBus<P>,
        host: &mut dyn HostPort,
        store: &mut dyn NvStore,
    ) {
        // Device role: the attention flag is advisory, the line is the
        // truth.
        if !bus.is_controller() && (gpib::take_atn() || bus.is_asserted(Ctrl::ATN)) {
            let opts = AttnOptions {
                promiscuous: self.prom,
                listen_only: self.lon,
            };
            let outcome = bus.attention_required(host, opts);
            if outcome.talk {
                self.send_pending(bus);
            }
        }

        // Listen-only mode keeps accepting bus traffic between ATN
        // bursts; a `++` line from the host still gets through.
        if !bus.is_controller() && self.lon {
            let _ = bus.receive_data(host, self, false, None);
        }

        // Controller role: automatic serial poll on a service request.
        if bus.is_controller()
            && self.srq_auto
            && (gpib::take_srq() || bus.is_asserted(Ctrl::SRQ))
        {
            let mut ctx = Context {
                itp: &mut *self,
                bus: &mut *bus,
                host: &mut *host,
                store: &mut *store,
            };
            if crate::commands::poll_all(&mut ctx).is_ok() {
                let _ = gpib::take_srq();
            }
        }

        // A continuous (auto 3) read keeps going until something breaks
        // it.
        if bus.is_controller() {
            if let Some((detect_eoi, end_byte)) = self.continuous {
                match bus.receive_data(host, self, detect_eoi, end_byte) {
                    Ok(ReceiveEnd::Break) | Ok(ReceiveEnd::Atn) | Ok(ReceiveEnd::Ifc) => {
                        self.continuous = None;
                    }
                    _ => {}
                }
            }
        }

        // Bring in host bytes until a line is ready or they run dry.
        while self.line_ready.is_none() {
            let Some(b) = host.poll_byte() else { break };
            self.feed(b);
        }

        if let Some(line) = self.line_ready.take() {
            self.handle_line(line, bus, host, store);
            if self.verbose {
                host.write_all(b"> ");
            }
        }
    }

    /// Feed one host byte through the escape rules into the parse
    /// buffer.
    fn feed(&mut self, b: u8) {
        if self.escape_pending {
            self.escape_pending = false;
            if b == PLUS && self.pbptr < 2 {
                self.plus_escaped = true;
            }
            self.push_byte(b);
            return;
        }
        match b {
            ESC => self.escape_pending = true,
            CR | LF => {
                if self.pbptr == 0 {
                    return;
                }
                self.line_ready = Some(Line {
                    kind: self.classify(),
                    partial: false,
                });
            }
            _ => self.push_byte(b),
        }
    }

    fn classify(&self) -> LineKind {
        if self.pbptr >= 2 && &self.pbuf[..2] == b"++" && !self.plus_escaped {
            LineKind::Command
        } else {
            LineKind::Data
        }
    }

    fn push_byte(&mut self, b: u8) {
        if self.line_ready.is_some() {
            // A line is waiting to be processed; drop until it is.
            return;
        }
        self.pbuf[self.pbptr] = b;
        self.pbptr += 1;
        if self.pbptr == PARSE_BUF_LEN {
            self.line_ready = Some(Line {
                kind: self.classify(),
                partial: true,
            });
        }
    }

    /// Clear the parse buffer completely so later prefix checks are
    /// safe.
    fn clear_buffer(&mut self) {
        self.pbuf = [0; PARSE_BUF_LEN];
        self.pbptr = 0;
        self.escape_pending = false;
        self.plus_escaped = false;
        self.line_ready = None;
    }

    fn handle_line<P: GpibPins + Ticker + 'static>(
        &mut self,
        line: Line,
        bus: &mut GpibBus<P>,
        host: &mut dyn HostPort,
        store: &mut dyn NvStore,
    ) {
        match line.kind {
            LineKind::Command => {
                if line.partial {
                    respond!(host, "Buffer overflow");
                    self.clear_buffer();
                    return;
                }
                let mut buf = [0u8; PARSE_BUF_LEN];
                let len = self.pbptr;
                buf[..len].copy_from_slice(&self.pbuf[..len]);
                self.clear_buffer();
                match core::str::from_utf8(&buf[..len]) {
                    Ok(text) => self.exec_cmd(text, bus, host, store),
                    Err(_) => err_bad_cmd(host),
                }
            }
            LineKind::Data => {
                let mut data = [0u8; PARSE_BUF_LEN];
                let len = self.pbptr;
                data[..len].copy_from_slice(&self.pbuf[..len]);
                let partial = line.partial;
                self.clear_buffer();
                self.handle_data(&data[..len], partial, bus, host, store);
            }
        }
    }

    fn handle_data<P: GpibPins + Ticker>(
        &mut self,
        data: &[u8],
        partial: bool,
        bus: &mut GpibBus<P>,
        host: &mut dyn HostPort,
        store: &mut dyn NvStore,
    ) {
        // A local *IDN? query is answered here when enabled.
        if !partial && bus.cfg.idn_mode > 0 && is_idn_query(data) {
            let serial = bus.cfg.serial;
            if bus.cfg.idn_mode == 2 {
                respond!(host, "{}-{}", bus.cfg.sname.as_str(), serial);
            } else {
                respond!(host, "{}", bus.cfg.sname.as_str());
            }
            return;
        }

        if !bus.is_controller() {
            if self.ton > 0 {
                // Talk-only: straight onto the bus, no addressing.
                if let Err(e) = bus.send_data(data, false) {
                    log::debug!("talk-only send failed: {:?}", e);
                }
            } else {
                // Parked until the controller addresses us to talk.
                let mut copy = [0u8; PARSE_BUF_LEN];
                copy[..data.len()].copy_from_slice(data);
                self.pending_out = Some((copy, data.len()));
            }
            return;
        }

        match bus.send_data(data, partial) {
            Ok(()) => {}
            Err(e) => {
                log::debug!("send failed: {:?}", e);
                return;
            }
        }
        if partial {
            // The rest of the oversized line follows; the device stays
            // addressed.
            return;
        }
        if bus.cfg.amode == 1 || (bus.cfg.amode == 2 && is_query(data)) {
            let mut ctx = Context {
                itp: &mut *self,
                bus: &mut *bus,
                host: &mut *host,
                store: &mut *store,
            };
            receive_and_report(&mut ctx, false, None);
        }
    }

    fn exec_cmd<P: GpibPins + Ticker + 'static>(
        &mut self,
        line: &str,
        bus: &mut GpibBus<P>,
        host: &mut dyn HostPort,
        store: &mut dyn NvStore,
    ) {
        let body = &line[2..];

        // `++!` aborts a read loop; arriving here means the loop has
        // already been broken, so just retire the continuous read.
        if body == "!" {
            self.continuous = None;
            return;
        }

        let (token, params) = match body.trim().find(char::is_whitespace) {
            Some(i) => {
                let t = body.trim();
                (&t[..i], t[i..].trim())
            }
            None => (body.trim(), ""),
        };
        if token.is_empty() {
            err_bad_cmd(host);
            return;
        }

        let mode_bit = match bus.cfg.cmode {
            Mode::Device => Modes::DEVICE,
            Mode::Controller => Modes::CONTROLLER,
        };
        for rec in CommandSet::<P>::TABLE {
            if rec.token.eq_ignore_ascii_case(token) {
                if rec.modes.contains(mode_bit) {
                    let mut ctx = Context {
                        itp: &mut *self,
                        bus: &mut *bus,
                        host: &mut *host,
                        store: &mut *store,
                    };
                    (rec.handler)(&mut ctx, params);
                } else {
                    err_bad_cmd(host);
                }
                return;
            }
        }
        err_bad_cmd(host);
    }

    fn send_pending<P: GpibPins + Ticker>(&mut self, bus: &mut GpibBus<P>) {
        if let Some((data, len)) = self.pending_out.take() {
            if let Err(e) = bus.send_data(&data[..len], false) {
                log::debug!("device talk failed: {:?}", e);
            }
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakCheck for Interpreter {
    /// Poll the host for input mid-receive; a `++` line (complete or in
    /// progress) interrupts the transfer.
    fn pending_break(&mut self, host: &mut dyn HostPort) -> bool {
        while self.line_ready.is_none() {
            let Some(b) = host.poll_byte() else { break };
            self.feed(b);
        }
        if let Some(line) = &self.line_ready {
            if line.kind == LineKind::Command {
                return true;
            }
        }
        self.pbptr >= 2 && &self.pbuf[..2] == b"++" && !self.plus_escaped
    }
}

fn is_idn_query(data: &[u8]) -> bool {
    data.len() >= 5 && data[..5].eq_ignore_ascii_case(b"*idn?")
}

/// Query detection for `auto 2`: the payload's last non-whitespace byte
/// is a question mark.
fn is_query(data: &[u8]) -> bool {
    data.iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'?')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Mode, RamStore};
    use crate::gpib::cmd;
    use crate::gpib::ControlState;
    use crate::host::testutil::MockHost;
    use crate::pins::Level;
    use crate::sim::{CtlOp, ControllerSim, IdleRemote, InstrumentSim, Remote, SimBus, Wire};

    fn controller_cfg(target: u8) -> Config {
        let mut cfg = Config::default();
        cfg.cmode = Mode::Controller;
        cfg.caddr = 0;
        cfg.paddr = target;
        cfg.rtmo = 5;
        cfg
    }

    struct Rig<R: Remote> {
        itp: Interpreter,
        bus: GpibBus<SimBus<R>>,
        host: MockHost,
        store: RamStore,
    }

    impl<R: Remote + 'static> Rig<R> {
        fn new(remote: R, cfg: Config) -> Self {
            Self {
                itp: Interpreter::new(),
                bus: GpibBus::new(SimBus::new(remote), cfg),
                host: MockHost::new(),
                store: RamStore::new(),
            }
        }

        fn line(&mut self, text: &str) {
            self.host.feed(text.as_bytes());
            // One service call per queued line plus one idle spin.
            for _ in 0..4 {
                self.itp
                    .service(&mut self.bus, &mut self.host, &mut self.store);
            }
        }
    }

    #[test]
    fn addr_get_set_round_trip() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++addr 9\n");
        assert_eq!(rig.host.output(), "");
        rig.line("++addr\n");
        assert_eq!(rig.host.output(), "9\r\n");
    }

    #[test]
    fn addr_boundaries_are_unrecognized() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++addr 0\n");
        rig.line("++addr 31\n");
        assert_eq!(
            rig.host.output(),
            "Unrecognized command\r\nUnrecognized command\r\n"
        );
    }

    #[test]
    fn read_tmo_ms_boundaries_are_out_of_range() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++read_tmo_ms 0\n");
        rig.line("++read_tmo_ms 32001\n");
        assert_eq!(
            rig.host.output(),
            "Valid range is between 1 and 32000\r\nValid range is between 1 and 32000\r\n"
        );
    }

    #[test]
    fn unknown_token_and_wrong_mode_are_unrecognized() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++nonsense\n");
        // lon is a device-only command.
        rig.line("++lon 1\n");
        assert_eq!(
            rig.host.output(),
            "Unrecognized command\r\nUnrecognized command\r\n"
        );
    }

    #[test]
    fn token_lookup_is_case_insensitive() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++ADDR 7\n");
        rig.line("++Addr\n");
        assert_eq!(rig.host.output(), "7\r\n");
    }

    #[test]
    fn escaped_plus_prefix_is_data_not_command() {
        let mut rig = Rig::new(InstrumentSim::new(9), controller_cfg(9));
        let mut line = Vec::new();
        line.extend_from_slice(&[0x1B, b'+', b'+', b'a', b'd', b'd', b'r', b'\n']);
        rig.host.feed(&line);
        for _ in 0..4 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }
        // Forwarded to the instrument instead of being executed.
        assert_eq!(&rig.bus.pins.remote.seen_data[..], b"++addr\r\n");
        assert_eq!(rig.host.output(), "");
    }

    #[test]
    fn escaped_terminator_is_stored_literally() {
        let mut rig = Rig::new(InstrumentSim::new(9), controller_cfg(9));
        rig.host.feed(&[b'a', 0x1B, CR, b'b', b'\n']);
        for _ in 0..4 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }
        assert_eq!(&rig.bus.pins.remote.seen_data[..], b"a\rb\r\n");
    }

    #[test]
    fn controller_query_with_auto_query_detection() {
        // End-to-end: *IDN? goes out with addressing and EOI, the reply
        // comes back on auto mode 2.
        let mut instrument = InstrumentSim::new(9);
        instrument.set_reply(b"HP3478A\r\n");
        let mut cfg = controller_cfg(9);
        cfg.eoi = true;
        cfg.amode = 2;
        let mut rig = Rig::new(instrument, cfg);

        rig.line("*IDN?\n");

        let sim = &rig.bus.pins;
        assert_eq!(&sim.remote.seen_data[..], b"*IDN?\r\n");
        assert!(sim.remote.last_data_eoi, "EOI missing on the final byte");
        // Address-to-listen, unaddress, address-to-talk, unaddress.
        assert_eq!(
            &sim.remote.seen_cmds[..],
            &[
                cmd::UNL,
                cmd::TAD,
                cmd::LAD + 9,
                cmd::UNL,
                cmd::UNT,
                cmd::UNL,
                cmd::LAD,
                cmd::TAD + 9,
                cmd::UNL,
                cmd::UNT,
            ]
        );
        assert_eq!(rig.host.output(), "HP3478A\r\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Cids));
    }

    #[test]
    fn eot_char_appended_after_eoi_terminated_read() {
        let mut instrument = InstrumentSim::new(9);
        instrument.set_reply(b"42");
        let mut cfg = controller_cfg(9);
        cfg.eoi = true;
        cfg.eot_en = true;
        cfg.eot_ch = b'$';
        let mut rig = Rig::new(instrument, cfg);
        rig.line("++read eoi\n");
        assert_eq!(rig.host.output(), "42$");
    }

    #[test]
    fn spoll_all_reports_requesting_device_only() {
        let mut instrument = InstrumentSim::new(5);
        instrument.status = 0x47;
        let mut rig = Rig::new(instrument, controller_cfg(1));

        rig.line("++spoll all\n");

        assert_eq!(rig.host.output(), "SRQ:5,71\r\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Cids));
        // The polled device dropped its request.
        assert_eq!(rig.bus.pins.remote.status & 0x40, 0);
        assert_eq!(rig.bus.pins.wire.level(crate::pins::Ctrl::SRQ), Level::High);
    }

    #[test]
    fn spoll_single_address_prints_status() {
        let mut instrument = InstrumentSim::new(5);
        instrument.status = 0x47;
        let mut rig = Rig::new(instrument, controller_cfg(5));
        rig.line("++spoll\n");
        assert_eq!(rig.host.output(), "71\r\n");
    }

    #[test]
    fn read_abort_on_host_command() {
        // A ++ line queued at the host interrupts the receive loop and
        // is then handled without complaint.
        let mut instrument = InstrumentSim::new(9);
        instrument.set_reply(b"0123456789");
        let mut rig = Rig::new(instrument, controller_cfg(9));

        rig.host.feed(b"++read\n++!\n");
        for _ in 0..6 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }

        assert_eq!(rig.host.output(), "");
        assert_eq!(rig.bus.state(), Some(ControlState::Cids));
    }

    #[test]
    fn parallel_poll_prints_sampled_byte() {
        struct PpollResponder;
        impl Remote for PpollResponder {
            fn tick(&mut self, wire: &mut Wire, _now_us: u64) {
                use crate::pins::Ctrl;
                if wire.level(Ctrl::ATN).is_low() && wire.level(Ctrl::EOI).is_low() {
                    wire.rem_put_data(85);
                } else {
                    wire.rem_float_data();
                }
            }
        }
        let mut rig = Rig::new(PpollResponder, controller_cfg(1));
        rig.line("++ppoll\n");
        assert_eq!(rig.host.output(), "85\r\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Cids));
    }

    #[test]
    fn mode_switch_releases_every_line() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.bus.begin();
        rig.line("++mode 0\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Dids));
        assert!(!rig.bus.cfg.is_controller());
        // Nothing driven: a data line from the host is parked, not
        // sent.
        rig.line("hello\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Dids));
    }

    #[test]
    fn device_role_poll_sequence() {
        // A controller serial-polls this adapter in device role.
        let script = [
            CtlOp::Atn(true),
            CtlOp::Send(cmd::UNL),
            CtlOp::Send(cmd::SPE),
            CtlOp::Send(cmd::TAD + 12),
            CtlOp::Atn(false),
            CtlOp::Recv(1),
            CtlOp::Atn(true),
            CtlOp::Send(cmd::SPD),
            CtlOp::Send(cmd::UNT),
            CtlOp::Atn(false),
        ];
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.rtmo = 5;
        let mut rig = Rig::new(ControllerSim::new(&script), cfg);
        rig.bus.set_status(0x41);

        let mut guard = 0;
        while !rig.bus.pins.remote.done() && guard < 10 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
            guard += 1;
        }

        assert_eq!(&rig.bus.pins.remote.received[..], &[0x41]);
        // RQS auto-cleared and SRQ released after being polled.
        assert_eq!(rig.bus.cfg.stat, 0x01);
        assert_eq!(rig.bus.pins.wire.level(crate::pins::Ctrl::SRQ), Level::High);
        assert_eq!(rig.bus.state(), Some(ControlState::Dids));
    }

    #[test]
    fn device_receives_data_when_addressed_to_listen() {
        let script = [
            CtlOp::Atn(true),
            CtlOp::Send(cmd::UNL),
            CtlOp::Send(cmd::LAD + 12),
            CtlOp::Atn(false),
            CtlOp::Send(b'h'),
            CtlOp::Send(b'i'),
            CtlOp::SendEoi(b'\n'),
        ];
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.rtmo = 5;
        let mut rig = Rig::new(ControllerSim::new(&script), cfg);

        let mut guard = 0;
        while !rig.bus.pins.remote.done() && guard < 10 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
            guard += 1;
        }

        assert_eq!(rig.host.output(), "hi\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Dids));
    }

    #[test]
    fn device_talks_parked_data_when_addressed() {
        let script = [
            CtlOp::Pause(500),
            CtlOp::Atn(true),
            CtlOp::Send(cmd::UNL),
            CtlOp::Send(cmd::TAD + 12),
            CtlOp::Atn(false),
            CtlOp::Recv(7),
        ];
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.rtmo = 5;
        let mut rig = Rig::new(ControllerSim::new(&script), cfg);

        rig.host.feed(b"hello\n");
        let mut guard = 0;
        while !rig.bus.pins.remote.done() && guard < 200 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
            guard += 1;
        }

        assert_eq!(&rig.bus.pins.remote.received[..], b"hello\r\n");
        assert_eq!(rig.bus.state(), Some(ControlState::Dids));
    }

    #[test]
    fn srq_command_reports_line_state() {
        let mut instrument = InstrumentSim::new(5);
        instrument.status = 0x47;
        let mut rig = Rig::new(instrument, controller_cfg(5));
        rig.line("++srq\n");
        assert_eq!(rig.host.output(), "1\r\n");
        rig.host.clear_output();
        rig.bus.pins.remote.status = 0;
        rig.line("++srq\n");
        assert_eq!(rig.host.output(), "0\r\n");
    }

    #[test]
    fn xdiag_forces_control_lines() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++xdiag 1 128\n");
        assert_eq!(rig.bus.pins.wire.our_dir, 0xFF);
        // Bit 7 is ATN; a set bit means asserted (low).
        assert_eq!(rig.bus.pins.wire.level(Ctrl::ATN), Level::Low);
        assert_eq!(rig.bus.pins.wire.level(Ctrl::DAV), Level::High);
    }

    #[test]
    fn idn_query_answered_locally_when_enabled() {
        let mut cfg = controller_cfg(9);
        cfg.idn_mode = 2;
        cfg.serial = 31173;
        let mut rig = Rig::new(IdleRemote, cfg);
        rig.line("*idn?\n");
        assert_eq!(rig.host.output(), "pico488-31173\r\n");
    }

    #[test]
    fn oversized_data_line_is_forwarded_partially() {
        let mut rig = Rig::new(InstrumentSim::new(9), controller_cfg(9));
        let long = vec![b'x'; PARSE_BUF_LEN];
        rig.host.feed(&long);
        for _ in 0..4 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }
        // The partial buffer went out, with no terminator yet, and the
        // device stays addressed for the continuation.
        assert_eq!(rig.bus.pins.remote.seen_data.len(), PARSE_BUF_LEN);
        assert!(rig.bus.have_addressed_device());

        rig.host.feed(b"tail\n");
        for _ in 0..4 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }
        assert!(!rig.bus.have_addressed_device());
    }

    #[test]
    fn oversized_command_is_discarded_with_error() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        let mut long = vec![b'+', b'+'];
        long.extend(std::iter::repeat(b'a').take(PARSE_BUF_LEN));
        rig.host.feed(&long);
        for _ in 0..4 {
            rig.itp
                .service(&mut rig.bus, &mut rig.host, &mut rig.store);
        }
        assert_eq!(rig.host.output(), "Buffer overflow\r\n");
    }

    #[test]
    fn verbose_prompt_follows_handled_lines() {
        let mut rig = Rig::new(IdleRemote, controller_cfg(1));
        rig.line("++verbose\n");
        assert_eq!(rig.host.output(), "Verbose: ON\r\n> ");
        rig.host.clear_output();
        rig.line("++addr\n");
        assert_eq!(rig.host.output(), "1\r\n> ");
    }

    #[test]
    fn query_detection_ignores_trailing_whitespace() {
        assert!(is_query(b"*IDN?"));
        assert!(is_query(b"MEAS:VOLT?  "));
        assert!(!is_query(b"*RST"));
        assert!(!is_query(b""));
    }
}
