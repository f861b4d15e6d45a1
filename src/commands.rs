//! The `++` interface command set.
//!
//! A fixed table maps each token to its handler and the roles it is
//! permitted in.  Lookup is case-insensitive on the first
//! whitespace-delimited token; parameters are the remainder of the
//! line.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use core::marker::PhantomData;

use bitflags::bitflags;

use crate::config::{self, Config, Mode, NvStore};
use crate::constants::{FWVER, MAX_ADDR, MAX_TRIGGER_ADDRS};
use crate::gpib::{GpibBus, HandshakeError};
use crate::host::{respond, HostPort};
use crate::interpreter::Interpreter;
use crate::pins::{Ctrl, GpibPins, PinOp};
use crate::util::time::Ticker;

bitflags! {
    /// Roles a command is available in.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Modes: u8 {
        const DEVICE = 0x01;
        const CONTROLLER = 0x02;
    }
}

const DEV: Modes = Modes::DEVICE;
const CTL: Modes = Modes::CONTROLLER;
const BOTH: Modes = Modes::DEVICE.union(Modes::CONTROLLER);

/// Everything a command handler may touch.
pub(crate) struct Context<'a, P: GpibPins + Ticker> {
    pub itp: &'a mut Interpreter,
    pub bus: &'a mut GpibBus<P>,
    pub host: &'a mut dyn HostPort,
    pub store: &'a mut dyn NvStore,
}

pub(crate) struct CmdRec<P: GpibPins + Ticker> {
    pub token: &'static str,
    pub modes: Modes,
    pub handler: fn(&mut Context<'_, P>, &str),
    pub help: &'static str,
}

pub(crate) struct CommandSet<P: GpibPins + Ticker>(PhantomData<P>);

impl<P: GpibPins + Ticker + 'static> CommandSet<P> {
    pub const TABLE: &'static [CmdRec<P>] = &[
        CmdRec { token: "addr", modes: BOTH, handler: addr_h, help: "get/set the primary device address" },
        CmdRec { token: "allspoll", modes: CTL, handler: aspoll_h, help: "serial poll every address" },
        CmdRec { token: "auto", modes: CTL, handler: amode_h, help: "auto-read policy 0..3" },
        CmdRec { token: "clr", modes: CTL, handler: clr_h, help: "selected device clear" },
        CmdRec { token: "dcl", modes: CTL, handler: dcl_h, help: "universal device clear" },
        CmdRec { token: "default", modes: BOTH, handler: default_h, help: "restore factory configuration" },
        CmdRec { token: "eoi", modes: BOTH, handler: eoi_h, help: "assert EOI with the last byte sent, 0/1" },
        CmdRec { token: "eor", modes: BOTH, handler: eor_h, help: "receive terminator sequence 0..7" },
        CmdRec { token: "eos", modes: BOTH, handler: eos_h, help: "send terminator 0..3 (CRLF/CR/LF/none)" },
        CmdRec { token: "eot_char", modes: BOTH, handler: eot_char_h, help: "byte appended to host output on EOI" },
        CmdRec { token: "eot_enable", modes: BOTH, handler: eot_en_h, help: "enable eot_char, 0/1" },
        CmdRec { token: "help", modes: BOTH, handler: help_h, help: "list commands, or describe one" },
        CmdRec { token: "id", modes: BOTH, handler: id_h, help: "identity fields: verstr/name/serial/fwver" },
        CmdRec { token: "idn", modes: BOTH, handler: idn_h, help: "reply to *IDN? 0=off 1=name 2=name+serial" },
        CmdRec { token: "ifc", modes: CTL, handler: ifc_h, help: "pulse IFC, become controller-in-charge" },
        CmdRec { token: "llo", modes: CTL, handler: llo_h, help: "local lockout, optionally 'all'" },
        CmdRec { token: "loc", modes: CTL, handler: loc_h, help: "return to local, optionally 'all'" },
        CmdRec { token: "lon", modes: DEV, handler: lon_h, help: "listen-only pass-through, 0/1" },
        CmdRec { token: "macro", modes: CTL, handler: macro_h, help: "run a stored macro 0..9" },
        CmdRec { token: "mla", modes: CTL, handler: sendmla_h, help: "raw: unlisten, my listen address" },
        CmdRec { token: "mode", modes: BOTH, handler: cmode_h, help: "0=device 1=controller" },
        CmdRec { token: "msa", modes: CTL, handler: sendmsa_h, help: "raw: secondary address 96..126" },
        CmdRec { token: "mta", modes: CTL, handler: sendmta_h, help: "raw: unlisten, my talk address" },
        CmdRec { token: "ppoll", modes: CTL, handler: ppoll_h, help: "parallel poll, print one byte" },
        CmdRec { token: "prom", modes: DEV, handler: prom_h, help: "promiscuous receive, 0/1" },
        CmdRec { token: "read", modes: CTL, handler: read_h, help: "read from the addressed device ['eoi'|end byte]" },
        CmdRec { token: "read_tmo_ms", modes: CTL, handler: rtmo_h, help: "handshake timeout 1..32000 ms" },
        CmdRec { token: "ren", modes: CTL, handler: ren_h, help: "drive remote enable, 0/1" },
        CmdRec { token: "repeat", modes: CTL, handler: repeat_h, help: "repeat: COUNT DELAY_MS TEXT" },
        CmdRec { token: "rst", modes: BOTH, handler: rst_h, help: "reset the interface" },
        CmdRec { token: "savecfg", modes: BOTH, handler: save_h, help: "persist the configuration" },
        CmdRec { token: "setvstr", modes: BOTH, handler: setvstr_h, help: "set the custom version string" },
        CmdRec { token: "spoll", modes: CTL, handler: spoll_h, help: "serial poll [addr...|all]" },
        CmdRec { token: "srq", modes: CTL, handler: srq_h, help: "print the SRQ line state" },
        CmdRec { token: "srqauto", modes: CTL, handler: srqa_h, help: "auto serial poll on SRQ, 0/1" },
        CmdRec { token: "stat", modes: DEV, handler: stat_h, help: "get/set the status byte" },
        CmdRec { token: "status", modes: DEV, handler: stat_h, help: "get/set the status byte" },
        CmdRec { token: "ton", modes: DEV, handler: ton_h, help: "talk-only: 0=off 1=unbuffered 2=buffered" },
        CmdRec { token: "trg", modes: CTL, handler: trg_h, help: "group execute trigger [addr...]" },
        CmdRec { token: "unl", modes: CTL, handler: unlisten_h, help: "raw: unlisten" },
        CmdRec { token: "unt", modes: CTL, handler: untalk_h, help: "raw: untalk" },
        CmdRec { token: "ver", modes: BOTH, handler: ver_h, help: "firmware version; 'real' ignores setvstr" },
        CmdRec { token: "verbose", modes: BOTH, handler: verb_h, help: "toggle the interactive prompt" },
        CmdRec { token: "xdiag", modes: BOTH, handler: xdiag_h, help: "diagnostic: 0|1 BYTE forces data|control bus" },
    ];
}

pub(crate) fn err_bad_cmd(host: &mut dyn HostPort) {
    respond!(host, "Unrecognized command");
}

/// Shared range check for integer parameters.  Prints the standard
/// error line and returns `None` when the value does not parse or is
/// outside `lo..=hi`.
fn in_range(host: &mut dyn HostPort, params: &str, lo: u16, hi: u16) -> Option<u16> {
    match params.trim().parse::<u16>() {
        Ok(v) if (lo..=hi).contains(&v) => Some(v),
        _ => {
            respond!(host, "Valid range is between {} and {}", lo, hi);
            None
        }
    }
}

/// Get-or-set pattern for small numeric settings.
fn get_set_u8<P, F, G>(ctx: &mut Context<'_, P>, params: &str, hi: u16, get: G, set: F)
where
    P: GpibPins + Ticker,
    F: FnOnce(&mut Context<'_, P>, u8),
    G: FnOnce(&Config) -> u8,
{
    if params.is_empty() {
        let v = get(&ctx.bus.cfg);
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, hi) {
        set(ctx, v as u8);
    }
}

fn addr_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let addr = ctx.bus.cfg.paddr;
        respond!(ctx.host, "{}", addr);
        return;
    }
    // An address must be 1..30; anything else is not an address
    // command at all.
    let Ok(addr) = params.trim().parse::<u8>() else {
        err_bad_cmd(ctx.host);
        return;
    };
    if addr < 1 || addr > MAX_ADDR {
        err_bad_cmd(ctx.host);
        return;
    }
    if addr == ctx.bus.cfg.caddr {
        respond!(ctx.host, "Invalid address");
        return;
    }
    ctx.bus.cfg.paddr = addr;
}

fn rtmo_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = ctx.bus.cfg.rtmo;
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 1, 32000) {
        ctx.bus.cfg.rtmo = v;
    }
}

fn eos_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 3, |c| c.eos, |ctx, v| ctx.bus.cfg.eos = v);
}

fn eor_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 7, |c| c.eor, |ctx, v| ctx.bus.cfg.eor = v);
}

fn eoi_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 1, |c| u8::from(c.eoi), |ctx, v| ctx.bus.cfg.eoi = v != 0);
}

fn eot_en_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 1, |c| u8::from(c.eot_en), |ctx, v| {
        ctx.bus.cfg.eot_en = v != 0;
    });
}

fn eot_char_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 255, |c| c.eot_ch, |ctx, v| ctx.bus.cfg.eot_ch = v);
}

fn amode_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 3, |c| c.amode, |ctx, v| ctx.bus.cfg.amode = v);
}

fn cmode_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = u8::from(ctx.bus.cfg.is_controller());
        respond!(ctx.host, "{}", v);
        return;
    }
    let Some(v) = in_range(ctx.host, params, 0, 1) else {
        return;
    };
    let want = if v == 1 { Mode::Controller } else { Mode::Device };
    if want != ctx.bus.cfg.cmode {
        ctx.bus.cfg.cmode = want;
        ctx.bus.begin();
    }
}

fn ver_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if !params.eq_ignore_ascii_case("real") && !ctx.bus.cfg.vstr.is_empty() {
        let host = &mut *ctx.host;
        respond!(host, "{}", ctx.bus.cfg.vstr.as_str());
    } else {
        respond!(ctx.host, "{}", FWVER);
    }
}

fn setvstr_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    ctx.bus.cfg.vstr.clear();
    let _ = ctx.bus.cfg.vstr.push_str(truncated(params, 47));
}

fn id_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let (sub, rest) = split_token(params);
    let host = &mut *ctx.host;
    match sub {
        s if s.eq_ignore_ascii_case("verstr") => {
            if rest.is_empty() {
                respond!(host, "{}", ctx.bus.cfg.vstr.as_str());
            } else {
                ctx.bus.cfg.vstr.clear();
                let _ = ctx.bus.cfg.vstr.push_str(truncated(rest, 47));
            }
        }
        s if s.eq_ignore_ascii_case("name") => {
            if rest.is_empty() {
                respond!(host, "{}", ctx.bus.cfg.sname.as_str());
            } else {
                ctx.bus.cfg.sname.clear();
                let _ = ctx.bus.cfg.sname.push_str(truncated(rest, 15));
            }
        }
        s if s.eq_ignore_ascii_case("serial") => {
            if rest.is_empty() {
                let v = ctx.bus.cfg.serial;
                respond!(host, "{}", v);
            } else {
                match rest.trim().parse::<u32>() {
                    Ok(v) => ctx.bus.cfg.serial = v,
                    Err(_) => respond!(host, "Invalid serial number"),
                }
            }
        }
        s if s.eq_ignore_ascii_case("fwver") => respond!(host, "{}", FWVER),
        _ => err_bad_cmd(host),
    }
}

fn idn_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    get_set_u8(ctx, params, 2, |c| c.idn_mode, |ctx, v| ctx.bus.cfg.idn_mode = v);
}

fn read_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let (detect_eoi, end_byte) = if params.is_empty() {
        (false, None)
    } else if params.eq_ignore_ascii_case("eoi") {
        (true, None)
    } else {
        match in_range(ctx.host, params, 0, 255) {
            Some(v) => (false, Some(v as u8)),
            None => return,
        }
    };
    receive_and_report(ctx, detect_eoi, end_byte);
    if ctx.bus.cfg.amode == 3 {
        ctx.itp.start_continuous(detect_eoi, end_byte);
    }
}

/// One receive with the standard timeout reporting.
pub(crate) fn receive_and_report<P: GpibPins + Ticker>(
    ctx: &mut Context<'_, P>,
    detect_eoi: bool,
    end_byte: Option<u8>,
) {
    match ctx
        .bus
        .receive_data(&mut *ctx.host, &mut *ctx.itp, detect_eoi, end_byte)
    {
        Ok(_) => {}
        Err(HandshakeError::Timeout(8)) => {
            respond!(ctx.host, "Timeout waiting for transfer to complete");
        }
        Err(HandshakeError::Timeout(_)) => {
            respond!(ctx.host, "Timeout waiting for talker");
        }
        Err(e) => log::debug!("receive failed: {:?}", e),
    }
}

fn clr_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    if let Err(e) = ctx.bus.send_sdc() {
        log::debug!("SDC failed: {:?}", e);
    }
}

fn llo_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let result = if params.eq_ignore_ascii_case("all") {
        ctx.bus.send_universal(crate::gpib::cmd::LLO)
    } else {
        ctx.bus.send_llo()
    };
    if let Err(e) = result {
        log::debug!("LLO failed: {:?}", e);
    }
}

fn loc_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.eq_ignore_ascii_case("all") {
        // Dropping REN returns every device to local; re-assert it so
        // subsequent addressing can take them remote again.
        ctx.bus.set_ren(false);
        ctx.bus.delay_ms(crate::util::time::bus::ALL_CLEAR_STAGE_MS);
        ctx.bus.set_ren(true);
    } else if let Err(e) = ctx.bus.send_gtl() {
        log::debug!("GTL failed: {:?}", e);
    }
}

fn ifc_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    ctx.bus.send_ifc();
}

fn trg_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let addr = ctx.bus.cfg.paddr;
        if let Err(e) = ctx.bus.send_get(addr) {
            log::debug!("GET failed: {:?}", e);
        }
        return;
    }
    let mut count = 0;
    for tok in params.split_whitespace() {
        if count >= MAX_TRIGGER_ADDRS {
            break;
        }
        let Some(addr) = in_range(ctx.host, tok, 1, u16::from(MAX_ADDR)) else {
            return;
        };
        if let Err(e) = ctx.bus.send_get(addr as u8) {
            log::debug!("GET {} failed: {:?}", addr, e);
        }
        count += 1;
    }
}

fn rst_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    ctx.bus.request_reset();
}

fn spoll_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let result = if params.is_empty() {
        let addr = ctx.bus.cfg.paddr;
        ctx.bus.serial_poll(&mut *ctx.host, &[addr], false)
    } else if params.eq_ignore_ascii_case("all") {
        poll_all(ctx)
    } else {
        let mut addrs = [0u8; MAX_TRIGGER_ADDRS];
        let mut n = 0;
        for tok in params.split_whitespace() {
            if n >= addrs.len() {
                break;
            }
            let Some(addr) = in_range(ctx.host, tok, 1, u16::from(MAX_ADDR)) else {
                return;
            };
            addrs[n] = addr as u8;
            n += 1;
        }
        ctx.bus.serial_poll(&mut *ctx.host, &addrs[..n], false)
    };
    match result {
        Ok(()) => {
            // The request that prompted this poll is answered.
            let _ = crate::gpib::take_srq();
        }
        Err(e) => log::debug!("serial poll failed: {:?}", e),
    }
}

fn aspoll_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    match poll_all(ctx) {
        Ok(()) => {
            let _ = crate::gpib::take_srq();
        }
        Err(e) => log::debug!("serial poll failed: {:?}", e),
    }
}

pub(crate) fn poll_all<P: GpibPins + Ticker>(
    ctx: &mut Context<'_, P>,
) -> Result<(), HandshakeError> {
    let own = ctx.bus.cfg.caddr;
    let mut addrs = [0u8; MAX_ADDR as usize];
    let mut n = 0;
    for addr in 1..=MAX_ADDR {
        if addr != own {
            addrs[n] = addr;
            n += 1;
        }
    }
    ctx.bus.serial_poll(&mut *ctx.host, &addrs[..n], true)
}

fn srq_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    let v = u8::from(ctx.bus.is_asserted(Ctrl::SRQ));
    respond!(ctx.host, "{}", v);
}

fn stat_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = ctx.bus.cfg.stat;
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, 255) {
        ctx.bus.set_status(v as u8);
    }
}

fn save_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    config::save(&ctx.bus.cfg, ctx.store);
}

fn lon_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = u8::from(ctx.itp.lon);
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, 1) {
        ctx.itp.lon = v != 0;
    }
}

fn ton_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = ctx.itp.ton;
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, 2) {
        ctx.itp.ton = v as u8;
    }
}

fn prom_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = u8::from(ctx.itp.prom);
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, 1) {
        ctx.itp.prom = v != 0;
    }
}

fn srqa_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() {
        let v = u8::from(ctx.itp.srq_auto);
        respond!(ctx.host, "{}", v);
    } else if let Some(v) = in_range(ctx.host, params, 0, 1) {
        ctx.itp.srq_auto = v != 0;
    }
}

fn help_h<P: GpibPins + Ticker + 'static>(ctx: &mut Context<'_, P>, params: &str) {
    let topic = params.trim();
    for rec in CommandSet::<P>::TABLE {
        if topic.is_empty() || rec.token.eq_ignore_ascii_case(topic) {
            let host = &mut *ctx.host;
            respond!(host, "{} - {}", rec.token, rec.help);
        }
    }
}

fn dcl_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    if let Err(e) = ctx.bus.send_universal(crate::gpib::cmd::DCL) {
        log::debug!("DCL failed: {:?}", e);
    }
}

fn default_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    ctx.bus.cfg = Config::default();
    ctx.itp.reset_modes();
}

fn ppoll_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    let v = ctx.bus.parallel_poll();
    respond!(ctx.host, "{}", v);
}

fn ren_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if let Some(v) = in_range(ctx.host, params, 0, 1) {
        ctx.bus.set_ren(v == 1);
    }
}

fn verb_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    ctx.itp.verbose = !ctx.itp.verbose;
    let state = if ctx.itp.verbose { "ON" } else { "OFF" };
    respond!(ctx.host, "Verbose: {}", state);
}

fn macro_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    if params.is_empty() || in_range(ctx.host, params, 0, 9).is_some() {
        respond!(ctx.host, "No macros defined");
    }
}

fn repeat_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let (count_s, rest) = split_token(params);
    let (delay_s, text) = split_token(rest);
    let Some(count) = in_range(ctx.host, count_s, 2, 255) else {
        return;
    };
    let Some(delay) = in_range(ctx.host, delay_s, 0, 10000) else {
        return;
    };
    if text.is_empty() {
        err_bad_cmd(ctx.host);
        return;
    }
    let mut data = [0u8; crate::constants::PARSE_BUF_LEN];
    let len = text.len().min(data.len());
    data[..len].copy_from_slice(&text.as_bytes()[..len]);
    for _ in 0..count {
        if let Err(e) = ctx.bus.send_data(&data[..len], false) {
            log::debug!("repeat send failed: {:?}", e);
            return;
        }
        receive_and_report(ctx, false, None);
        ctx.bus.delay_ms(u32::from(delay));
    }
}

fn xdiag_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let (mode_s, val_s) = split_token(params);
    let Some(mode) = in_range(ctx.host, mode_s, 0, 1) else {
        return;
    };
    let Some(val) = in_range(ctx.host, val_s, 0, 255) else {
        return;
    };
    let val = val as u8;
    if mode == 0 {
        ctx.bus.set_data_val(val);
    } else {
        // Drive all control lines as outputs; a set bit asserts (pulls
        // low) the corresponding line.  Cleared on the next bus state
        // change.
        ctx.bus.set_control_val(0xFF, 0xFF, PinOp::Direction);
        ctx.bus.set_control_val(!val, 0xFF, PinOp::Level);
    }
}

fn sendmla_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    let own = ctx.bus.cfg.paddr;
    let r = ctx
        .bus
        .send_cmd(crate::gpib::cmd::UNL)
        .and_then(|()| ctx.bus.send_cmd(crate::gpib::cmd::LAD + own));
    if let Err(e) = r {
        log::debug!("MLA failed: {:?}", e);
    }
}

fn sendmta_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    let own = ctx.bus.cfg.paddr;
    let r = ctx
        .bus
        .send_cmd(crate::gpib::cmd::UNL)
        .and_then(|()| ctx.bus.send_cmd(crate::gpib::cmd::TAD + own));
    if let Err(e) = r {
        log::debug!("MTA failed: {:?}", e);
    }
}

fn sendmsa_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, params: &str) {
    let Some(v) = in_range(ctx.host, params, 96, 126) else {
        return;
    };
    if let Err(e) = ctx.bus.send_cmd(v as u8) {
        log::debug!("MSA failed: {:?}", e);
        return;
    }
    // Secondary addressing complete: release ATN for the data phase.
    ctx.bus
        .set_control_val(Ctrl::ATN.bits(), Ctrl::ATN.bits(), PinOp::Level);
}

fn unlisten_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    if let Err(e) = ctx.bus.send_unl() {
        log::debug!("UNL failed: {:?}", e);
    }
}

fn untalk_h<P: GpibPins + Ticker>(ctx: &mut Context<'_, P>, _params: &str) {
    if let Err(e) = ctx.bus.send_unt() {
        log::debug!("UNT failed: {:?}", e);
    }
}

/// First whitespace-delimited token and the trimmed remainder.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Longest prefix of `s` at most `max` bytes long, cut on a character
/// boundary so multi-byte input cannot split.
fn truncated(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_keeps_short_input() {
        assert_eq!(truncated("abc", 15), "abc");
        assert_eq!(truncated("", 15), "");
    }

    #[test]
    fn truncated_cuts_ascii_at_the_limit() {
        assert_eq!(truncated("abcdefgh", 4), "abcd");
    }

    #[test]
    fn truncated_never_splits_a_multibyte_character() {
        // "é" is two bytes; a limit landing inside it backs off.
        assert_eq!(truncated("ééé", 3), "é");
        assert_eq!(truncated("ééé", 4), "éé");
        // A four-byte character with a limit inside it yields nothing.
        assert_eq!(truncated("\u{1F600}", 3), "");
    }

    #[test]
    fn split_token_handles_padding() {
        assert_eq!(split_token("addr 9"), ("addr", "9"));
        assert_eq!(split_token("  repeat  3  5  M3"), ("repeat", "3  5  M3"));
        assert_eq!(split_token("ver"), ("ver", ""));
        assert_eq!(split_token(""), ("", ""));
    }
}
