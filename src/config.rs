//! Persistent configuration.
//!
//! The adapter's settings live in one fixed-size record, serialized
//! field by field into a byte image with a CRC-16 in front.  The image
//! is written only on `++savecfg` and validated on boot; a bad CRC
//! silently reinstates the defaults and re-persists them.

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use heapless::String;
use static_assertions::const_assert;

/// Serialized size of the configuration record.
pub const CFG_RECORD_SIZE: usize = 82;

/// Size of the persisted image: CRC-16 at offset 0, record from offset 2.
pub const CFG_IMAGE_SIZE: usize = CFG_RECORD_SIZE + 2;

const_assert!(CFG_IMAGE_SIZE <= 512);

const VSTR_LEN: usize = 48;
const SNAME_LEN: usize = 16;

/// Operating role of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Device = 1,
    Controller = 2,
}

/// The configuration record.
///
/// `caddr` is this node's own primary address; `paddr` is the remote
/// device targeted in controller mode (or the listen/talk address we
/// answer to in device mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Assert EOI with the final byte of every send.
    pub eoi: bool,
    /// Append `eot_ch` to host output when EOI is seen on receive.
    pub eot_en: bool,
    pub eot_ch: u8,
    pub cmode: Mode,
    pub caddr: u8,
    pub paddr: u8,
    pub saddr: u8,
    /// Terminator appended on send: 0=CR+LF, 1=CR, 2=LF, 3=none.
    pub eos: u8,
    /// Terminator expected on receive, 0..7 (see the receive loop).
    pub eor: u8,
    /// Status byte returned when serial-polled in device mode.  Bit 6 is
    /// the RQS bit.
    pub stat: u8,
    /// Auto-read policy, 0..3.
    pub amode: u8,
    /// Per-handshake-phase timeout in milliseconds.
    pub rtmo: u16,
    /// 0 = no *IDN? reply, 1 = name, 2 = name + serial.
    pub idn_mode: u8,
    pub serial: u32,
    pub vstr: String<VSTR_LEN>,
    pub sname: String<SNAME_LEN>,
}

impl Default for Config {
    fn default() -> Self {
        let mut sname = String::new();
        let _ = sname.push_str("pico488");
        Self {
            eoi: false,
            eot_en: false,
            eot_ch: 0,
            cmode: Mode::Controller,
            caddr: 0,
            paddr: 1,
            saddr: 0,
            eos: 0,
            eor: 0,
            stat: 0,
            amode: 0,
            rtmo: 1200,
            idn_mode: 0,
            serial: 0,
            vstr: String::new(),
            sname,
        }
    }
}

impl Config {
    /// Serialize into the record area of a persisted image.
    pub fn encode(&self, out: &mut [u8; CFG_RECORD_SIZE]) {
        out.fill(0);
        out[0] = u8::from(self.eot_en);
        out[1] = u8::from(self.eoi);
        out[2] = self.cmode as u8;
        out[3] = self.caddr;
        out[4] = self.paddr;
        out[5] = self.saddr;
        out[6] = self.eos;
        out[7] = self.eor;
        out[8] = self.stat;
        out[9] = self.amode;
        out[10..12].copy_from_slice(&self.rtmo.to_le_bytes());
        out[12] = self.eot_ch;
        out[13] = self.idn_mode;
        out[14..18].copy_from_slice(&self.serial.to_le_bytes());
        encode_str(&mut out[18..18 + VSTR_LEN], &self.vstr);
        encode_str(&mut out[66..66 + SNAME_LEN], &self.sname);
    }

    /// Deserialize from the record area, rejecting images whose fields
    /// are out of range.
    pub fn decode(rec: &[u8]) -> Option<Self> {
        if rec.len() < CFG_RECORD_SIZE {
            return None;
        }
        let cmode = match rec[2] {
            1 => Mode::Device,
            2 => Mode::Controller,
            _ => return None,
        };
        if rec[3] > 30 || rec[4] > 30 || rec[6] > 3 || rec[7] > 7 || rec[9] > 3 {
            return None;
        }
        let rtmo = u16::from_le_bytes([rec[10], rec[11]]);
        if rtmo == 0 || rtmo > 32000 {
            return None;
        }
        if rec[13] > 2 {
            return None;
        }
        Some(Self {
            eot_en: rec[0] != 0,
            eoi: rec[1] != 0,
            cmode,
            caddr: rec[3],
            paddr: rec[4],
            saddr: rec[5],
            eos: rec[6],
            eor: rec[7],
            stat: rec[8],
            amode: rec[9],
            rtmo,
            eot_ch: rec[12],
            idn_mode: rec[13],
            serial: u32::from_le_bytes([rec[14], rec[15], rec[16], rec[17]]),
            vstr: decode_str(&rec[18..18 + VSTR_LEN])?,
            sname: decode_str(&rec[66..66 + SNAME_LEN])?,
        })
    }

    pub fn is_controller(&self) -> bool {
        self.cmode == Mode::Controller
    }
}

fn encode_str(out: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
}

fn decode_str<const N: usize>(rec: &[u8]) -> Option<String<N>> {
    let end = rec.iter().position(|&b| b == 0).unwrap_or(rec.len());
    let s = core::str::from_utf8(&rec[..end]).ok()?;
    let mut out = String::new();
    out.push_str(s).ok()?;
    Some(out)
}

/// CRC-16 with the reflected 0xA001 polynomial, seeded with 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &x in data {
        crc ^= u16::from(x);
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Byte-blob persistence for the configuration image.
///
/// Implementations: the RP2040 flash sector (`infra::storage`) and the
/// RAM store below.
pub trait NvStore {
    fn read(&mut self, image: &mut [u8; CFG_IMAGE_SIZE]);

    fn write(&mut self, image: &[u8; CFG_IMAGE_SIZE]);
}

/// Volatile store, used by the simulation and the tests.  Starts erased.
pub struct RamStore {
    image: [u8; CFG_IMAGE_SIZE],
}

impl RamStore {
    pub fn new() -> Self {
        Self {
            image: [0xFF; CFG_IMAGE_SIZE],
        }
    }
}

impl Default for RamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NvStore for RamStore {
    fn read(&mut self, image: &mut [u8; CFG_IMAGE_SIZE]) {
        image.copy_from_slice(&self.image);
    }

    fn write(&mut self, image: &[u8; CFG_IMAGE_SIZE]) {
        self.image.copy_from_slice(image);
    }
}

/// Persist `cfg` to the store.
pub fn save(cfg: &Config, store: &mut dyn NvStore) {
    let mut image = [0u8; CFG_IMAGE_SIZE];
    let (crc_area, rec) = image.split_at_mut(2);
    let mut record = [0u8; CFG_RECORD_SIZE];
    cfg.encode(&mut record);
    rec.copy_from_slice(&record);
    crc_area.copy_from_slice(&crc16(&record).to_le_bytes());
    store.write(&image);
}

/// Load the configuration from the store.  On a CRC mismatch (including
/// a blank store) the defaults are substituted and written back.
pub fn load(store: &mut dyn NvStore) -> Config {
    let mut image = [0u8; CFG_IMAGE_SIZE];
    store.read(&mut image);
    let stored_crc = u16::from_le_bytes([image[0], image[1]]);
    if crc16(&image[2..]) == stored_crc {
        if let Some(cfg) = Config::decode(&image[2..]) {
            return cfg;
        }
    }
    log::warn!("config image invalid, restoring defaults");
    let cfg = Config::default();
    save(&cfg, store);
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut cfg = Config::default();
        cfg.eoi = true;
        cfg.paddr = 9;
        cfg.eos = 2;
        cfg.eor = 7;
        cfg.stat = 0x41;
        cfg.rtmo = 2500;
        cfg.idn_mode = 2;
        cfg.serial = 31173;
        cfg.vstr.push_str("GPIB-USB bridge 1.0").unwrap();
        cfg.sname.push_str("pico488").unwrap();

        let mut rec = [0u8; CFG_RECORD_SIZE];
        cfg.encode(&mut rec);
        assert_eq!(Config::decode(&rec).unwrap(), cfg);
    }

    #[test]
    fn load_from_blank_store_yields_defaults_and_persists() {
        let mut store = RamStore::new();
        let cfg = load(&mut store);
        assert_eq!(cfg, Config::default());

        // The defaults were written back, so a second load passes the
        // CRC check unchanged.
        let mut image = [0u8; CFG_IMAGE_SIZE];
        store.read(&mut image);
        assert_eq!(crc16(&image[2..]), u16::from_le_bytes([image[0], image[1]]));
        assert_eq!(load(&mut store), Config::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = RamStore::new();
        let mut cfg = Config::default();
        cfg.cmode = Mode::Device;
        cfg.paddr = 12;
        cfg.stat = 0x41;
        save(&cfg, &mut store);
        assert_eq!(load(&mut store), cfg);
    }

    #[test]
    fn corrupt_image_is_replaced_by_defaults() {
        let mut store = RamStore::new();
        let mut cfg = Config::default();
        cfg.paddr = 7;
        save(&cfg, &mut store);

        let mut image = [0u8; CFG_IMAGE_SIZE];
        store.read(&mut image);
        image[10] ^= 0xA5;
        store.write(&image);

        assert_eq!(load(&mut store), Config::default());
    }

    #[test]
    fn decode_rejects_bad_role() {
        let mut rec = [0u8; CFG_RECORD_SIZE];
        Config::default().encode(&mut rec);
        rec[2] = 7;
        assert!(Config::decode(&rec).is_none());
    }

    #[test]
    fn crc16_known_vector() {
        // Standard Modbus test vector.
        assert_eq!(crc16(&[0x01, 0x04, 0x02, 0xFF, 0xFF]), 0x80B8);
    }
}
