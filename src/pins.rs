//! The GPIB pin adapter contract.
//!
//! Everything above this layer talks to the bus wires through the four
//! primitives of [`GpibPins`].  Concrete adapters exist for the RP2040
//! (`infra::gpio`) and for the in-memory loopback used by the tests
//! (`sim`).

// Copyright (c) 2026 pico488 developers
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use bitflags::bitflags;

bitflags! {
    /// Control-line selector and state mask.
    ///
    /// Bit order matches the wire-control bytes used throughout the bus
    /// engine: IFC, NDAC, NRFD, DAV, EOI, REN, SRQ, ATN from bit 0 to
    /// bit 7.
    #[repr(transparent)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Ctrl: u8 {
        const IFC  = 0x01;
        const NDAC = 0x02;
        const NRFD = 0x04;
        const DAV  = 0x08;
        const EOI  = 0x10;
        const REN  = 0x20;
        const SRQ  = 0x40;
        const ATN  = 0x80;
    }
}

/// Electrical level of a bus line.  GPIB is negative logic: a line is
/// asserted when it is low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[inline]
    pub fn is_low(self) -> bool {
        self == Level::Low
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// Whether a `set_control` call changes pin levels or pin directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    /// `bits` carries output levels: 0 = low, 1 = high.
    Level,
    /// `bits` carries directions: 0 = input with pull-up, 1 = output.
    Direction,
}

/// Hardware access for one GPIB port: eight data lines (DIO1..DIO8) and
/// eight control lines.
///
/// These four primitives are the only way the upper layers touch the
/// wires.  They complete in a few microseconds and never wait.
pub trait GpibPins {
    /// Set DIO1..8 to input with pull-ups, sample them, and return the
    /// logical byte.  The data lines are negative logic, so a low wire
    /// reads as a 1 bit.
    fn read_data_bus(&mut self) -> u8;

    /// Set DIO1..8 to outputs and drive the logical byte `db`: wire i is
    /// pulled low iff bit i of `db` is set.
    fn write_data_bus(&mut self, db: u8);

    /// For every control line selected by `mask`, apply the corresponding
    /// bit of `bits` as a level or a direction depending on `op`.  Lines
    /// outside `mask` are unaffected.
    fn set_control(&mut self, bits: u8, mask: u8, op: PinOp);

    /// Sample a single control line.  `line` must contain exactly one
    /// flag.
    fn read_control(&mut self, line: Ctrl) -> Level;

    /// Return the data lines to input with pull-ups without using the
    /// sampled value.
    fn release_data_bus(&mut self) {
        let _ = self.read_data_bus();
    }
}
