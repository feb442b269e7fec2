//! The structured representation of one CBUS message.
//!
//! An [`Event`] is what the codec produces from a frame and what callers build
//! when they want to put something on the bus.  It carries:
//!
//! | Field            | Wire location                       |
//! |------------------|-------------------------------------|
//! | major priority   | SIDH bits 7‥6                       |
//! | minor priority   | SIDH bits 5‥4                       |
//! | CAN identifier   | SIDH bits 3‥0 and SIDL bits 7‥5     |
//! | opcode           | first data byte                     |
//! | payload          | up to seven following data bytes    |
//!
//! The payload length is never stored separately: it is always the opcode's
//! declared length.  Bytes written beyond that length are kept in storage but
//! are not part of [`Event::payload`], are not encoded, and do not take part in
//! equality.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::opcode::{Opc, Opcode};

/// Largest payload any opcode can declare.
pub const MAX_PAYLOAD: usize = 7;

/// CAN identifiers are seven bits wide.
pub const CAN_ID_MASK: u8 = 0x7F;

// ── Priorities ────────────────────────────────────────────────────────────────

/// Major priority (two bits, lower value wins arbitration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MajorPriority {
    High = 0,
    Med = 1,
    Low = 2,
}

impl MajorPriority {
    /// Maps the two SIDH bits to a priority.  The pattern `0b11` is unassigned.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0x03 {
            0 => Some(MajorPriority::High),
            1 => Some(MajorPriority::Med),
            2 => Some(MajorPriority::Low),
            _ => None,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            MajorPriority::High => "HIGH",
            MajorPriority::Med => "MED",
            MajorPriority::Low => "LOW",
        }
    }
}

/// Minor priority (two bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MinorPriority {
    VHigh = 0,
    High = 1,
    Med = 2,
    Low = 3,
}

impl MinorPriority {
    /// Maps the two SIDH bits to a priority.  Every pattern is assigned.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => MinorPriority::VHigh,
            1 => MinorPriority::High,
            2 => MinorPriority::Med,
            _ => MinorPriority::Low,
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            MinorPriority::VHigh => "VHIGH",
            MinorPriority::High => "HIGH",
            MinorPriority::Med => "MED",
            MinorPriority::Low => "LOW",
        }
    }
}

impl fmt::Display for MajorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for MinorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Display base ──────────────────────────────────────────────────────────────

/// Radix used when rendering numbers in [`crate::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberBase {
    Decimal,
    #[default]
    Hex,
}

impl NumberBase {
    /// `10` selects decimal; every other radix falls back to hex.
    pub fn from_radix(radix: u32) -> Self {
        if radix == 10 {
            NumberBase::Decimal
        } else {
            NumberBase::Hex
        }
    }

    pub const fn radix(self) -> u32 {
        match self {
            NumberBase::Decimal => 10,
            NumberBase::Hex => 16,
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// One CBUS message.
///
/// # Examples
///
/// ```rust
/// use cbus_core::{Event, MajorPriority, MinorPriority, Opc};
///
/// let ev = Event::new(Opc::Acon)
///     .with_priority(MajorPriority::High, MinorPriority::High)
///     .with_can_id(5)
///     .with_node_number(1)
///     .with_event_number(2);
///
/// assert_eq!(ev.payload(), &[0x00, 0x01, 0x00, 0x02]);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "EventFields")]
pub struct Event {
    major_priority: MajorPriority,
    minor_priority: MinorPriority,
    can_id: u8,
    opcode: Opcode,
    data: [u8; MAX_PAYLOAD],
}

/// Deserialized form of [`Event`], normalised through [`Event::from_parts`].
#[derive(Deserialize)]
struct EventFields {
    major_priority: MajorPriority,
    minor_priority: MinorPriority,
    can_id: u8,
    opcode: Opcode,
    data: [u8; MAX_PAYLOAD],
}

impl From<EventFields> for Event {
    fn from(f: EventFields) -> Self {
        Event::from_parts(f.major_priority, f.minor_priority, f.can_id, f.opcode, &f.data)
    }
}

impl Event {
    /// Creates an event with LOW/LOW priority, CAN id 0 and a zeroed payload.
    pub fn new(opcode: impl Into<Opcode>) -> Self {
        Self {
            major_priority: MajorPriority::Low,
            minor_priority: MinorPriority::Low,
            can_id: 0,
            opcode: opcode.into(),
            data: [0; MAX_PAYLOAD],
        }
    }

    /// Reassembles an event from header fields and a payload slice.
    ///
    /// Bytes beyond [`MAX_PAYLOAD`] are ignored.
    pub fn from_parts(
        major_priority: MajorPriority,
        minor_priority: MinorPriority,
        can_id: u8,
        opcode: Opcode,
        payload: &[u8],
    ) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        let n = payload.len().min(MAX_PAYLOAD);
        data[..n].copy_from_slice(&payload[..n]);
        Self {
            major_priority,
            minor_priority,
            can_id: can_id & CAN_ID_MASK,
            opcode,
            data,
        }
    }

    // ── Builders ──────────────────────────────────────────────────────────────

    pub fn with_priority(mut self, major: MajorPriority, minor: MinorPriority) -> Self {
        self.major_priority = major;
        self.minor_priority = minor;
        self
    }

    /// Sets the CAN identifier, keeping only its low seven bits.
    pub fn with_can_id(mut self, can_id: u8) -> Self {
        self.can_id = can_id & CAN_ID_MASK;
        self
    }

    /// Stores a 16-bit node number big-endian at payload offsets 0‥1.
    pub fn with_node_number(mut self, nn: u16) -> Self {
        self.data[..2].copy_from_slice(&nn.to_be_bytes());
        self
    }

    /// Stores a 16-bit event number big-endian at payload offsets 2‥3.
    pub fn with_event_number(mut self, en: u16) -> Self {
        self.data[2..4].copy_from_slice(&en.to_be_bytes());
        self
    }

    /// Same storage as [`Event::with_event_number`]; short events call it a device number.
    pub fn with_device_number(self, dn: u16) -> Self {
        self.with_event_number(dn)
    }

    /// Sets one payload byte.  Indices at or beyond [`MAX_PAYLOAD`] are ignored.
    pub fn with_data(mut self, index: usize, value: u8) -> Self {
        if let Some(slot) = self.data.get_mut(index) {
            *slot = value;
        }
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn major_priority(&self) -> MajorPriority {
        self.major_priority
    }

    pub fn minor_priority(&self) -> MinorPriority {
        self.minor_priority
    }

    pub fn can_id(&self) -> u8 {
        self.can_id
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Shorthand for the catalog entry, `None` for unknown opcodes.
    pub fn opc(&self) -> Option<Opc> {
        self.opcode.known()
    }

    /// The payload bytes, exactly as many as the opcode declares.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.opcode.declared_len()]
    }

    /// Payload byte `index`, or `None` when it lies beyond the declared length.
    pub fn data(&self, index: usize) -> Option<u8> {
        self.payload().get(index).copied()
    }

    /// Big-endian 16-bit value at payload offsets 0‥1.
    pub fn node_number(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    /// Big-endian 16-bit value at payload offsets 2‥3.
    pub fn event_number(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    pub fn device_number(&self) -> u16 {
        self.event_number()
    }

    /// First header byte: `(major << 6) | (minor << 4) | ((can_id & 0x78) >> 3)`.
    pub fn sidh(&self) -> u8 {
        (self.major_priority.bits() << 6)
            | (self.minor_priority.bits() << 4)
            | ((self.can_id & 0x78) >> 3)
    }

    /// Second header byte: `(can_id & 0x07) << 5`.
    pub fn sidl(&self) -> u8 {
        (self.can_id & 0x07) << 5
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new(Opcode::UNKNOWN)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.major_priority == other.major_priority
            && self.minor_priority == other.minor_priority
            && self.can_id == other.can_id
            && self.opcode == other.opcode
            && self.payload() == other.payload()
    }
}

impl Eq for Event {}

// ── Tests ─────────────────────────────────────────────────────────────────────
