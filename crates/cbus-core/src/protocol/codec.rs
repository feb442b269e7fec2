//! ASCII codec for CBUS frames.
//!
//! Wire format:
//! ```text
//! :S<SIDH:2><SIDL:2>N<OPC:2><DATA:2*len>;
//! ```
//! `len` is the opcode's declared payload length.  Hex digits are accepted in
//! either case and always written in uppercase.  The smallest well-formed
//! frame (no payload, no terminator) is nine characters long.

use hex::FromHexError;
use thiserror::Error;

use super::event::{Event, MajorPriority, MinorPriority, NumberBase, MAX_PAYLOAD};
use super::opcode::{Opcode, ParamKind};

/// Length of the `:S<SIDH><SIDL>N<OPC>` header.
pub const MIN_FRAME_LEN: usize = 9;

/// Written in place of the opcode byte for an event built with [`Opcode::UNKNOWN`].
pub const UNKNOWN_PLACEHOLDER: &str = "??";

const SIDH_POS: usize = 2;
const OPCODE_MARKER_POS: usize = 6;
const OPCODE_POS: usize = 7;

/// Reasons a piece of text is not a decodable frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Shorter than the fixed header.
    #[error("frame too short: need at least 9 characters, got {len}")]
    TooShort { len: usize },

    /// First character is not `:`.
    #[error("frame does not start with ':'")]
    MissingStart,

    /// Second character is not `S` (only standard CAN frames are supported).
    #[error("frame is not a standard frame (expected 'S' at position 1)")]
    MissingStandardMarker,

    /// Character 6 is not `N`.
    #[error("expected 'N' at position 6")]
    MissingOpcodeMarker,

    /// A character where a hex digit was expected.  `position` is the
    /// offending character's index in the frame.
    #[error("invalid hex digit at position {position}")]
    InvalidHex { position: usize },

    /// The major-priority bits hold the unassigned pattern `0b11`.
    #[error("invalid major priority in SIDH 0x{sidh:02X}")]
    InvalidPriority { sidh: u8 },

    /// Fewer payload digits than the opcode declares.
    #[error("{opcode} declares {expected} payload bytes, frame carries {available}")]
    TruncatedPayload {
        opcode: &'static str,
        expected: usize,
        available: usize,
    },

    /// Something other than `;` follows the payload.
    #[error("expected ';' at position {position}, found {found:?}")]
    MissingTerminator { position: usize, found: char },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one frame, given as text or raw bytes, into an [`Event`].
///
/// The terminating `;` is optional; if anything follows a known opcode's
/// payload it must be `;`.  For opcode bytes missing from the catalog the
/// event gets [`Opcode::Unknown`] with an empty payload, and anything after
/// the header is ignored.
///
/// # Errors
///
/// Returns [`FramingError`] when the header is incomplete, a marker is
/// missing, a hex digit is invalid, or the payload is shorter than declared.
///
/// # Examples
///
/// ```rust
/// use cbus_core::{decode_frame, MajorPriority, Opc};
///
/// let ev = decode_frame(":S10A0N9000010002;").unwrap();
/// assert_eq!(ev.major_priority(), MajorPriority::High);
/// assert_eq!(ev.can_id(), 5);
/// assert_eq!(ev.opc(), Some(Opc::Acon));
/// assert_eq!(ev.node_number(), 1);
/// assert_eq!(ev.event_number(), 2);
/// ```
pub fn decode_frame(frame: impl AsRef<[u8]>) -> Result<Event, FramingError> {
    let bytes = frame.as_ref();
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FramingError::TooShort { len: bytes.len() });
    }
    if bytes[0] != b':' {
        return Err(FramingError::MissingStart);
    }
    if bytes[1] != b'S' {
        return Err(FramingError::MissingStandardMarker);
    }
    if bytes[OPCODE_MARKER_POS] != b'N' {
        return Err(FramingError::MissingOpcodeMarker);
    }

    let mut sid = [0u8; 2];
    hex_field(bytes, SIDH_POS, &mut sid)?;
    let [sidh, sidl] = sid;
    let mut opc = [0u8; 1];
    hex_field(bytes, OPCODE_POS, &mut opc)?;
    let opcode = Opcode::from_byte(opc[0]);

    let major = MajorPriority::from_bits(sidh >> 6).ok_or(FramingError::InvalidPriority { sidh })?;
    let minor = MinorPriority::from_bits(sidh >> 4);
    let can_id = ((sidh << 3) & 0x78) | ((sidl >> 5) & 0x07);

    let len = opcode.declared_len();
    let payload_end = MIN_FRAME_LEN + 2 * len;
    if bytes.len() < payload_end {
        return Err(FramingError::TruncatedPayload {
            opcode: opcode.name(),
            expected: len,
            available: (bytes.len() - MIN_FRAME_LEN) / 2,
        });
    }

    let mut payload = [0u8; MAX_PAYLOAD];
    hex_field(bytes, MIN_FRAME_LEN, &mut payload[..len])?;

    if matches!(opcode, Opcode::Known(_)) {
        if let Some(&c) = bytes.get(payload_end) {
            if c != b';' {
                return Err(FramingError::MissingTerminator {
                    position: payload_end,
                    found: c as char,
                });
            }
        }
    }

    Ok(Event::from_parts(major, minor, can_id, opcode, &payload[..len]))
}

/// Encodes an [`Event`] as an uppercase frame including both delimiters.
///
/// An event built with the bare [`Opcode::UNKNOWN`] sentinel gets
/// [`UNKNOWN_PLACEHOLDER`] where the opcode byte would be.
pub fn encode_frame(event: &Event) -> String {
    let payload = event.payload();
    let mut out = String::with_capacity(MIN_FRAME_LEN + 2 * payload.len() + 1);
    out.push_str(":S");
    out.push_str(&hex::encode_upper([event.sidh(), event.sidl()]));
    out.push('N');
    match event.opcode().byte() {
        Some(b) => out.push_str(&hex::encode_upper([b])),
        None => out.push_str(UNKNOWN_PLACEHOLDER),
    }
    out.push_str(&hex::encode_upper(payload));
    out.push(';');
    out
}

/// Renders an event as a single human-readable line for logs.
///
/// ```text
/// MjPri=HIGH MinPri=HIGH CAN_ID=05 OPC=ACON (90) NN=0001 EN=0002
/// ```
///
/// In [`NumberBase::Decimal`] the CAN id, opcode byte and numeric parameters
/// are printed in decimal instead.  STRING parameters are quoted.
pub fn dump(event: &Event, base: NumberBase) -> String {
    let mut line = format!(
        "MjPri={} MinPri={} CAN_ID={} OPC={} ({})",
        event.major_priority(),
        event.minor_priority(),
        format_number(u64::from(event.can_id()), 1, base),
        event.opcode().name(),
        match event.opcode().byte() {
            Some(b) => format_number(u64::from(b), 1, base),
            None => UNKNOWN_PLACEHOLDER.to_string(),
        },
    );

    let payload = event.payload();
    let mut offset = 0;
    for param in event.opcode().params() {
        let Some(field) = payload.get(offset..offset + param.len) else {
            break;
        };
        offset += param.len;
        line.push(' ');
        line.push_str(param.name);
        line.push('=');
        match param.kind {
            ParamKind::Number => {
                let value = field.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                line.push_str(&format_number(value, param.len, base));
            }
            ParamKind::String => {
                line.push('"');
                line.extend(field.iter().map(|&b| b as char));
                line.push('"');
            }
        }
    }
    line
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Fills `out` from the `2 * out.len()` hex digits starting at `position`.
fn hex_field(bytes: &[u8], position: usize, out: &mut [u8]) -> Result<(), FramingError> {
    let digits = bytes
        .get(position..position + 2 * out.len())
        .ok_or(FramingError::InvalidHex { position })?;
    hex::decode_to_slice(digits, out).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { index, .. } => FramingError::InvalidHex {
            position: position + index,
        },
        _ => FramingError::InvalidHex { position },
    })
}

/// Hex is zero-padded to `width_bytes`; decimal is unpadded.
fn format_number(value: u64, width_bytes: usize, base: NumberBase) -> String {
    match base {
        NumberBase::Hex => {
            let be = value.to_be_bytes();
            hex::encode_upper(&be[be.len() - width_bytes.clamp(1, be.len())..])
        }
        NumberBase::Decimal => value.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
