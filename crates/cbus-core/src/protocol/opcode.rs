//! The CBUS opcode catalog.
//!
//! # What is an opcode? (for beginners)
//!
//! The first data byte of every CBUS message is its *opcode*: it says what the
//! message means ("accessory on", "query node", "set node variable", …).  The
//! opcode also fixes how many payload bytes follow it.  The number is not
//! stored anywhere on the wire; it is encoded in the opcode's top three bits:
//!
//! ```text
//!   opcode byte:  L L L x x x x x
//!                 └─┬─┘
//!                   └── payload length in bytes (0‥7)
//! ```
//!
//! So `0x90` (ACON) carries `(0x90 >> 5) & 7 = 4` bytes: a 16-bit node number
//! followed by a 16-bit event number.
//!
//! # The catalog
//!
//! The catalog is a closed table known at build time.  Each entry records the
//! byte value, the mnemonic, and the named parameter fields that make up the
//! payload.  The table is written once, in [`opcode_catalog!`], and the macro
//! generates the [`Opc`] enum plus its lookup functions from it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a parameter field is rendered by [`crate::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Big-endian unsigned integer, rendered in the configured display base.
    Number,
    /// Raw characters, rendered between quotes.
    String,
}

/// One named field of an opcode's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    /// Field name as shown in dumps (`NN`, `EN`, `EV#`, …).
    pub name: &'static str,
    /// Number of payload bytes occupied by the field.
    pub len: usize,
    /// Rendering rule.
    pub kind: ParamKind,
}

impl Param {
    /// A numeric field of `len` bytes.
    pub const fn number(name: &'static str, len: usize) -> Self {
        Self {
            name,
            len,
            kind: ParamKind::Number,
        }
    }

    /// A character field of `len` bytes.
    pub const fn string(name: &'static str, len: usize) -> Self {
        Self {
            name,
            len,
            kind: ParamKind::String,
        }
    }
}

// Parameter shapes shared by many opcodes.
const NN: Param = Param::number("NN", 2);
const EN: Param = Param::number("EN", 2);
const DN: Param = Param::number("DN", 2);
const SESSION: Param = Param::number("Session", 1);

const fn byte(name: &'static str) -> Param {
    Param::number(name, 1)
}

/// Generates [`Opc`] and its lookup tables from one list of catalog entries.
///
/// Each entry is `Variant = byte, "MNEMONIC" => [params…];`.
macro_rules! opcode_catalog {
    ($( $variant:ident = $value:literal, $name:literal => [ $( $param:expr ),* $(,)? ]; )*) => {
        /// Every opcode in the catalog.
        ///
        /// The discriminant is the opcode byte, so `Opc::Acon as u8 == 0x90`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opc {
            $( $variant = $value, )*
        }

        impl Opc {
            /// All catalog entries in ascending byte order.
            pub const ALL: &'static [Opc] = &[ $( Opc::$variant, )* ];

            /// The CBUS mnemonic, e.g. `"ACON"`.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Opc::$variant => $name, )*
                }
            }

            /// The named parameter fields, in payload order.
            pub fn params(self) -> &'static [Param] {
                match self {
                    $( Opc::$variant => {
                        const PARAMS: &[Param] = &[ $( $param ),* ];
                        PARAMS
                    } )*
                }
            }

            /// Looks up the catalog entry for an opcode byte.
            pub const fn from_byte(value: u8) -> Option<Opc> {
                match value {
                    $( $value => Some(Opc::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

opcode_catalog! {
    Ack = 0x00, "ACK" => [];
    Nak = 0x01, "NAK" => [];
    Hlt = 0x02, "HLT" => [];
    Bon = 0x03, "BON" => [];
    Tof = 0x04, "TOF" => [];
    Ton = 0x05, "TON" => [];
    Estop = 0x06, "ESTOP" => [];
    Arst = 0x07, "ARST" => [];
    Rtof = 0x08, "RTOF" => [];
    Rton = 0x09, "RTON" => [];
    Restp = 0x0A, "RESTP" => [];
    Rstat = 0x0C, "RSTAT" => [];
    Qnn = 0x0D, "QNN" => [];
    Rqnp = 0x10, "RQNP" => [];
    Rqmn = 0x11, "RQMN" => [];
    Kloc = 0x21, "KLOC" => [SESSION];
    Qloc = 0x22, "QLOC" => [SESSION];
    Dkeep = 0x23, "DKEEP" => [SESSION];
    Dbg1 = 0x30, "DBG1" => [byte("Status")];
    Rloc = 0x40, "RLOC" => [byte("Dat1"), byte("Dat2")];
    Snn = 0x42, "SNN" => [NN];
    Stmod = 0x44, "STMOD" => [SESSION, byte("mode")];
    Pcon = 0x45, "PCON" => [SESSION, byte("Consist#")];
    Kcon = 0x46, "KCON" => [SESSION, byte("Consist#")];
    Dspd = 0x47, "DSPD" => [SESSION, byte("Speed/Dir")];
    Dflg = 0x48, "DFLG" => [SESSION, byte("SpeedMode")];
    Dfnon = 0x49, "DFNON" => [SESSION, byte("Fnum")];
    Dfnof = 0x4A, "DFNOF" => [SESSION, byte("Fnum")];
    Sstat = 0x4C, "SSTAT" => [SESSION, byte("Status")];
    Rqnn = 0x50, "RQNN" => [NN];
    Nnrel = 0x51, "NNREL" => [NN];
    Nnack = 0x52, "NNACK" => [NN];
    Nnlrn = 0x53, "NNLRN" => [NN];
    Nnuln = 0x54, "NNULN" => [NN];
    Nnclr = 0x55, "NNCLR" => [NN];
    Nnevn = 0x56, "NNEVN" => [NN];
    Nerd = 0x57, "NERD" => [NN];
    Rqevn = 0x58, "RQEVN" => [NN];
    Wrack = 0x59, "WRACK" => [NN];
    Rqdat = 0x5A, "RQDAT" => [NN];
    Rqdds = 0x5B, "RQDDS" => [NN];
    Bootm = 0x5C, "BOOTM" => [NN];
    Enum = 0x5D, "ENUM" => [NN];
    Dfun = 0x60, "DFUN" => [SESSION, byte("Fn1"), byte("Fn2")];
    Gloc = 0x61, "GLOC" => [Param::number("Addr", 2), byte("Flags")];
    Err = 0x63, "ERR" => [byte("Dat1"), byte("Dat2"), byte("Dat3")];
    Cmderr = 0x6F, "CMDERR" => [NN, byte("Error")];
    Evnlf = 0x70, "EVNLF" => [NN, byte("EVSPC")];
    Nvrd = 0x71, "NVRD" => [NN, byte("NV#")];
    Nenrd = 0x72, "NENRD" => [NN, byte("EN#")];
    Rqnpn = 0x73, "RQNPN" => [NN, byte("Para#")];
    Numev = 0x74, "NUMEV" => [NN, byte("No. of events")];
    Canid = 0x75, "CANID" => [NN, byte("CAN_ID")];
    Rdcc3 = 0x80, "RDCC3" => [byte("Rep"), byte("Byte1"), byte("Byte2"), byte("Byte3")];
    Wcvo = 0x82, "WCVO" => [SESSION, Param::number("CV", 2), byte("Value")];
    Wcvb = 0x83, "WCVB" => [SESSION, Param::number("CV", 2), byte("Value")];
    Qcvs = 0x84, "QCVS" => [SESSION, Param::number("CV", 2), byte("Mode")];
    Pcvs = 0x85, "PCVS" => [SESSION, Param::number("CV", 2), byte("Value")];
    Acon = 0x90, "ACON" => [NN, EN];
    Acof = 0x91, "ACOF" => [NN, EN];
    Areq = 0x92, "AREQ" => [NN, EN];
    Aron = 0x93, "ARON" => [NN, EN];
    Arof = 0x94, "AROF" => [NN, EN];
    Evuln = 0x95, "EVULN" => [NN, EN];
    Nvset = 0x96, "NVSET" => [NN, byte("NV#"), byte("NV val")];
    Nvans = 0x97, "NVANS" => [NN, byte("NV#"), byte("NV val")];
    Ason = 0x98, "ASON" => [NN, DN];
    Asof = 0x99, "ASOF" => [NN, DN];
    Asrq = 0x9A, "ASRQ" => [NN, DN];
    Paran = 0x9B, "PARAN" => [NN, byte("Para#"), byte("Para val")];
    Reval = 0x9C, "REVAL" => [NN, byte("EN#"), byte("EV#")];
    Arson = 0x9D, "ARSON" => [NN, DN];
    Arsof = 0x9E, "ARSOF" => [NN, DN];
    Rdcc4 = 0xA0, "RDCC4" => [byte("REP"), byte("Byte0"), byte("Byte1"), byte("Byte2"), byte("Byte3")];
    Wcvs = 0xA2, "WCVS" => [SESSION, Param::number("CV", 2), byte("Mode"), byte("Value")];
    Acon1 = 0xB0, "ACON1" => [NN, EN, byte("data")];
    Acof1 = 0xB1, "ACOF1" => [NN, EN, byte("data")];
    Reqev = 0xB2, "REQEV" => [NN, EN, byte("EV#")];
    Aron1 = 0xB3, "ARON1" => [NN, EN, byte("data")];
    Arof1 = 0xB4, "AROF1" => [NN, EN, byte("data")];
    Neval = 0xB5, "NEVAL" => [NN, byte("EN#"), byte("EV#"), byte("EVval")];
    Pnn = 0xB6, "PNN" => [NN, byte("Manuf Id"), byte("Module Id"), byte("Flags")];
    Ason1 = 0xB8, "ASON1" => [NN, DN, byte("data")];
    Asof1 = 0xB9, "ASOF1" => [NN, DN, byte("data")];
    Arson1 = 0xBD, "ARSON1" => [NN, DN, byte("data")];
    Arsof1 = 0xBE, "ARSOF1" => [NN, DN, byte("data")];
    Rdcc5 = 0xC0, "RDCC5" => [byte("REP"), byte("Byte0"), byte("Byte1"), byte("Byte2"), byte("Byte3"), byte("Byte4")];
    Wcvoa = 0xC2, "WCVOA" => [Param::number("Addr", 2), Param::number("CV", 2), byte("Mode"), byte("Value")];
    Fclk = 0xCF, "FCLK" => [byte("mins"), byte("hrs"), byte("wdmon"), byte("div"), byte("mday"), byte("temp")];
    Acon2 = 0xD0, "ACON2" => [NN, EN, byte("data1"), byte("data2")];
    Acof2 = 0xD1, "ACOF2" => [NN, EN, byte("data1"), byte("data2")];
    Evlrn = 0xD2, "EVLRN" => [NN, EN, byte("EV#"), byte("EV val")];
    Evans = 0xD3, "EVANS" => [NN, EN, byte("EV#"), byte("EV val")];
    Aron2 = 0xD4, "ARON2" => [NN, EN, byte("data1"), byte("data2")];
    Arof2 = 0xD5, "AROF2" => [NN, EN, byte("data1"), byte("data2")];
    Ason2 = 0xD8, "ASON2" => [NN, DN, byte("data1"), byte("data2")];
    Asof2 = 0xD9, "ASOF2" => [NN, DN, byte("data1"), byte("data2")];
    Arson2 = 0xDD, "ARSON2" => [NN, DN, byte("data1"), byte("data2")];
    Arsof2 = 0xDE, "ARSOF2" => [NN, DN, byte("data1"), byte("data2")];
    Rdcc6 = 0xE0, "RDCC6" => [byte("REP"), byte("Byte0"), byte("Byte1"), byte("Byte2"), byte("Byte3"), byte("Byte4"), byte("Byte5")];
    Ploc = 0xE1, "PLOC" => [SESSION, Param::number("Addr", 2), byte("Speed/Dir"), byte("Fn1"), byte("Fn2"), byte("Fn3")];
    Name = 0xE2, "NAME" => [Param::string("NAME", 7)];
    Stat = 0xE3, "STAT" => [NN, Param::number("CSnum", 2), Param::number("Flags", 2), byte("Unused")];
    Params = 0xEF, "PARAMS" => [byte("PARA 1"), byte("PARA 2"), byte("PARA 3"), byte("PARA 4"), byte("PARA 5"), byte("PARA 6"), byte("PARA 7")];
    Acon3 = 0xF0, "ACON3" => [NN, EN, byte("data1"), byte("data2"), byte("data3")];
    Acof3 = 0xF1, "ACOF3" => [NN, EN, byte("data1"), byte("data2"), byte("data3")];
    Enrsp = 0xF2, "ENRSP" => [NN, byte("EN3"), byte("EN2"), byte("EN1"), byte("EN0"), byte("EN#")];
    Aron3 = 0xF3, "ARON3" => [NN, EN, byte("data1"), byte("data2"), byte("data3")];
    Arof3 = 0xF4, "AROF3" => [NN, EN, byte("data1"), byte("data2"), byte("data3")];
    Evlrni = 0xF5, "EVLRNI" => [NN, EN, byte("EN#"), byte("EV#"), byte("EV val")];
    Acdat = 0xF6, "ACDAT" => [NN, byte("data 1"), byte("data 2"), byte("data 3"), byte("data 4"), byte("data 5")];
    Ardat = 0xF7, "ARDAT" => [NN, byte("data 1"), byte("data 2"), byte("data 3"), byte("data 4"), byte("data 5")];
    Ason3 = 0xF8, "ASON3" => [NN, DN, byte("data1"), byte("data2"), byte("data3")];
    Asof3 = 0xF9, "ASOF3" => [NN, DN, byte("data1"), byte("data2"), byte("data3")];
    Ddes = 0xFA, "DDES" => [DN, byte("data 1"), byte("data 2"), byte("data 3"), byte("data 4"), byte("data 5")];
    Ddrs = 0xFB, "DDRS" => [DN, byte("data 1"), byte("data 2"), byte("data 3"), byte("data 4"), byte("data 5")];
    Arson3 = 0xFD, "ARSON3" => [NN, DN, byte("data1"), byte("data2"), byte("data3")];
    Arsof3 = 0xFE, "ARSOF3" => [NN, DN, byte("data1"), byte("data2"), byte("data3")];
}

impl Opc {
    /// The opcode byte.
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Payload length in bytes, taken from the top three bits of the byte.
    pub const fn declared_len(self) -> usize {
        ((self as u8 >> 5) & 0x07) as usize
    }

    /// Case-insensitive lookup by mnemonic.
    pub fn by_name(name: &str) -> Option<Opc> {
        Opc::ALL
            .iter()
            .copied()
            .find(|opc| opc.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Opc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The opcode carried by an [`crate::Event`].
///
/// Frames whose opcode byte is not in the catalog still decode: they become
/// `Unknown(Some(byte))` with an empty payload, and encode back to the same
/// byte.  [`Opcode::UNKNOWN`] is the bare sentinel for an event built without
/// any opcode; it encodes as the `??` placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// A catalog member.
    Known(Opc),
    /// Not in the catalog; holds the observed byte when there was one.
    Unknown(Option<u8>),
}

impl Opcode {
    /// The sentinel for "no recognisable opcode".
    pub const UNKNOWN: Opcode = Opcode::Unknown(None);

    /// Maps a wire byte to a catalog entry, falling back to `Unknown(Some(byte))`.
    pub fn from_byte(value: u8) -> Opcode {
        match Opc::from_byte(value) {
            Some(opc) => Opcode::Known(opc),
            None => Opcode::Unknown(Some(value)),
        }
    }

    /// The byte to put on the wire, if there is one.
    pub fn byte(self) -> Option<u8> {
        match self {
            Opcode::Known(opc) => Some(opc.value()),
            Opcode::Unknown(raw) => raw,
        }
    }

    /// Payload length; always 0 for unknown opcodes.
    pub fn declared_len(self) -> usize {
        match self {
            Opcode::Known(opc) => opc.declared_len(),
            Opcode::Unknown(_) => 0,
        }
    }

    /// Parameter layout; empty for unknown opcodes.
    pub fn params(self) -> &'static [Param] {
        match self {
            Opcode::Known(opc) => opc.params(),
            Opcode::Unknown(_) => &[],
        }
    }

    /// Mnemonic, or `"UNKNOWN"`.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Known(opc) => opc.name(),
            Opcode::Unknown(_) => "UNKNOWN",
        }
    }

    /// Returns the catalog entry when the opcode is known.
    pub fn known(self) -> Option<Opc> {
        match self {
            Opcode::Known(opc) => Some(opc),
            Opcode::Unknown(_) => None,
        }
    }
}

impl From<Opc> for Opcode {
    fn from(opc: Opc) -> Self {
        Opcode::Known(opc)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks every catalog entry's parameter lengths against its declared length.
///
/// Returns the entries that disagree together with the summed parameter
/// length.  An empty vector means the catalog is consistent.
pub fn catalog_self_test() -> Vec<(Opc, usize)> {
    Opc::ALL
        .iter()
        .filter_map(|&opc| {
            let sum: usize = opc.params().iter().map(|p| p.len).sum();
            (sum != opc.declared_len()).then_some((opc, sum))
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
