//! Value representations and their encoding metadata.

use std::fmt;
use std::str::{from_utf8, FromStr};

use crate::value::ValueKind;

/// An enum type for a DICOM value representation.
///
/// Each representation determines the category its values belong to
/// (see [`ValueKind`]) and how those values are laid out on the wire:
/// the length field form under explicit VR encodings, the padding byte
/// used to keep values at an even length, and the width of a single
/// binary-encoded value where one is fixed.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub enum VR {
    /// Application entity title: up to 16 characters.
    AE,
    /// Age, as a fixed 4-character string such as `042Y`.
    AS,
    /// The tag of another data element.
    AT,
    /// A coded identifier string.
    CS,
    /// A calendar date, as `YYYYMMDD` text.
    DA,
    /// A decimal number in text form.
    DS,
    /// A date and time of day, possibly with a UTC offset.
    DT,
    /// A single precision (32-bit) IEEE 754 number.
    FL,
    /// A double precision (64-bit) IEEE 754 number.
    FD,
    /// An integer in text form.
    IS,
    /// A string of up to 64 characters.
    LO,
    /// Free text of up to 10240 characters.
    LT,
    /// A stream of bytes.
    OB,
    /// A stream of 64-bit floating point words.
    OD,
    /// A stream of 32-bit floating point words.
    OF,
    /// A stream of 32-bit words.
    OL,
    /// A stream of 16-bit words.
    OW,
    /// A person name, with caret-separated components.
    PN,
    /// A string of up to 16 characters.
    SH,
    /// A signed 32-bit integer.
    SL,
    /// A sequence of nested data set items.
    SQ,
    /// A signed 16-bit integer.
    SS,
    /// Free text of up to 1024 characters.
    ST,
    /// A time of day, as `HHMMSS` text with optional fraction.
    TM,
    /// A string with no practical length limit.
    UC,
    /// A unique identifier, in dotted numeric form.
    UI,
    /// An unsigned 32-bit integer.
    UL,
    /// A value of unknown representation, kept as raw bytes.
    UN,
    /// A URI or URL reference.
    UR,
    /// An unsigned 16-bit integer.
    US,
    /// Free text with no practical length limit.
    UT,
}

/// Every representation paired with its two-letter code,
/// in declaration order, driving all of the string conversions.
static CODES: [(VR, &str); 31] = [
    (VR::AE, "AE"),
    (VR::AS, "AS"),
    (VR::AT, "AT"),
    (VR::CS, "CS"),
    (VR::DA, "DA"),
    (VR::DS, "DS"),
    (VR::DT, "DT"),
    (VR::FL, "FL"),
    (VR::FD, "FD"),
    (VR::IS, "IS"),
    (VR::LO, "LO"),
    (VR::LT, "LT"),
    (VR::OB, "OB"),
    (VR::OD, "OD"),
    (VR::OF, "OF"),
    (VR::OL, "OL"),
    (VR::OW, "OW"),
    (VR::PN, "PN"),
    (VR::SH, "SH"),
    (VR::SL, "SL"),
    (VR::SQ, "SQ"),
    (VR::SS, "SS"),
    (VR::ST, "ST"),
    (VR::TM, "TM"),
    (VR::UC, "UC"),
    (VR::UI, "UI"),
    (VR::UL, "UL"),
    (VR::UN, "UN"),
    (VR::UR, "UR"),
    (VR::US, "US"),
    (VR::UT, "UT"),
];

impl VR {
    /// Obtain the value representation corresponding to the given two
    /// bytes of an explicit VR element header.
    ///
    /// Returns `None` for a code outside the repertoire, in which case
    /// readers are expected to fall back to [`VR::UN`] per the standard.
    pub fn from_binary(code: [u8; 2]) -> Option<Self> {
        from_utf8(&code).ok().and_then(|code| code.parse().ok())
    }

    /// The two-letter code of this representation.
    pub fn to_str(self) -> &'static str {
        CODES[self as usize].1
    }

    /// The two-letter code of this representation, as header bytes.
    pub fn to_bytes(self) -> [u8; 2] {
        let code = self.to_str().as_bytes();
        [code[0], code[1]]
    }

    /// The value category which carries values of this representation.
    pub fn kind(self) -> ValueKind {
        use VR::*;
        match self {
            IS | SL | SS | UL | US => ValueKind::Integers,
            DS | FL | FD => ValueKind::Reals,
            AE | AS | AT | CS | DA | DT | LO | LT | PN | SH | ST | TM | UC | UI | UR | UT => {
                ValueKind::Strings
            }
            SQ => ValueKind::Items,
            OB | OD | OF | OL | OW | UN => ValueKind::Binary,
        }
    }

    /// Whether explicit VR encodings use the long form for this
    /// representation: a 2-byte reserved field followed by a 4-byte
    /// length, instead of a 2-byte length.
    pub fn has_long_length(self) -> bool {
        use VR::*;
        matches!(self, OB | OD | OF | OL | OW | SQ | UC | UN | UR | UT)
    }

    /// The byte used to pad values of this representation
    /// to an even length.
    pub fn padding(self) -> u8 {
        use VR::*;
        match self {
            UI | OB | UN => 0x00,
            _ => b' ',
        }
    }

    /// The fixed width in bytes of a single binary-encoded value,
    /// for representations with a binary wire form.
    pub fn width(self) -> Option<usize> {
        use VR::*;
        match self {
            SS | US => Some(2),
            AT | FL | SL | UL => Some(4),
            FD => Some(8),
            _ => None,
        }
    }
}

/// Obtain the value representation corresponding to the given string,
/// which should hold exactly one two-letter code in upper case.
impl FromStr for VR {
    type Err = &'static str;

    fn from_str(code: &str) -> std::result::Result<Self, Self::Err> {
        CODES
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(vr, _)| *vr)
            .ok_or("no such value representation")
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}
