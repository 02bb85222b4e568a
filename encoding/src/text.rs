//! Text encoding and decoding for DICOM string values.
//!
//! The protocol layer only requires the default character repertoire
//! (ISO-IR 6) and ISO-IR 192 (Unicode in UTF-8); other repertoires
//! declared through Specific Character Set are not interpreted here.

use encoding::all::{ISO_8859_1, UTF_8};
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use std::fmt::Debug;

use crate::error::TextEncodingError;

type Result<T> = std::result::Result<T, TextEncodingError>;

/// A holder of encoding and decoding mechanisms for text in DICOM content,
/// which according to the standard, depends on the specific character set.
pub trait TextCodec {
    /// Obtain a unique name of the text encoding,
    /// which may be used as the value of a
    /// Specific Character Set (0008,0005) element to refer to this codec.
    fn name(&self) -> &'static str;

    /// Decode the given byte buffer as a single string. The resulting string
    /// _may_ contain backslash characters ('\') to delimit individual values,
    /// and should be split later on if required.
    fn decode(&self, text: &[u8]) -> Result<String>;

    /// Encode a text value into a byte vector. The input string can
    /// feature multiple text values by using the backslash character ('\')
    /// as the value delimiter.
    fn encode(&self, text: &str) -> Result<Vec<u8>>;
}

impl<T: ?Sized> TextCodec for Box<T>
where
    T: TextCodec,
{
    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn decode(&self, text: &[u8]) -> Result<String> {
        self.as_ref().decode(text)
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>> {
        self.as_ref().encode(text)
    }
}

impl<T: ?Sized> TextCodec for &T
where
    T: TextCodec,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn decode(&self, text: &[u8]) -> Result<String> {
        (**self).decode(text)
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>> {
        (**self).encode(text)
    }
}

/// An enum type for the supported character sets.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum SpecificCharacterSet {
    /// The default character set (ISO-IR 6).
    #[default]
    Default,
    /// The Unicode character set defined in ISO-IR 192,
    /// based on the UTF-8 encoding.
    IsoIr192,
}

impl SpecificCharacterSet {
    /// Obtain the character set for the given Specific Character Set code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim_end() {
            "" | "ISO_IR 6" | "ISO 2022 IR 6" => Some(SpecificCharacterSet::Default),
            "ISO_IR 192" => Some(SpecificCharacterSet::IsoIr192),
            _ => None,
        }
    }

    /// Retrieve the respective text codec.
    pub fn codec(self) -> Box<dyn TextCodec> {
        match self {
            SpecificCharacterSet::Default => Box::new(DefaultCharacterSetCodec),
            SpecificCharacterSet::IsoIr192 => Box::new(Utf8CharacterSetCodec),
        }
    }
}

/// Data type representing the default character set.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct DefaultCharacterSetCodec;

impl TextCodec for DefaultCharacterSetCodec {
    fn name(&self) -> &'static str {
        "ISO_IR 6"
    }

    fn decode(&self, text: &[u8]) -> Result<String> {
        ISO_8859_1
            .decode(text, DecoderTrap::Strict)
            .map_err(TextEncodingError::new)
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>> {
        ISO_8859_1
            .encode(text, EncoderTrap::Strict)
            .map_err(TextEncodingError::new)
    }
}

/// Data type representing the ISO-IR 192 (UTF-8) character set.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Utf8CharacterSetCodec;

impl TextCodec for Utf8CharacterSetCodec {
    fn name(&self) -> &'static str {
        "ISO_IR 192"
    }

    fn decode(&self, text: &[u8]) -> Result<String> {
        UTF_8
            .decode(text, DecoderTrap::Strict)
            .map_err(TextEncodingError::new)
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>> {
        UTF_8
            .encode(text, EncoderTrap::Strict)
            .map_err(TextEncodingError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_codec_round_trip() {
        let codec = DefaultCharacterSetCodec;
        let bytes = codec.encode("Doe^John\\Roe^Jane").unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), "Doe^John\\Roe^Jane");
    }

    #[test]
    fn character_set_from_code() {
        assert_eq!(
            SpecificCharacterSet::from_code("ISO_IR 6"),
            Some(SpecificCharacterSet::Default)
        );
        assert_eq!(
            SpecificCharacterSet::from_code("ISO_IR 192"),
            Some(SpecificCharacterSet::IsoIr192)
        );
        assert_eq!(SpecificCharacterSet::from_code("ISO_IR 100"), None);
    }
}
