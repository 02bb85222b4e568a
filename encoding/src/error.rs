//! Error types for data set encoding and decoding.

use dimse_core::element::VrMismatchError;
use dimse_core::Tag;
use snafu::{Backtrace, Snafu};

/// An error occurred during a text encoding or decoding procedure.
#[derive(Debug, Snafu)]
#[snafu(display("{}", message))]
pub struct TextEncodingError {
    message: String,
    backtrace: Backtrace,
}

impl TextEncodingError {
    /// Build an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        TextEncodingSnafu {
            message: message.into(),
        }
        .build()
    }
}

/// The main error type for data set encoding and decoding.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The input ended before the value described by its headers.
    #[snafu(display("unexpected end of input reading {}", subject))]
    UnexpectedEndOfInput {
        subject: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read {}: {}", subject, source))]
    ReadBytes {
        subject: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not write {}: {}", subject, source))]
    WriteBytes {
        subject: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("element {} has odd length {}", tag, length))]
    OddLength {
        tag: Tag,
        length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("element {} declares length {} not divisible into {}-byte values", tag, length, width))]
    UnalignedLength {
        tag: Tag,
        length: u32,
        width: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("could not decode text of element {}: {}", tag, source))]
    DecodeText {
        tag: Tag,
        #[snafu(backtrace)]
        source: TextEncodingError,
    },

    #[snafu(display("could not encode text of element {}: {}", tag, source))]
    EncodeText {
        tag: Tag,
        #[snafu(backtrace)]
        source: TextEncodingError,
    },

    #[snafu(display("invalid integer string in element {}: {}", tag, source))]
    InvalidIntegerString {
        tag: Tag,
        source: std::num::ParseIntError,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid decimal string in element {}: {}", tag, source))]
    InvalidDecimalString {
        tag: Tag,
        source: std::num::ParseFloatError,
        backtrace: Backtrace,
    },

    #[snafu(display("invalid attribute tag value `{}` in element {}", value, tag))]
    InvalidAttributeTag {
        tag: Tag,
        value: String,
        backtrace: Backtrace,
    },

    #[snafu(display("value of element {} does not fit its representation", tag))]
    ValueOutOfRange { tag: Tag, backtrace: Backtrace },

    #[snafu(display("element {} value is too long to encode ({} bytes)", tag, length))]
    ValueTooLong {
        tag: Tag,
        length: usize,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "native binary element {} must hold exactly one buffer, got {}",
        tag,
        count
    ))]
    MultipleBinaryBuffers {
        tag: Tag,
        count: usize,
        backtrace: Backtrace,
    },

    #[snafu(display("unexpected undefined length on element {}", tag))]
    UnexpectedUndefinedLength { tag: Tag, backtrace: Backtrace },

    #[snafu(display("expected sequence item, got tag {}", tag))]
    UnexpectedItemTag { tag: Tag, backtrace: Backtrace },

    #[snafu(display("unsupported transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    #[snafu(display("sequence of element {} contains a reference cycle", tag))]
    SequenceCycle { tag: Tag, backtrace: Backtrace },

    #[snafu(display("decoded value incompatible with its VR: {}", source))]
    Mismatch {
        source: VrMismatchError,
        backtrace: Backtrace,
    },
}

/// Type alias for results with this crate's error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
