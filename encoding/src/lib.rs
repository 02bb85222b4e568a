//! This crate contains the encoding and decoding of DICOM data sets
//! under the network transfer syntaxes.
//!
//! The supported families are Implicit VR Little Endian (the default
//! transfer syntax), Explicit VR Little Endian, Explicit VR Big Endian,
//! and the encapsulated transfer syntaxes, for which pixel data travels
//! as a sequence of items under an undefined length (the compressed
//! frames themselves are opaque to this crate).
pub mod decode;
pub mod encode;
pub mod error;
pub mod text;
pub mod transfer_syntax;

pub use decode::read_data_set;
pub use encode::{encode_data_set, write_data_set};
pub use error::{Error, Result, TextEncodingError};
pub use transfer_syntax::TransferSyntax;
