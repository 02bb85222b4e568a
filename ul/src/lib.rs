//! This crate contains the types and methods needed to interact
//! with DICOM nodes through the upper layer protocol.
//!
//! - The [`pdu`] module
//!   provides data structures representing _protocol data units_,
//!   which are passed around as part of the DICOM network communication
//!   support, along with their readers and writers.
//! - The [`association`] module
//!   comprises abstractions for establishing and negotiating associations
//!   between application entities via the upper layer protocol by TCP,
//!   and for exchanging P-DATA over an established association.
//!
//! Higher level concerns, such as DIMSE messages and the concrete
//! service class user and provider loops, are built on top of this crate.
pub mod association;
pub mod pdu;

/// The implementation class UID advertised in association negotiation.
///
/// Generated as per the standard, part 5, section B.2.
/// This UID may change in future versions, even between patch versions.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.305828752226060959919747607101927349322";

/// The implementation version name advertised in association negotiation.
///
/// This name may change in future versions, even between patch versions.
pub const IMPLEMENTATION_VERSION_NAME: &str = "DIMSE-rs 0.1.0";

// re-exports

pub use association::{Association, ClientAssociationOptions, ServerAssociationOptions};
pub use pdu::read_pdu;
pub use pdu::write_pdu;
pub use pdu::Pdu;
