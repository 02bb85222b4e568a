//! This crate contains the DIMSE-rs core data model.
//!
//! A DICOM object travelling over the network is represented here as a
//! [`DataSet`]: an ordered mapping from attribute [`Tag`]s to [`Element`]s,
//! each element pairing a [value representation](VR) with a [`Value`].
//! These types are the payload of every DIMSE command and response.
//!
//! The crate also provides a small, static [data dictionary](dictionary)
//! covering the command set and the attributes used by the query and
//! storage services, along with [`tags`] and [`uids`] constants.
pub mod dataset;
pub mod dictionary;
pub mod element;
pub mod tag;
pub mod tags;
pub mod uids;
pub mod value;
pub mod vr;

pub use dataset::DataSet;
pub use element::Element;
pub use tag::Tag;
pub use value::{Value, ValueKind};
pub use vr::VR;
