//! This crate serves as a parent for the library crates
//! of the DIMSE-rs project.
//!
//! For the data model, see [`core`](dimse_core).
//! For establishing associations and exchanging messages,
//! see [`ul`](dimse_ul) and [`service`](dimse_service).
pub use dimse_core as core;
pub use dimse_encoding as encoding;
pub use dimse_service as service;
pub use dimse_ul as ul;
