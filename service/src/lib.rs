//! This crate contains the DIMSE message layer and the core service
//! class implementations built on top of the upper layer protocol.
//!
//! - The [`message`] module defines the [`Message`] type,
//!   pairing a command set with an optional data set,
//!   and the [`commands`] module provides typed wrappers
//!   for the C-ECHO, C-STORE and C-FIND requests and responses.
//! - [`send_message`] and [`receive_message`] exchange DIMSE messages
//!   over an established [association](dimse_ul::Association),
//!   fragmenting and reassembling them across P-DATA PDUs.
//! - The [`scu`] module provides the service class user operations
//!   ([`EchoScu`], [`StoreScu`], [`FindScu`]),
//!   and the [`scp`] module the provider side
//!   ([`Dispatcher`], [`EchoScp`], [`StoreScp`], [`FindScp`]).
pub mod commands;
pub mod error;
pub mod exchange;
pub mod message;
pub mod scp;
pub mod scu;
pub mod status;

pub use commands::{CCancelRq, CEchoRq, CEchoRsp, CFindRq, CFindRsp, CStoreRq, CStoreRsp};
pub use error::{Error, Result};
pub use exchange::{receive_message, send_message};
pub use message::{CommandField, Message, Priority};
pub use scp::{
    Dispatcher, EchoScp, FindScp, Provider, ResponseGenerator, StoreScp, VecResponseGenerator,
};
pub use scu::{EchoScu, FindScu, StoreScu};
pub use status::{Status, StatusClass};
