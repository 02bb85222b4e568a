//! DICOM association module.
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP.
//!
//! As an association requester, often as a service class user (SCU),
//! a new association is started via [`ClientAssociationOptions`].
//! As an association acceptor, usually taking the role of a service
//! class provider (SCP), a newly accepted TCP stream is passed to a
//! previously prepared [`ServerAssociationOptions`].
//!
//! Both produce an established [`Association`] value, which owns the
//! TCP stream, tracks the [association state](AssociationState), and
//! exchanges PDUs until the association is released or aborted.
pub mod client;
pub mod server;

pub(crate) mod pdata;

use std::io::{Cursor, Read, Write};
use std::net::TcpStream;

use bytes::{Buf, BytesMut};
use snafu::{ensure, Backtrace, ResultExt, Snafu};

use crate::pdu::reader::ReadError;
use crate::pdu::writer::WriteError;
use crate::pdu::{
    read_pdu, write_pdu, AbortRQServiceProviderReason, AbortRQSource, AssociationRJResult,
    AssociationRJSource, PDataValueType, Pdu, PresentationContextResultReason, MAXIMUM_PDU_SIZE,
    PDU_HEADER_SIZE,
};

pub use client::ClientAssociationOptions;
pub use pdata::PDataWriter;
pub use server::{AccessControl, AcceptAny, AcceptCalledAeTitle, ServerAssociationOptions};

type Result<T, E = Error> = std::result::Result<T, E>;

/// An error related to association negotiation or PDU exchange.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing at least one abstract syntax to begin negotiation
    MissingAbstractSyntax { backtrace: Backtrace },

    /// could not convert to socket address
    ToAddress {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not connect to peer
    Connect {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not set tcp read timeout
    SetReadTimeout {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not set tcp write timeout
    SetWriteTimeout {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not toggle non-blocking mode on the socket
    SetNonBlocking {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to write PDU: {}", source))]
    SendPdu {
        #[snafu(backtrace)]
        source: WriteError,
    },

    #[snafu(display("failed to read PDU: {}", source))]
    ReceivePdu {
        #[snafu(backtrace)]
        source: ReadError,
    },

    #[snafu(display("unexpected PDU from peer: {}", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedPdu { pdu: Box<Pdu> },

    #[snafu(display("unknown PDU type from peer"))]
    #[non_exhaustive]
    UnknownPdu { pdu: Box<Pdu> },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// association rejected by the peer
    #[snafu(display("association rejected {}", source_info))]
    Rejected {
        result: AssociationRJResult,
        source_info: AssociationRJSource,
        backtrace: Backtrace,
    },

    /// association aborted
    #[snafu(display("association aborted (source {}, reason {})", source_code, reason_code))]
    Aborted {
        source_code: u8,
        reason_code: u8,
        backtrace: Backtrace,
    },

    /// no presentation contexts accepted by the peer
    NoAcceptedPresentationContexts { backtrace: Backtrace },

    #[snafu(display("association is not in a usable state ({:?})", state))]
    NotEstablished {
        state: AssociationState,
        backtrace: Backtrace,
    },

    /// failed to send PDU message on wire
    #[non_exhaustive]
    WireSend {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to read PDU message from wire
    #[non_exhaustive]
    WireRead {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// operation timed out
    #[non_exhaustive]
    Timeout {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "PDU is too large ({} bytes) to be sent to the remote application entity",
        length
    ))]
    #[non_exhaustive]
    SendTooLongPdu { length: usize, backtrace: Backtrace },

    #[snafu(display("connection closed by peer"))]
    ConnectionClosed { backtrace: Backtrace },
}

/// The externally observable states of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    /// No negotiation has taken place.
    Idle,
    /// An A-ASSOCIATE-RQ was sent; awaiting the peer's answer.
    AwaitingAssociationResponse,
    /// Listening for an A-ASSOCIATE-RQ on an accepted connection.
    AwaitingAssociationRequest,
    /// The association is established and ready for data transfer.
    Established,
    /// An A-RELEASE-RQ was sent; awaiting the peer's A-RELEASE-RP.
    AwaitingReleaseResponse,
    /// The association ended with a graceful release.
    Released,
    /// The association ended with an abort or a transport failure.
    Aborted,
}

/// The role this application entity took in the association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// The association requester, usually a service class user.
    User,
    /// The association acceptor, usually a service class provider.
    Provider,
}

/// A presentation context after negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationContextNegotiated {
    /// the presentation context identifier
    pub id: u8,
    /// the abstract syntax (SOP class) UID
    pub abstract_syntax: String,
    /// the transfer syntax chosen by the acceptor
    pub transfer_syntax: String,
    /// the negotiation outcome for this context
    pub reason: PresentationContextResultReason,
    /// whether the association requester may act as an SCU on this context
    pub scu_role: bool,
    /// whether the association requester may act as an SCP on this context
    pub scp_role: bool,
}

impl PresentationContextNegotiated {
    /// Whether this context was accepted by the peer.
    pub fn is_accepted(&self) -> bool {
        self.reason == PresentationContextResultReason::Acceptance
    }
}

/// Read one PDU from the socket, buffering partial reads.
///
/// Bytes past the first whole PDU are kept in `read_buffer`
/// for subsequent calls.
pub(crate) fn read_pdu_from_wire(
    socket: &mut TcpStream,
    read_buffer: &mut BytesMut,
    max_pdu_length: u32,
    strict: bool,
) -> Result<Pdu> {
    loop {
        let mut cursor = Cursor::new(&read_buffer[..]);
        if let Some(pdu) = read_pdu(&mut cursor, max_pdu_length, strict).context(ReceivePduSnafu)?
        {
            let consumed = cursor.position() as usize;
            read_buffer.advance(consumed);
            return Ok(pdu);
        }

        let mut chunk = [0_u8; 8192];
        let received = match socket.read(&mut chunk) {
            Ok(received) => received,
            Err(e) if is_timeout(&e) => return Err(e).context(TimeoutSnafu),
            Err(e) => return Err(e).context(WireReadSnafu),
        };
        ensure!(received != 0, ConnectionClosedSnafu);
        read_buffer.extend_from_slice(&chunk[..received]);
    }
}

pub(crate) fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// An established DICOM association.
///
/// The value exclusively owns the TCP stream and runs the association
/// state machine: it is obtained in the
/// [`Established`](AssociationState::Established) state and travels
/// towards [`Released`](AssociationState::Released) or
/// [`Aborted`](AssociationState::Aborted), at which point the socket is
/// shut down exactly once. Dropping a still-live association aborts it.
///
/// All I/O is blocking and strictly serialized: one logical task should
/// own the association at any given time.
#[derive(Debug)]
pub struct Association {
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// The current association state
    state: AssociationState,
    /// The role taken in the negotiation
    role: ServiceRole,
    /// All negotiated presentation contexts, including refused ones
    presentation_contexts: Vec<PresentationContextNegotiated>,
    /// The maximum PDU length that this entity is expecting to receive
    local_max_pdu_length: u32,
    /// The maximum PDU length that the peer is expecting to receive
    peer_max_pdu_length: u32,
    /// The application entity title of the other DICOM node
    peer_ae_title: String,
    /// Read buffer from the socket
    read_buffer: BytesMut,
    /// Write buffer to send fully assembled PDUs on the wire
    write_buffer: Vec<u8>,
    /// Whether to receive PDUs in strict mode
    strict: bool,
    /// The message ID counter for this association
    message_id: u16,
    /// Whether the socket has already been shut down
    closed: bool,
}

impl Association {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        socket: TcpStream,
        role: ServiceRole,
        presentation_contexts: Vec<PresentationContextNegotiated>,
        local_max_pdu_length: u32,
        peer_max_pdu_length: u32,
        peer_ae_title: String,
        read_buffer: BytesMut,
        strict: bool,
    ) -> Self {
        Association {
            socket,
            state: AssociationState::Established,
            role,
            presentation_contexts,
            local_max_pdu_length,
            peer_max_pdu_length,
            peer_ae_title,
            read_buffer,
            write_buffer: Vec::with_capacity(peer_max_pdu_length.min(MAXIMUM_PDU_SIZE) as usize),
            strict,
            message_id: 1,
            closed: false,
        }
    }

    /// The current state of the association state machine.
    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// The role this application entity took in the association.
    pub fn role(&self) -> ServiceRole {
        self.role
    }

    /// Obtain the remote DICOM node's application entity title.
    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    /// Obtain a view of all negotiated presentation contexts,
    /// including the ones the acceptor refused.
    pub fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    /// Retrieve the maximum PDU length admitted by the peer.
    pub fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    /// Retrieve the maximum PDU length this entity admits.
    pub fn local_max_pdu_length(&self) -> u32 {
        self.local_max_pdu_length
    }

    /// Whether the underlying socket has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take the next fresh message ID for a request on this association.
    pub fn next_message_id(&mut self) -> u16 {
        let id = self.message_id;
        self.message_id = self.message_id.wrapping_add(1).max(1);
        id
    }

    /// Send a PDU message to the peer.
    ///
    /// Fails if the association is not established, or if a P-DATA PDU
    /// would exceed the peer's maximum PDU length.
    pub fn send(&mut self, pdu: &Pdu) -> Result<()> {
        ensure!(
            self.state == AssociationState::Established,
            NotEstablishedSnafu { state: self.state }
        );
        self.send_pdu(pdu)
    }

    fn send_pdu(&mut self, pdu: &Pdu) -> Result<()> {
        self.write_buffer.clear();
        write_pdu(&mut self.write_buffer, pdu).context(SendPduSnafu)?;
        // the PDU length field value must not exceed the peer maximum
        let pdu_length = self.write_buffer.len() - PDU_HEADER_SIZE as usize;
        if pdu_length > self.peer_max_pdu_length as usize {
            return SendTooLongPduSnafu { length: pdu_length }.fail();
        }
        if let Err(e) = self.socket.write_all(&self.write_buffer) {
            self.state = AssociationState::Aborted;
            self.close();
            return if is_timeout(&e) {
                Err(e).context(TimeoutSnafu)
            } else {
                Err(e).context(WireSendSnafu)
            };
        }
        Ok(())
    }

    /// Read the next PDU message from the peer.
    ///
    /// State machine effects are applied before the PDU is returned:
    /// a received A-ABORT moves the association to `Aborted` and closes
    /// the socket; a received A-RELEASE-RQ is acknowledged with
    /// A-RELEASE-RP, moving to `Released`. A timeout on the socket
    /// fires an A-ABORT (service user, no reason given) and fails with
    /// [`Error::Timeout`].
    pub fn receive(&mut self) -> Result<Pdu> {
        ensure!(
            matches!(
                self.state,
                AssociationState::Established | AssociationState::AwaitingReleaseResponse
            ),
            NotEstablishedSnafu { state: self.state }
        );
        let pdu = match read_pdu_from_wire(
            &mut self.socket,
            &mut self.read_buffer,
            self.local_max_pdu_length,
            self.strict,
        ) {
            Ok(pdu) => pdu,
            Err(e @ Error::Timeout { .. }) => {
                // fire an abort before giving up on the association
                let _ = self.send_pdu(&Pdu::AbortRQ {
                    source: AbortRQSource::ServiceUser,
                });
                self.state = AssociationState::Aborted;
                self.close();
                return Err(e);
            }
            Err(e) => {
                self.state = AssociationState::Aborted;
                self.close();
                return Err(e);
            }
        };
        self.apply_state_effects(&pdu)?;
        Ok(pdu)
    }

    /// Check the inbound channel for a PDU without blocking.
    ///
    /// Returns `Ok(None)` when no whole PDU is available right now;
    /// partially received bytes remain buffered.
    pub fn try_receive(&mut self) -> Result<Option<Pdu>> {
        ensure!(
            self.state == AssociationState::Established,
            NotEstablishedSnafu { state: self.state }
        );
        loop {
            let mut cursor = Cursor::new(&self.read_buffer[..]);
            if let Some(pdu) = read_pdu(&mut cursor, self.local_max_pdu_length, self.strict)
                .context(ReceivePduSnafu)?
            {
                let consumed = cursor.position() as usize;
                self.read_buffer.advance(consumed);
                self.apply_state_effects(&pdu)?;
                return Ok(Some(pdu));
            }

            self.socket
                .set_nonblocking(true)
                .context(SetNonBlockingSnafu)?;
            let mut chunk = [0_u8; 8192];
            let outcome = self.socket.read(&mut chunk);
            self.socket
                .set_nonblocking(false)
                .context(SetNonBlockingSnafu)?;

            match outcome {
                Ok(0) => {
                    self.state = AssociationState::Aborted;
                    self.close();
                    return ConnectionClosedSnafu.fail();
                }
                Ok(received) => {
                    self.read_buffer.extend_from_slice(&chunk[..received]);
                    // loop around: a whole PDU may be available now
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Ok(None);
                }
                Err(e) => {
                    self.state = AssociationState::Aborted;
                    self.close();
                    return Err(e).context(WireReadSnafu);
                }
            }
        }
    }

    fn apply_state_effects(&mut self, pdu: &Pdu) -> Result<()> {
        match pdu {
            Pdu::AbortRQ { source } => {
                let (source_code, reason_code) = source.codes();
                tracing::debug!(
                    "association aborted by peer (source {}, reason {})",
                    source_code,
                    reason_code
                );
                self.state = AssociationState::Aborted;
                self.close();
            }
            Pdu::ReleaseRQ => {
                if self.state == AssociationState::Established {
                    // normal shutdown initiated by the peer
                    tracing::debug!("peer requested association release");
                    self.send_pdu(&Pdu::ReleaseRP)?;
                    self.state = AssociationState::Released;
                    self.close();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Gracefully release the association.
    ///
    /// Sends an A-RELEASE-RQ, waits for the peer's A-RELEASE-RP and
    /// shuts down the connection. P-DATA still in flight from the peer
    /// is discarded while waiting.
    pub fn release(&mut self) -> Result<()> {
        ensure!(
            self.state == AssociationState::Established,
            NotEstablishedSnafu { state: self.state }
        );
        self.send_pdu(&Pdu::ReleaseRQ)?;
        self.state = AssociationState::AwaitingReleaseResponse;

        loop {
            let pdu = self.receive()?;
            match pdu {
                Pdu::ReleaseRP => {
                    self.state = AssociationState::Released;
                    self.close();
                    return Ok(());
                }
                Pdu::PData { .. } => {
                    // late data from the peer, discard and keep waiting
                    continue;
                }
                Pdu::AbortRQ { source } => {
                    let (source_code, reason_code) = source.codes();
                    return AbortedSnafu {
                        source_code,
                        reason_code,
                    }
                    .fail();
                }
                pdu @ Pdu::Unknown { .. } => {
                    self.abort(AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::UnrecognizedPdu,
                    ))?;
                    return UnknownPduSnafu { pdu: Box::new(pdu) }.fail();
                }
                pdu => {
                    self.abort(AbortRQSource::ServiceProvider(
                        AbortRQServiceProviderReason::UnexpectedPdu,
                    ))?;
                    return UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail();
                }
            }
        }
    }

    /// Abort the association with the given source,
    /// terminating the connection.
    ///
    /// Aborting an association which already ended is a no-op.
    pub fn abort(&mut self, source: AbortRQSource) -> Result<()> {
        if matches!(
            self.state,
            AssociationState::Released | AssociationState::Aborted
        ) {
            return Ok(());
        }
        // the peer may already be gone, so a failed send is not an error
        let _ = self.send_pdu(&Pdu::AbortRQ { source });
        self.state = AssociationState::Aborted;
        self.close();
        Ok(())
    }

    /// Prepare a P-Data writer for sending one DIMSE command or data
    /// set as one or more P-DATA PDUs.
    ///
    /// The returned writer automatically splits the incoming bytes into
    /// PDV fragments honoring the peer's maximum PDU length, and flags
    /// the last fragment when finished.
    pub fn send_pdata(
        &mut self,
        presentation_context_id: u8,
        value_type: PDataValueType,
    ) -> PDataWriter<&mut TcpStream> {
        PDataWriter::new(
            &mut self.socket,
            presentation_context_id,
            value_type,
            self.peer_max_pdu_length,
        )
    }

    /// Shut down the socket, exactly once.
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.socket.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// An association dropped while still live is aborted,
/// so that the socket is released on every exit path.
impl Drop for Association {
    fn drop(&mut self) {
        if !matches!(
            self.state,
            AssociationState::Released | AssociationState::Aborted
        ) {
            tracing::warn!("dropping a live association, sending abort");
            let _ = self.send_pdu(&Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            });
            self.state = AssociationState::Aborted;
        }
        self.close();
    }
}
