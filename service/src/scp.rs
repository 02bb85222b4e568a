//! Service class provider operations and command dispatching.

use std::collections::HashMap;

use dimse_core::{tags, DataSet, Value, VR};
use dimse_encoding::{read_data_set, TransferSyntax};
use dimse_ul::pdu::{PDataValueType, Pdu};
use dimse_ul::Association;
use snafu::ensure;
use tracing::{debug, warn};

use crate::commands::{CCancelRq, CEchoRq, CEchoRsp, CFindRq, CFindRsp, CStoreRq, CStoreRsp};
use crate::error::*;
use crate::exchange::{receive_message, send_message};
use crate::message::{CommandField, Message};
use crate::status::Status;

/// A handler for one kind of incoming DIMSE command.
pub trait Provider {
    /// Handle one received message,
    /// sending any responses on the same association.
    fn handle(&mut self, association: &mut Association, message: Message) -> Result<()>;
}

/// A dispatcher routing incoming DIMSE commands
/// to their registered providers.
///
/// Commands with no registered provider are answered with a refused
/// response carrying the unrecognized operation status (0x0211).
#[derive(Default)]
pub struct Dispatcher {
    providers: HashMap<u16, Box<dyn Provider>>,
}

impl Dispatcher {
    /// Create a dispatcher with no providers.
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Register the provider for the given command field,
    /// replacing any previous one.
    pub fn set_provider(&mut self, field: CommandField, provider: Box<dyn Provider>) {
        self.providers.insert(field.code(), provider);
    }

    /// Check whether a provider is registered for the command field.
    pub fn has_provider(&self, field: CommandField) -> bool {
        self.providers.contains_key(&field.code())
    }

    /// Receive one message from the association
    /// and route it to the matching provider.
    pub fn dispatch(&mut self, association: &mut Association) -> Result<()> {
        let message = receive_message(association)?;
        let field = message
            .command
            .uint16(tags::COMMAND_FIELD)
            .map_err(|e| Error::InvalidCommand { source: e })?;

        match self.providers.get_mut(&field) {
            Some(provider) => provider.handle(association, message),
            None => {
                warn!("no provider for command field {:#06x}", field);
                refuse_unrecognized(association, &message, field)
            }
        }
    }
}

/// Answer an unsupported command with a refused response.
fn refuse_unrecognized(
    association: &mut Association,
    message: &Message,
    field: u16,
) -> Result<()> {
    let abstract_syntax = message
        .command
        .string(tags::AFFECTED_SOP_CLASS_UID)
        .map_err(|e| Error::InvalidCommand { source: e })?
        .to_string();
    let message_id = message
        .command
        .uint16(tags::MESSAGE_ID)
        .unwrap_or_default();

    let mut command = command_set_for_refusal(field);
    command
        .put(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            Value::from(message_id),
        )
        .expect("US admits integer values");
    command
        .put(
            tags::STATUS,
            VR::US,
            Value::from(Status::UNRECOGNIZED_OPERATION.code()),
        )
        .expect("US admits integer values");

    send_message(association, &Message::new(command, None), &abstract_syntax)
}

fn command_set_for_refusal(request_field: u16) -> DataSet {
    // answer with the response counterpart when one exists
    let response_field = CommandField::from_code(request_field)
        .map(CommandField::response)
        .map(CommandField::code)
        .unwrap_or(request_field | 0x8000);
    let mut command = DataSet::new();
    command
        .put(tags::COMMAND_FIELD, VR::US, Value::from(response_field))
        .expect("US admits integer values");
    command
}

/// A provider for the verification service (C-ECHO as SCP).
pub struct EchoScp<F>
where
    F: FnMut(&CEchoRq) -> Status,
{
    callback: F,
}

impl<F> EchoScp<F>
where
    F: FnMut(&CEchoRq) -> Status,
{
    /// Create a verification provider
    /// which answers with the callback's status.
    pub fn new(callback: F) -> Self {
        EchoScp { callback }
    }
}

impl<F> Provider for EchoScp<F>
where
    F: FnMut(&CEchoRq) -> Status,
{
    fn handle(&mut self, association: &mut Association, message: Message) -> Result<()> {
        let request = CEchoRq::from_message(&message)?;
        let status = (self.callback)(&request);
        let abstract_syntax = request.affected_sop_class_uid.clone();
        let response = CEchoRsp::new(&request, status);
        send_message(association, &response.into_message(), &abstract_syntax)
    }
}

/// A provider for the storage service (C-STORE as SCP).
pub struct StoreScp<F>
where
    F: FnMut(&CStoreRq) -> Status,
{
    callback: F,
}

impl<F> StoreScp<F>
where
    F: FnMut(&CStoreRq) -> Status,
{
    /// Create a storage provider
    /// which answers with the callback's status.
    pub fn new(callback: F) -> Self {
        StoreScp { callback }
    }
}

impl<F> Provider for StoreScp<F>
where
    F: FnMut(&CStoreRq) -> Status,
{
    fn handle(&mut self, association: &mut Association, message: Message) -> Result<()> {
        let request = CStoreRq::from_message(message)?;
        let status = (self.callback)(&request);
        let abstract_syntax = request.affected_sop_class_uid.clone();
        let response = CStoreRsp::new(&request, status);
        send_message(association, &response.into_message(), &abstract_syntax)
    }
}

/// The externally observable states of a find response generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// No request has been handed to the generator.
    NotInitialized,
    /// There is a match to send, and possibly more after it.
    Pending,
    /// All matches were sent; the final response remains.
    Final,
    /// The exchange is over.
    Done,
}

/// The generator of C-FIND responses driven by [`FindScp`].
///
/// The generator is an explicit state machine
/// (`NotInitialized → Pending → Final → Done`),
/// so that the provider can look for a cancel request between sends.
pub trait ResponseGenerator {
    /// Take in the request and move to `Pending`,
    /// or directly to `Final` when there are no matches.
    ///
    /// Fails if the generator was already initialized.
    fn initialize(&mut self, request: &CFindRq) -> Result<()>;

    /// Whether the exchange is over.
    fn done(&self) -> bool;

    /// The response to send now: a Pending status with an identifier
    /// while in `Pending`, the Success-only response in `Final`.
    ///
    /// Fails in `NotInitialized` and `Done`.
    fn get(&self) -> Result<(Status, Option<DataSet>)>;

    /// Advance: `Pending` moves to `Pending` or `Final`,
    /// `Final` moves to `Done`.
    ///
    /// Fails in `NotInitialized` and `Done`.
    fn next(&mut self) -> Result<()>;

    /// Give up on the remaining matches and move to `Done`.
    fn cancel(&mut self);
}

/// A response generator over an in-memory list of match identifiers.
#[derive(Debug, Clone)]
pub struct VecResponseGenerator {
    identifiers: Vec<DataSet>,
    position: usize,
    state: GeneratorState,
}

impl VecResponseGenerator {
    /// Create a generator which will yield the given identifiers.
    pub fn new(identifiers: Vec<DataSet>) -> Self {
        VecResponseGenerator {
            identifiers,
            position: 0,
            state: GeneratorState::NotInitialized,
        }
    }

    /// The current state of the generator.
    pub fn state(&self) -> GeneratorState {
        self.state
    }
}

impl ResponseGenerator for VecResponseGenerator {
    fn initialize(&mut self, _request: &CFindRq) -> Result<()> {
        ensure!(
            self.state == GeneratorState::NotInitialized,
            InvalidGeneratorStateSnafu { state: self.state }
        );
        self.state = if self.identifiers.is_empty() {
            GeneratorState::Final
        } else {
            GeneratorState::Pending
        };
        Ok(())
    }

    fn done(&self) -> bool {
        self.state == GeneratorState::Done
    }

    fn get(&self) -> Result<(Status, Option<DataSet>)> {
        match self.state {
            GeneratorState::Pending => Ok((
                Status::PENDING,
                Some(self.identifiers[self.position].clone()),
            )),
            GeneratorState::Final => Ok((Status::SUCCESS, None)),
            state => InvalidGeneratorStateSnafu { state }.fail(),
        }
    }

    fn next(&mut self) -> Result<()> {
        match self.state {
            GeneratorState::Pending => {
                self.position += 1;
                if self.position == self.identifiers.len() {
                    self.state = GeneratorState::Final;
                }
                Ok(())
            }
            GeneratorState::Final => {
                self.state = GeneratorState::Done;
                Ok(())
            }
            state => InvalidGeneratorStateSnafu { state }.fail(),
        }
    }

    fn cancel(&mut self) {
        self.state = GeneratorState::Done;
    }
}

/// A provider for the query service (C-FIND as SCP).
///
/// Responses are paced one at a time through a [`ResponseGenerator`],
/// polling the inbound channel for a C-CANCEL-RQ between sends:
/// on a matching cancel, a response with status 0xFE00 is sent
/// and the generator is moved to `Done`.
pub struct FindScp<G>
where
    G: ResponseGenerator,
{
    generator: G,
    /// command fragments of an inbound cancel request which has not
    /// been fully received yet, kept across polls
    cancel_buffer: Vec<u8>,
}

impl<G> FindScp<G>
where
    G: ResponseGenerator,
{
    /// Create a query provider over the given generator.
    pub fn new(generator: G) -> Self {
        FindScp {
            generator,
            cancel_buffer: Vec::new(),
        }
    }

    /// Check the inbound channel for a cancel request
    /// matching the original message id.
    ///
    /// Cancel command fragments are reassembled across P-DATA PDU
    /// boundaries; a partially received command stays buffered until a
    /// later poll completes it. The only message a peer may legitimately
    /// send while its find is being answered is a C-CANCEL-RQ, so any
    /// other inbound content is a protocol violation and aborts the
    /// association.
    fn poll_cancel(&mut self, association: &mut Association, message_id: u16) -> Result<bool> {
        use dimse_ul::association::Error as UlError;
        loop {
            let pdu = match association.try_receive() {
                Ok(Some(pdu)) => pdu,
                Ok(None) => return Ok(false),
                Err(e @ UlError::Timeout { .. }) => return Err(Error::Timeout { source: e }),
                Err(e) => return Err(Error::Ul { source: e }),
            };
            match pdu {
                Pdu::PData { data } => {
                    for pdv in data {
                        if pdv.value_type != PDataValueType::Command {
                            return Err(crate::exchange::protocol_abort(
                                association,
                                UnexpectedFragmentSnafu { kind: "data" }.build(),
                            ));
                        }
                        self.cancel_buffer.extend_from_slice(&pdv.data);
                        if !pdv.is_last {
                            continue;
                        }
                        let command_bytes = std::mem::take(&mut self.cancel_buffer);
                        let command = read_data_set(
                            &command_bytes,
                            &TransferSyntax::ImplicitVrLittleEndian,
                        )
                        .map_err(|e| {
                            crate::exchange::protocol_abort(
                                association,
                                Error::Decode {
                                    subject: "command set",
                                    source: e,
                                },
                            )
                        })?;
                        let message = Message {
                            command,
                            data: None,
                        };
                        match CCancelRq::from_message(&message) {
                            Ok(cancel) if cancel.message_id_being_responded_to == message_id => {
                                return Ok(true);
                            }
                            Ok(cancel) => {
                                debug!(
                                    "ignoring cancel for unknown message id {}",
                                    cancel.message_id_being_responded_to
                                );
                            }
                            Err(e) => {
                                return Err(crate::exchange::protocol_abort(association, e));
                            }
                        }
                    }
                    // a whole PDU was consumed without a matching cancel;
                    // more may already be buffered
                }
                Pdu::ReleaseRQ => return AssociationReleasedSnafu.fail(),
                Pdu::AbortRQ { source } => {
                    let (source, reason) = source.codes();
                    return AssociationAbortedSnafu { source, reason }.fail();
                }
                pdu => {
                    return Err(crate::exchange::protocol_abort(
                        association,
                        UnexpectedPduSnafu {
                            description: pdu.short_description(),
                        }
                        .build(),
                    ));
                }
            }
        }
    }
}

impl<G> Provider for FindScp<G>
where
    G: ResponseGenerator,
{
    fn handle(&mut self, association: &mut Association, message: Message) -> Result<()> {
        let request = CFindRq::from_message(message)?;
        let abstract_syntax = request.affected_sop_class_uid.clone();

        self.generator.initialize(&request)?;

        while !self.generator.done() {
            if self.poll_cancel(association, request.message_id)? {
                let response = CFindRsp {
                    message_id_being_responded_to: request.message_id,
                    affected_sop_class_uid: Some(abstract_syntax.clone()),
                    status: Status::CANCEL,
                    identifier: None,
                };
                send_message(association, &response.into_message(), &abstract_syntax)?;
                self.generator.cancel();
                break;
            }

            let (status, identifier) = self.generator.get()?;
            let response = CFindRsp {
                message_id_being_responded_to: request.message_id,
                affected_sop_class_uid: Some(abstract_syntax.clone()),
                status,
                identifier,
            };
            send_message(association, &response.into_message(), &abstract_syntax)?;
            self.generator.next()?;
        }

        Ok(())
    }
}
