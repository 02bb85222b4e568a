//! DIMSE message exchange over an established association.
//!
//! Messages are serialized onto P-DATA PDUs: the command set first
//! (always in Implicit VR Little Endian), then the data set under the
//! transfer syntax negotiated for the presentation context, each
//! fragmented to honor the peer's maximum PDU length. Reception
//! reassembles the fragments, enforcing the framing rules of the
//! protocol: a single context id per message, command fragments
//! strictly before data fragments, no interleaving.

use std::io::Write;

use dimse_encoding::transfer_syntax::trim_uid;
use dimse_encoding::{encode_data_set, read_data_set, TransferSyntax};
use dimse_ul::association::{Association, AssociationState, ServiceRole};
use dimse_ul::pdu::{AbortRQSource, PDataValueType, Pdu};
use snafu::{OptionExt, ResultExt};

use crate::error::*;
use crate::message::Message;

/// Send a DIMSE message over the association,
/// on the accepted presentation context
/// negotiated for the given abstract syntax.
pub fn send_message(
    association: &mut Association,
    message: &Message,
    abstract_syntax_uid: &str,
) -> Result<()> {
    if association.state() != AssociationState::Established {
        return NotAssociatedSnafu.fail();
    }

    let abstract_syntax = trim_uid(abstract_syntax_uid);
    let pc = association
        .presentation_contexts()
        .iter()
        .find(|pc| pc.is_accepted() && trim_uid(&pc.abstract_syntax) == abstract_syntax)
        .context(ContextNotFoundSnafu {
            abstract_syntax: abstract_syntax.to_string(),
        })?;

    // role selection: requesters need the SCU role,
    // acceptors need the SCP role
    let role_supported = match association.role() {
        ServiceRole::User => pc.scu_role,
        ServiceRole::Provider => pc.scp_role,
    };
    if !role_supported {
        return RoleUnsupportedSnafu {
            abstract_syntax: abstract_syntax.to_string(),
        }
        .fail();
    }

    let pc_id = pc.id;
    let ts_uid = pc.transfer_syntax.clone();

    // command sets always travel in the default transfer syntax
    let command_bytes = encode_data_set(&message.command, &TransferSyntax::ImplicitVrLittleEndian)
        .context(EncodeSnafu {
            subject: "command set",
        })?;

    let data_bytes = message
        .data
        .as_ref()
        .map(|data| {
            let ts = TransferSyntax::from_uid(&ts_uid).context(UnsupportedTransferSyntaxSnafu {
                uid: ts_uid.clone(),
            })?;
            encode_data_set(data, &ts).context(EncodeSnafu {
                subject: "data set",
            })
        })
        .transpose()?;

    {
        let mut writer = association.send_pdata(pc_id, PDataValueType::Command);
        writer
            .write_all(&command_bytes)
            .and_then(|_| writer.finish())
            .context(WireSendSnafu)?;
    }

    if let Some(data_bytes) = data_bytes {
        let mut writer = association.send_pdata(pc_id, PDataValueType::Data);
        writer
            .write_all(&data_bytes)
            .and_then(|_| writer.finish())
            .context(WireSendSnafu)?;
    }

    Ok(())
}

/// Receive one DIMSE message from the association,
/// reassembling its command and data fragments.
///
/// Fails with [`Error::AssociationReleased`] if the peer requests a
/// normal shutdown while a message is expected, and with
/// [`Error::AssociationAborted`] on an abort; protocol violations
/// abort the association.
pub fn receive_message(association: &mut Association) -> Result<Message> {
    if association.state() != AssociationState::Established {
        return NotAssociatedSnafu.fail();
    }

    let mut command_bytes: Vec<u8> = Vec::new();
    let mut data_bytes: Vec<u8> = Vec::new();
    let mut context_id: Option<u8> = None;
    let mut command: Option<dimse_core::DataSet> = None;
    let mut expect_data = false;

    loop {
        let pdu = receive_pdu(association)?;
        let values = match pdu {
            Pdu::PData { data } => data,
            Pdu::ReleaseRQ => {
                // the state machine has already answered with A-RELEASE-RP
                return AssociationReleasedSnafu.fail();
            }
            Pdu::AbortRQ { source } => {
                let (source, reason) = source.codes();
                return AssociationAbortedSnafu { source, reason }.fail();
            }
            pdu => {
                return Err(protocol_abort(
                    association,
                    UnexpectedPduSnafu {
                        description: pdu.short_description(),
                    }
                    .build(),
                ));
            }
        };

        for pdv in values {
            match context_id {
                None => context_id = Some(pdv.presentation_context_id),
                Some(id) if id == pdv.presentation_context_id => {}
                Some(id) => {
                    return Err(protocol_abort(
                        association,
                        ContextIdMismatchSnafu {
                            expected: id,
                            got: pdv.presentation_context_id,
                        }
                        .build(),
                    ));
                }
            }

            match (command.is_some(), pdv.value_type) {
                (false, PDataValueType::Command) => {
                    command_bytes.extend_from_slice(&pdv.data);
                    if pdv.is_last {
                        let command_set = read_data_set(
                            &command_bytes,
                            &TransferSyntax::ImplicitVrLittleEndian,
                        )
                        .map_err(|e| {
                            protocol_abort(
                                association,
                                Error::Decode {
                                    subject: "command set",
                                    source: e,
                                },
                            )
                        })?;
                        let message = Message {
                            command: command_set,
                            data: None,
                        };
                        expect_data = match message.has_data_set() {
                            Ok(expect_data) => expect_data,
                            Err(e) => return Err(protocol_abort(association, e)),
                        };
                        command = Some(message.command);
                    }
                }
                (false, PDataValueType::Data) => {
                    return Err(protocol_abort(
                        association,
                        UnexpectedFragmentSnafu { kind: "data" }.build(),
                    ));
                }
                (true, PDataValueType::Command) => {
                    // a new command may not start before the data set ends
                    return Err(protocol_abort(
                        association,
                        UnexpectedFragmentSnafu { kind: "command" }.build(),
                    ));
                }
                (true, PDataValueType::Data) => {
                    if !expect_data {
                        return Err(protocol_abort(
                            association,
                            UnexpectedFragmentSnafu { kind: "data" }.build(),
                        ));
                    }
                    data_bytes.extend_from_slice(&pdv.data);
                    if pdv.is_last {
                        let id = context_id.expect("a fragment was received");
                        let ts_uid = association
                            .presentation_contexts()
                            .iter()
                            .find(|pc| pc.is_accepted() && pc.id == id)
                            .map(|pc| pc.transfer_syntax.clone())
                            .context(UnknownContextIdSnafu { id })?;
                        let ts = TransferSyntax::from_uid(&ts_uid).context(
                            UnsupportedTransferSyntaxSnafu { uid: ts_uid },
                        )?;
                        let data = read_data_set(&data_bytes, &ts).map_err(|e| {
                            protocol_abort(
                                association,
                                Error::Decode {
                                    subject: "data set",
                                    source: e,
                                },
                            )
                        })?;
                        return Ok(Message {
                            command: command.take().expect("command precedes data"),
                            data: Some(data),
                        });
                    }
                }
            }
        }

        if let Some(command) = command.take() {
            if !expect_data {
                return Ok(Message {
                    command,
                    data: None,
                });
            }
            // keep collecting data fragments
            return receive_data_only(association, command, context_id, data_bytes);
        }
    }
}

/// Continue receiving the data fragments of a message
/// whose command set has been fully assembled.
fn receive_data_only(
    association: &mut Association,
    command: dimse_core::DataSet,
    context_id: Option<u8>,
    mut data_bytes: Vec<u8>,
) -> Result<Message> {
    let id = context_id.expect("a command fragment was received");
    loop {
        let pdu = receive_pdu(association)?;
        let values = match pdu {
            Pdu::PData { data } => data,
            Pdu::ReleaseRQ => {
                return AssociationReleasedSnafu.fail();
            }
            Pdu::AbortRQ { source } => {
                let (source, reason) = source.codes();
                return AssociationAbortedSnafu { source, reason }.fail();
            }
            pdu => {
                return Err(protocol_abort(
                    association,
                    UnexpectedPduSnafu {
                        description: pdu.short_description(),
                    }
                    .build(),
                ));
            }
        };

        for pdv in values {
            if pdv.presentation_context_id != id {
                return Err(protocol_abort(
                    association,
                    ContextIdMismatchSnafu {
                        expected: id,
                        got: pdv.presentation_context_id,
                    }
                    .build(),
                ));
            }
            if pdv.value_type != PDataValueType::Data {
                return Err(protocol_abort(
                    association,
                    UnexpectedFragmentSnafu { kind: "command" }.build(),
                ));
            }
            data_bytes.extend_from_slice(&pdv.data);
            if pdv.is_last {
                let ts_uid = association
                    .presentation_contexts()
                    .iter()
                    .find(|pc| pc.is_accepted() && pc.id == id)
                    .map(|pc| pc.transfer_syntax.clone())
                    .context(UnknownContextIdSnafu { id })?;
                let ts = TransferSyntax::from_uid(&ts_uid)
                    .context(UnsupportedTransferSyntaxSnafu { uid: ts_uid })?;
                let data = read_data_set(&data_bytes, &ts).map_err(|e| {
                    protocol_abort(
                        association,
                        Error::Decode {
                            subject: "data set",
                            source: e,
                        },
                    )
                })?;
                return Ok(Message {
                    command,
                    data: Some(data),
                });
            }
        }
    }
}

/// Receive one PDU, mapping upper layer failures
/// onto this layer's error kinds.
pub(crate) fn receive_pdu(association: &mut Association) -> Result<Pdu> {
    use dimse_ul::association::Error as UlError;
    match association.receive() {
        Ok(pdu) => Ok(pdu),
        Err(e @ UlError::Timeout { .. }) => Err(Error::Timeout { source: e }),
        Err(UlError::NotEstablished { .. }) => NotAssociatedSnafu.fail(),
        Err(e) => Err(Error::Ul { source: e }),
    }
}

/// Abort the association after a protocol violation,
/// returning the error which triggered it.
pub(crate) fn protocol_abort(association: &mut Association, error: Error) -> Error {
    let _ = association.abort(AbortRQSource::ServiceUser);
    error
}
