//! PDU reading from a byte stream.

use std::io::{Cursor, ErrorKind, Read};

use byteordered::byteorder::{BigEndian, ReadBytesExt};
use dimse_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

use crate::pdu::*;

/// An error reading a PDU from a byte stream.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum ReadError {
    #[snafu(display("invalid max PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read PDU field `{}`: {}", field, source))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("could not read {} reserved bytes: {}", bytes, source))]
    ReadReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "incoming PDU was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU contained an invalid item {:?}", item))]
    InvalidPduVariable {
        item: PduVariableItem,
        backtrace: Backtrace,
    },

    #[snafu(display("multiple transfer syntaxes were accepted"))]
    MultipleTransferSyntaxesAccepted { backtrace: Backtrace },

    #[snafu(display("invalid reject source or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },

    #[snafu(display("invalid abort source or reason"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },

    #[snafu(display("invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },

    #[snafu(display("invalid transfer syntax sub-item"))]
    InvalidTransferSyntaxSubItem { backtrace: Backtrace },

    #[snafu(display("unknown presentation context sub-item"))]
    UnknownPresentationContextSubItem { backtrace: Backtrace },

    #[snafu(display("invalid user identity type {}", value))]
    InvalidUserIdentityType { value: u8, backtrace: Backtrace },

    #[snafu(display("could not decode text field `{}`: {}", field, source))]
    DecodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: dimse_encoding::error::TextEncodingError,
    },

    #[snafu(display("missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },

    #[snafu(display("missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },

    #[snafu(display("missing transfer syntax"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

pub type Result<T> = std::result::Result<T, ReadError>;

/// Read a PDU from a readable source holding buffered bytes.
///
/// Returns `Ok(None)` when the source does not yet hold a whole PDU,
/// in which case the caller should obtain more bytes and retry
/// (resetting the read position first).
///
/// When `strict` is set, incoming PDUs larger than `max_pdu_length` are
/// rejected; otherwise the check is relaxed up to the absolute maximum.
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Option<Pdu>>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // 1 - PDU-type, 2 - reserved, 3-6 - PDU-length
    let mut head = [0_u8; PDU_HEADER_SIZE as usize];
    if let Err(e) = reader.read_exact(&mut head) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }

    let pdu_type = head[0];
    let pdu_length = u32::from_be_bytes([head[2], head[3], head[4], head[5]]);

    // only P-Data is subject to the negotiated maximum; other PDUs are
    // bounded by the absolute maximum to keep allocations in check
    let effective_max = if strict && pdu_type == 0x04 {
        max_pdu_length
    } else {
        max_pdu_length.max(MAXIMUM_PDU_SIZE)
    };
    ensure!(
        pdu_length <= effective_max,
        PduTooLargeSnafu {
            pdu_length,
            max_pdu_length: effective_max
        }
    );

    let mut bytes = vec![0; pdu_length as usize];
    if let Err(e) = reader.read_exact(&mut bytes) {
        if e.kind() == ErrorKind::UnexpectedEof {
            // the full PDU payload has not arrived yet
            return Ok(None);
        }
        return Err(e).context(ReadPduFieldSnafu { field: "payload" });
    }
    let mut cursor = Cursor::new(bytes);
    let codec = DefaultCharacterSetCodec;

    let pdu = match pdu_type {
        0x01 => {
            // A-ASSOCIATE-RQ PDU Structure

            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            // 7-8 - Protocol-version
            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;

            // 9-10 - Reserved
            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            // 11-26 - Called-AE-title, 16 characters with non-significant
            // leading and trailing spaces
            let mut ae_bytes = [0; 16];
            cursor.read_exact(&mut ae_bytes).context(ReadPduFieldSnafu {
                field: "Called-AE-title",
            })?;
            let called_ae_title = codec
                .decode(&ae_bytes)
                .context(DecodeTextSnafu {
                    field: "Called-AE-title",
                })?
                .trim()
                .to_string();

            // 27-42 - Calling-AE-title, 16 characters with non-significant
            // leading and trailing spaces
            let mut ae_bytes = [0; 16];
            cursor.read_exact(&mut ae_bytes).context(ReadPduFieldSnafu {
                field: "Calling-AE-title",
            })?;
            let calling_ae_title = codec
                .decode(&ae_bytes)
                .context(DecodeTextSnafu {
                    field: "Calling-AE-title",
                })?
                .trim()
                .to_string();

            // 43-74 - Reserved
            let mut reserved = [0; 32];
            cursor
                .read_exact(&mut reserved)
                .context(ReadReservedSnafu { bytes: 32_u32 })?;

            // 75-xxx - Variable items: one application context item,
            // one or more presentation context items and one user
            // information item
            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextProposed(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    item => {
                        return InvalidPduVariableSnafu { item }.fail();
                    }
                }
            }

            Pdu::AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            }
        }
        0x02 => {
            // A-ASSOCIATE-AC PDU Structure

            let mut application_context_name: Option<String> = None;
            let mut presentation_contexts = vec![];
            let mut user_variables = vec![];

            // 7-8 - Protocol-version
            let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                field: "Protocol-version",
            })?;

            // 9-10 - Reserved
            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            // 11-74 - Reserved: echoes of the AE title fields of the RQ,
            // not to be tested
            let mut reserved = [0; 64];
            cursor
                .read_exact(&mut reserved)
                .context(ReadReservedSnafu { bytes: 64_u32 })?;

            // 75-xxx - Variable items
            while cursor.position() < cursor.get_ref().len() as u64 {
                match read_pdu_variable(&mut cursor, &codec)? {
                    PduVariableItem::ApplicationContext(val) => {
                        application_context_name = Some(val);
                    }
                    PduVariableItem::PresentationContextResult(val) => {
                        presentation_contexts.push(val);
                    }
                    PduVariableItem::UserVariables(val) => {
                        user_variables = val;
                    }
                    item => {
                        return InvalidPduVariableSnafu { item }.fail();
                    }
                }
            }

            Pdu::AssociationAC {
                protocol_version,
                application_context_name: application_context_name
                    .context(MissingApplicationContextNameSnafu)?,
                presentation_contexts,
                user_variables,
            }
        }
        0x03 => {
            // A-ASSOCIATE-RJ PDU Structure

            // 7 - Reserved
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 8 - Result: 1 rejected-permanent, 2 rejected-transient
            let result = AssociationRJResult::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Result" })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            // 9 - Source, 10 - Reason/Diag.
            let source = AssociationRJSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag.",
                })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            Pdu::AssociationRJ { result, source }
        }
        0x04 => {
            // P-DATA-TF PDU Structure

            let mut values = vec![];
            while cursor.position() < cursor.get_ref().len() as u64 {
                // 1-4 - Item-length: from the first byte of the following
                // field to the last byte of the presentation data value
                let item_length = cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-Length",
                })?;

                // 5 - Presentation-context-ID: odd integers between 1 and 255
                let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Presentation-context-ID",
                })?;

                // 6 - Message control header: bit 0 set means command
                // fragment, bit 1 set means last fragment
                let header = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Message Control Header",
                })?;
                let value_type = if header & 0x01 > 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                };
                let is_last = header & 0x02 > 0;

                // 7-xxx - Presentation data value fragment
                let data =
                    read_n(&mut cursor, item_length.saturating_sub(2) as usize).context(
                        ReadPduFieldSnafu {
                            field: "Presentation-data-value",
                        },
                    )?;

                values.push(PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data,
                });
            }

            Pdu::PData { data: values }
        }
        0x05 => {
            // A-RELEASE-RQ PDU Structure

            // 7-10 - Reserved
            cursor
                .read_u32::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 4_u32 })?;

            Pdu::ReleaseRQ
        }
        0x06 => {
            // A-RELEASE-RP PDU Structure

            // 7-10 - Reserved
            cursor
                .read_u32::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 4_u32 })?;

            Pdu::ReleaseRP
        }
        0x07 => {
            // A-ABORT PDU Structure

            // 7 - Reserved, 8 - Reserved
            cursor
                .read_u16::<BigEndian>()
                .context(ReadReservedSnafu { bytes: 2_u32 })?;

            // 9 - Source, 10 - Reason/Diag
            let source = AbortRQSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag",
                })?,
            )
            .context(InvalidAbortSourceOrReasonSnafu)?;

            Pdu::AbortRQ { source }
        }
        _ => Pdu::Unknown {
            pdu_type,
            data: cursor.into_inner(),
        },
    };

    Ok(Some(pdu))
}

fn read_n<R>(reader: &mut R, bytes_to_read: usize) -> std::io::Result<Vec<u8>>
where
    R: Read,
{
    let mut result = vec![0; bytes_to_read];
    reader.read_exact(&mut result)?;
    Ok(result)
}

fn read_pdu_variable<R>(reader: &mut R, codec: &dyn TextCodec) -> Result<PduVariableItem>
where
    R: Read,
{
    // 1 - Item-type
    let item_type = reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved
    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;

    // 3-4 - Item-length
    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;

    let bytes = read_n(reader, item_length as usize).context(ReadPduFieldSnafu {
        field: "item payload",
    })?;
    let mut cursor = Cursor::new(bytes);

    match item_type {
        0x10 => {
            // Application Context Item Structure
            let val = codec.decode(cursor.get_ref()).context(DecodeTextSnafu {
                field: "Application-context-name",
            })?;
            Ok(PduVariableItem::ApplicationContext(val.trim().to_string()))
        }
        0x20 => {
            // Presentation Context Item Structure (proposed)

            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];

            // 5 - Presentation-context-ID
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

            // 6-8 - Reserved
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 9-xxx - one abstract syntax sub-item followed by one or more
            // transfer syntax sub-items
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x30 => {
                        // Abstract Syntax Sub-Item Structure
                        abstract_syntax = Some(
                            codec
                                .decode(&read_n(&mut cursor, item_length as usize).context(
                                    ReadPduFieldSnafu {
                                        field: "Abstract-syntax-name",
                                    },
                                )?)
                                .context(DecodeTextSnafu {
                                    field: "Abstract-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    0x40 => {
                        // Transfer Syntax Sub-Item Structure
                        transfer_syntaxes.push(
                            codec
                                .decode(&read_n(&mut cursor, item_length as usize).context(
                                    ReadPduFieldSnafu {
                                        field: "Transfer-syntax-name",
                                    },
                                )?)
                                .context(DecodeTextSnafu {
                                    field: "Transfer-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    _ => {
                        return UnknownPresentationContextSubItemSnafu.fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id: presentation_context_id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 => {
            // Presentation Context Item Structure (result)

            let mut transfer_syntax: Option<String> = None;

            // 5 - Presentation-context-ID
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

            // 6 - Reserved
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 7 - Result/Reason
            let reason = PresentationContextResultReason::from(cursor.read_u8().context(
                ReadPduFieldSnafu {
                    field: "Result/Reason",
                },
            )?)
            .context(InvalidPresentationContextResultReasonSnafu)?;

            // 8 - Reserved
            cursor
                .read_u8()
                .context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 9-xxx - exactly one transfer syntax sub-item; not significant
            // when the context was not accepted
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x40 => {
                        ensure!(
                            transfer_syntax.is_none(),
                            MultipleTransferSyntaxesAcceptedSnafu
                        );
                        transfer_syntax = Some(
                            codec
                                .decode(&read_n(&mut cursor, item_length as usize).context(
                                    ReadPduFieldSnafu {
                                        field: "Transfer-syntax-name",
                                    },
                                )?)
                                .context(DecodeTextSnafu {
                                    field: "Transfer-syntax-name",
                                })?
                                .trim()
                                .to_string(),
                        );
                    }
                    _ => {
                        return InvalidTransferSyntaxSubItemSnafu.fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id: presentation_context_id,
                    reason,
                    transfer_syntax: transfer_syntax.context(MissingTransferSyntaxSnafu)?,
                },
            ))
        }
        0x50 => {
            // User Information Item Structure

            let mut user_variables = vec![];

            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor
                    .read_u8()
                    .context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x51 => {
                        // Maximum Length Sub-Item Structure
                        user_variables.push(UserVariableItem::MaxLength(
                            cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Maximum-length-received",
                            })?,
                        ));
                    }
                    0x52 => {
                        // Implementation Class UID Sub-Item Structure
                        let uid = codec
                            .decode(&read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Implementation-class-uid",
                                },
                            )?)
                            .context(DecodeTextSnafu {
                                field: "Implementation-class-uid",
                            })?
                            .trim()
                            .to_string();
                        user_variables.push(UserVariableItem::ImplementationClassUid(uid));
                    }
                    0x54 => {
                        // SCP/SCU Role Selection Sub-Item Structure
                        let uid_length =
                            cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "UID-length",
                            })?;
                        let sop_class_uid = codec
                            .decode(&read_n(&mut cursor, uid_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "SOP-class-uid",
                                },
                            )?)
                            .context(DecodeTextSnafu {
                                field: "SOP-class-uid",
                            })?
                            .trim()
                            .to_string();
                        let scu_role = cursor
                            .read_u8()
                            .context(ReadPduFieldSnafu { field: "SCU-role" })?;
                        let scp_role = cursor
                            .read_u8()
                            .context(ReadPduFieldSnafu { field: "SCP-role" })?;
                        user_variables.push(UserVariableItem::RoleSelection(RoleSelection {
                            sop_class_uid,
                            scu_role: scu_role != 0,
                            scp_role: scp_role != 0,
                        }));
                    }
                    0x55 => {
                        // Implementation Version Name Structure
                        let name = codec
                            .decode(&read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Implementation-version-name",
                                },
                            )?)
                            .context(DecodeTextSnafu {
                                field: "Implementation-version-name",
                            })?
                            .trim()
                            .to_string();
                        user_variables.push(UserVariableItem::ImplementationVersionName(name));
                    }
                    0x56 => {
                        // User Identity Negotiation Sub-Item Structure (RQ)
                        let identity_type = cursor.read_u8().context(ReadPduFieldSnafu {
                            field: "User-identity-type",
                        })?;
                        let identity_type = UserIdentityType::from(identity_type)
                            .context(InvalidUserIdentityTypeSnafu {
                                value: identity_type,
                            })?;
                        let positive_response_requested =
                            cursor.read_u8().context(ReadPduFieldSnafu {
                                field: "Positive-response-requested",
                            })? != 0;
                        let primary_length =
                            cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Primary-field-length",
                            })?;
                        let primary_field = read_n(&mut cursor, primary_length as usize)
                            .context(ReadPduFieldSnafu {
                                field: "Primary-field",
                            })?;
                        let secondary_length =
                            cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Secondary-field-length",
                            })?;
                        let secondary_field = read_n(&mut cursor, secondary_length as usize)
                            .context(ReadPduFieldSnafu {
                                field: "Secondary-field",
                            })?;
                        user_variables.push(UserVariableItem::UserIdentity(UserIdentity {
                            identity_type,
                            positive_response_requested,
                            primary_field,
                            secondary_field,
                        }));
                    }
                    _ => {
                        user_variables.push(UserVariableItem::Unknown(
                            item_type,
                            read_n(&mut cursor, item_length as usize)
                                .context(ReadPduFieldSnafu { field: "Unknown" })?,
                        ));
                    }
                }
            }

            Ok(PduVariableItem::UserVariables(user_variables))
        }
        _ => Ok(PduVariableItem::Unknown(item_type)),
    }
}
