//! PDU writing to a byte stream.

use std::io::Write;

use byteordered::byteorder::{BigEndian, WriteBytesExt};
use dimse_encoding::text::{DefaultCharacterSetCodec, TextCodec};
use snafu::{ResultExt, Snafu};

use crate::pdu::*;

/// An error writing a PDU to a byte stream.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum WriteError {
    #[snafu(display("could not write PDU field `{}`: {}", field, source))]
    WritePduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: snafu::Backtrace,
    },

    #[snafu(display("could not encode text field `{}`: {}", field, source))]
    EncodeText {
        field: &'static str,
        #[snafu(backtrace)]
        source: dimse_encoding::error::TextEncodingError,
    },
}

pub type Result<T> = std::result::Result<T, WriteError>;

fn write_chunk_u32<F>(writer: &mut dyn Write, field: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer
        .write_u32::<BigEndian>(data.len() as u32)
        .and_then(|_| writer.write_all(&data))
        .context(WritePduFieldSnafu { field })?;

    Ok(())
}

fn write_chunk_u16<F>(writer: &mut dyn Write, field: &'static str, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer
        .write_u16::<BigEndian>(data.len() as u16)
        .and_then(|_| writer.write_all(&data))
        .context(WritePduFieldSnafu { field })?;

    Ok(())
}

fn write_ae_title(writer: &mut Vec<u8>, ae_title: &str, field: &'static str) -> Result<()> {
    let codec = DefaultCharacterSetCodec;
    let mut bytes = codec.encode(ae_title).context(EncodeTextSnafu { field })?;
    // 16 characters, space padded, as defined by ISO 646:1990
    bytes.resize(16, b' ');
    writer
        .write_all(&bytes[..16])
        .context(WritePduFieldSnafu { field })
}

/// Write a PDU onto the given writer.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    let codec = DefaultCharacterSetCodec;
    match pdu {
        Pdu::AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            // 1 - PDU-type - 01H, 2 - Reserved
            writer
                .write_u8(0x01)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RQ", |writer| {
                // 7-8 - Protocol-version
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WritePduFieldSnafu {
                        field: "Protocol-version",
                    })?;

                // 9-10 - Reserved
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WritePduFieldSnafu { field: "Reserved" })?;

                // 11-26 - Called-AE-title
                write_ae_title(writer, called_ae_title, "Called-AE-title")?;

                // 27-42 - Calling-AE-title
                write_ae_title(writer, calling_ae_title, "Calling-AE-title")?;

                // 43-74 - Reserved
                writer
                    .write_all(&[0_u8; 32])
                    .context(WritePduFieldSnafu { field: "Reserved" })?;

                write_pdu_variable_application_context_name(
                    writer,
                    application_context_name,
                    &codec,
                )?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_proposed(
                        writer,
                        presentation_context,
                        &codec,
                    )?;
                }

                write_pdu_variable_user_variables(writer, user_variables, &codec)?;

                Ok(())
            })
        }
        Pdu::AssociationAC {
            protocol_version,
            application_context_name,
            presentation_contexts,
            user_variables,
        } => {
            // 1 - PDU-type - 02H, 2 - Reserved
            writer
                .write_u8(0x02)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-AC", |writer| {
                // 7-8 - Protocol-version
                writer
                    .write_u16::<BigEndian>(*protocol_version)
                    .context(WritePduFieldSnafu {
                        field: "Protocol-version",
                    })?;

                // 9-10 - Reserved
                writer
                    .write_u16::<BigEndian>(0x00)
                    .context(WritePduFieldSnafu { field: "Reserved" })?;

                // 11-74 - Reserved: sent as zeros, their value shall not be
                // tested when received
                writer
                    .write_all(&[0_u8; 64])
                    .context(WritePduFieldSnafu { field: "Reserved" })?;

                write_pdu_variable_application_context_name(
                    writer,
                    application_context_name,
                    &codec,
                )?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_result(
                        writer,
                        presentation_context,
                        &codec,
                    )?;
                }

                write_pdu_variable_user_variables(writer, user_variables, &codec)?;

                Ok(())
            })
        }
        Pdu::AssociationRJ { result, source } => {
            // 1 - PDU-type - 03H, 2 - Reserved
            writer
                .write_u8(0x03)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-ASSOCIATE-RJ", |writer| {
                let (source_code, reason_code) = source.codes();
                // 7 - Reserved, 8 - Result, 9 - Source, 10 - Reason/Diag.
                writer
                    .write_all(&[0x00, result.code(), source_code, reason_code])
                    .context(WritePduFieldSnafu {
                        field: "Result/Source/Reason",
                    })?;
                Ok(())
            })
        }
        Pdu::PData { data } => {
            // 1 - PDU-type - 04H, 2 - Reserved
            writer
                .write_u8(0x04)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "P-DATA-TF", |writer| {
                for pdv in data {
                    write_chunk_u32(writer, "Presentation-data-value", |writer| {
                        // 5 - Presentation-context-ID
                        writer
                            .write_u8(pdv.presentation_context_id)
                            .context(WritePduFieldSnafu {
                                field: "Presentation-context-ID",
                            })?;

                        // 6 - Message control header: bit 0 command, bit 1 last
                        let mut header = 0x00;
                        if let PDataValueType::Command = pdv.value_type {
                            header |= 0x01;
                        }
                        if pdv.is_last {
                            header |= 0x02;
                        }
                        writer
                            .write_u8(header)
                            .and_then(|_| writer.write_all(&pdv.data))
                            .context(WritePduFieldSnafu {
                                field: "Presentation-data-value",
                            })?;

                        Ok(())
                    })?;
                }

                Ok(())
            })
        }
        Pdu::ReleaseRQ => {
            // 1 - PDU-type - 05H, 2 - Reserved
            writer
                .write_u8(0x05)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-RELEASE-RQ", |writer| {
                // 7-10 - Reserved
                writer
                    .write_all(&[0_u8; 4])
                    .context(WritePduFieldSnafu { field: "Reserved" })?;
                Ok(())
            })
        }
        Pdu::ReleaseRP => {
            // 1 - PDU-type - 06H, 2 - Reserved
            writer
                .write_u8(0x06)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-RELEASE-RP", |writer| {
                // 7-10 - Reserved
                writer
                    .write_all(&[0_u8; 4])
                    .context(WritePduFieldSnafu { field: "Reserved" })?;
                Ok(())
            })
        }
        Pdu::AbortRQ { source } => {
            // 1 - PDU-type - 07H, 2 - Reserved
            writer
                .write_u8(0x07)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "A-ABORT", |writer| {
                let (source_code, reason_code) = source.codes();
                // 7 - Reserved, 8 - Reserved, 9 - Source, 10 - Reason/Diag
                writer
                    .write_all(&[0x00, 0x00, source_code, reason_code])
                    .context(WritePduFieldSnafu {
                        field: "Source/Reason",
                    })?;
                Ok(())
            })
        }
        Pdu::Unknown { pdu_type, data } => {
            writer
                .write_u8(*pdu_type)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "type" })?;

            write_chunk_u32(writer, "Unknown", |writer| {
                writer
                    .write_all(data)
                    .context(WritePduFieldSnafu { field: "Unknown" })?;
                Ok(())
            })
        }
    }
}

fn write_pdu_variable_application_context_name(
    writer: &mut dyn Write,
    application_context_name: &str,
    codec: &dyn TextCodec,
) -> Result<()> {
    // Application Context Item Structure
    // 1 - Item-type - 10H, 2 - Reserved
    writer
        .write_u8(0x10)
        .and_then(|_| writer.write_u8(0x00))
        .context(WritePduFieldSnafu { field: "Item-type" })?;

    write_chunk_u16(writer, "Application Context Item", |writer| {
        // 5-xxx - Application-context-name
        let bytes = codec
            .encode(application_context_name)
            .context(EncodeTextSnafu {
                field: "Application-context-name",
            })?;
        writer.write_all(&bytes).context(WritePduFieldSnafu {
            field: "Application-context-name",
        })?;
        Ok(())
    })
}

fn write_pdu_variable_presentation_context_proposed(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextProposed,
    codec: &dyn TextCodec,
) -> Result<()> {
    // Presentation Context Item Structure
    // 1 - Item-type - 20H, 2 - Reserved
    writer
        .write_u8(0x20)
        .and_then(|_| writer.write_u8(0x00))
        .context(WritePduFieldSnafu { field: "Item-type" })?;

    write_chunk_u16(writer, "Presentation Context Item", |writer| {
        // 5 - Presentation-context-ID, 6-8 - Reserved
        writer
            .write_all(&[presentation_context.id, 0x00, 0x00, 0x00])
            .context(WritePduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

        // Abstract Syntax Sub-Item Structure
        // 1 - Item-type - 30H, 2 - Reserved
        writer
            .write_u8(0x30)
            .and_then(|_| writer.write_u8(0x00))
            .context(WritePduFieldSnafu { field: "Item-type" })?;

        write_chunk_u16(writer, "Abstract Syntax Sub-Item", |writer| {
            let bytes = codec
                .encode(&presentation_context.abstract_syntax)
                .context(EncodeTextSnafu {
                    field: "Abstract-syntax-name",
                })?;
            writer.write_all(&bytes).context(WritePduFieldSnafu {
                field: "Abstract-syntax-name",
            })?;
            Ok(())
        })?;

        for transfer_syntax in &presentation_context.transfer_syntaxes {
            // Transfer Syntax Sub-Item Structure
            // 1 - Item-type - 40H, 2 - Reserved
            writer
                .write_u8(0x40)
                .and_then(|_| writer.write_u8(0x00))
                .context(WritePduFieldSnafu { field: "Item-type" })?;

            write_chunk_u16(writer, "Transfer Syntax Sub-Item", |writer| {
                let bytes = codec.encode(transfer_syntax).context(EncodeTextSnafu {
                    field: "Transfer-syntax-name",
                })?;
                writer.write_all(&bytes).context(WritePduFieldSnafu {
                    field: "Transfer-syntax-name",
                })?;
                Ok(())
            })?;
        }

        Ok(())
    })
}

fn write_pdu_variable_presentation_context_result(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextResult,
    codec: &dyn TextCodec,
) -> Result<()> {
    // 1 - Item-type - 21H, 2 - Reserved
    writer
        .write_u8(0x21)
        .and_then(|_| writer.write_u8(0x00))
        .context(WritePduFieldSnafu { field: "Item-type" })?;

    write_chunk_u16(writer, "Presentation Context Result Item", |writer| {
        // 5 - Presentation-context-ID, 6 - Reserved,
        // 7 - Result/Reason, 8 - Reserved
        writer
            .write_all(&[
                presentation_context.id,
                0x00,
                presentation_context.reason as u8,
                0x00,
            ])
            .context(WritePduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

        // 9-xxx - exactly one transfer syntax sub-item
        writer
            .write_u8(0x40)
            .and_then(|_| writer.write_u8(0x00))
            .context(WritePduFieldSnafu { field: "Item-type" })?;

        write_chunk_u16(writer, "Transfer Syntax Sub-Item", |writer| {
            let bytes = codec
                .encode(&presentation_context.transfer_syntax)
                .context(EncodeTextSnafu {
                    field: "Transfer-syntax-name",
                })?;
            writer.write_all(&bytes).context(WritePduFieldSnafu {
                field: "Transfer-syntax-name",
            })?;
            Ok(())
        })?;

        Ok(())
    })
}

fn write_pdu_variable_user_variables(
    writer: &mut dyn Write,
    user_variables: &[UserVariableItem],
    codec: &dyn TextCodec,
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    // 1 - Item-type - 50H, 2 - Reserved
    writer
        .write_u8(0x50)
        .and_then(|_| writer.write_u8(0x00))
        .context(WritePduFieldSnafu { field: "Item-type" })?;

    write_chunk_u16(writer, "User Information Item", |writer| {
        for user_variable in user_variables {
            match user_variable {
                UserVariableItem::MaxLength(max_length) => {
                    // 1 - Item-type - 51H, 2 - Reserved
                    writer
                        .write_u8(0x51)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "Maximum Length Sub-Item", |writer| {
                        writer
                            .write_u32::<BigEndian>(*max_length)
                            .context(WritePduFieldSnafu {
                                field: "Maximum-length-received",
                            })?;
                        Ok(())
                    })?;
                }
                UserVariableItem::ImplementationClassUid(uid) => {
                    // 1 - Item-type - 52H, 2 - Reserved
                    writer
                        .write_u8(0x52)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "Implementation Class UID Sub-Item", |writer| {
                        let bytes = codec.encode(uid).context(EncodeTextSnafu {
                            field: "Implementation-class-uid",
                        })?;
                        writer.write_all(&bytes).context(WritePduFieldSnafu {
                            field: "Implementation-class-uid",
                        })?;
                        Ok(())
                    })?;
                }
                UserVariableItem::ImplementationVersionName(name) => {
                    // 1 - Item-type - 55H, 2 - Reserved
                    writer
                        .write_u8(0x55)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "Implementation Version Name Sub-Item", |writer| {
                        let bytes = codec.encode(name).context(EncodeTextSnafu {
                            field: "Implementation-version-name",
                        })?;
                        writer.write_all(&bytes).context(WritePduFieldSnafu {
                            field: "Implementation-version-name",
                        })?;
                        Ok(())
                    })?;
                }
                UserVariableItem::RoleSelection(role_selection) => {
                    // 1 - Item-type - 54H, 2 - Reserved
                    writer
                        .write_u8(0x54)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "Role Selection Sub-Item", |writer| {
                        let bytes =
                            codec
                                .encode(&role_selection.sop_class_uid)
                                .context(EncodeTextSnafu {
                                    field: "SOP-class-uid",
                                })?;
                        writer
                            .write_u16::<BigEndian>(bytes.len() as u16)
                            .and_then(|_| writer.write_all(&bytes))
                            .and_then(|_| writer.write_u8(role_selection.scu_role as u8))
                            .and_then(|_| writer.write_u8(role_selection.scp_role as u8))
                            .context(WritePduFieldSnafu {
                                field: "Role Selection",
                            })?;
                        Ok(())
                    })?;
                }
                UserVariableItem::UserIdentity(identity) => {
                    // 1 - Item-type - 56H, 2 - Reserved
                    writer
                        .write_u8(0x56)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "User Identity Sub-Item", |writer| {
                        writer
                            .write_u8(identity.identity_type as u8)
                            .and_then(|_| {
                                writer.write_u8(identity.positive_response_requested as u8)
                            })
                            .and_then(|_| {
                                writer
                                    .write_u16::<BigEndian>(identity.primary_field.len() as u16)
                            })
                            .and_then(|_| writer.write_all(&identity.primary_field))
                            .and_then(|_| {
                                writer
                                    .write_u16::<BigEndian>(identity.secondary_field.len() as u16)
                            })
                            .and_then(|_| writer.write_all(&identity.secondary_field))
                            .context(WritePduFieldSnafu {
                                field: "User Identity",
                            })?;
                        Ok(())
                    })?;
                }
                UserVariableItem::Unknown(item_type, data) => {
                    writer
                        .write_u8(*item_type)
                        .and_then(|_| writer.write_u8(0x00))
                        .context(WritePduFieldSnafu { field: "Item-type" })?;

                    write_chunk_u16(writer, "Unknown Sub-Item", |writer| {
                        writer
                            .write_all(data)
                            .context(WritePduFieldSnafu { field: "Unknown" })?;
                        Ok(())
                    })?;
                }
            }
        }

        Ok(())
    })
}
