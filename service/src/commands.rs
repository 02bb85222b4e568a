//! Typed DIMSE command wrappers.
//!
//! Each wrapper validates its required command fields on construction
//! from a [`Message`], and builds a well formed command set when
//! converted back into one.

use dimse_core::{tags, uids, DataSet, Value, VR};
use snafu::{ensure, OptionExt, ResultExt};

use crate::error::*;
use crate::message::{command_set, CommandField, Message, Priority};
use crate::status::Status;

fn check_command_field(message: &Message, expected: CommandField) -> Result<()> {
    let got = message
        .command
        .uint16(tags::COMMAND_FIELD)
        .context(InvalidCommandSnafu)?;
    ensure!(
        got == expected.code(),
        UnexpectedCommandFieldSnafu {
            expected: expected.code(),
            got
        }
    );
    Ok(())
}

fn put_uid(command: &mut DataSet, tag: dimse_core::Tag, uid: &str) {
    command
        .put(tag, VR::UI, Value::from(uid))
        .expect("UI admits string values");
}

fn put_u16(command: &mut DataSet, tag: dimse_core::Tag, value: u16) {
    command
        .put(tag, VR::US, Value::from(value))
        .expect("US admits integer values");
}

/// A C-ECHO request.
#[derive(Debug, Clone, PartialEq)]
pub struct CEchoRq {
    /// Message ID (0000,0110)
    pub message_id: u16,
    /// Affected SOP Class UID (0000,0002)
    pub affected_sop_class_uid: String,
}

impl CEchoRq {
    /// Create a verification request with the given message ID.
    pub fn new(message_id: u16) -> Self {
        CEchoRq {
            message_id,
            affected_sop_class_uid: uids::VERIFICATION.to_string(),
        }
    }

    /// Wrap this request into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CEchoRq, false);
        put_uid(
            &mut command,
            tags::AFFECTED_SOP_CLASS_UID,
            &self.affected_sop_class_uid,
        );
        put_u16(&mut command, tags::MESSAGE_ID, self.message_id);
        Message::new(command, None)
    }

    /// Read a request back from a received message.
    pub fn from_message(message: &Message) -> Result<Self> {
        check_command_field(message, CommandField::CEchoRq)?;
        Ok(CEchoRq {
            message_id: message
                .command
                .uint16(tags::MESSAGE_ID)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: message
                .command
                .string(tags::AFFECTED_SOP_CLASS_UID)
                .context(InvalidCommandSnafu)?
                .to_string(),
        })
    }
}

/// A C-ECHO response.
#[derive(Debug, Clone, PartialEq)]
pub struct CEchoRsp {
    /// Message ID Being Responded To (0000,0120)
    pub message_id_being_responded_to: u16,
    /// Affected SOP Class UID (0000,0002), when present
    pub affected_sop_class_uid: Option<String>,
    /// Status (0000,0900)
    pub status: Status,
}

impl CEchoRsp {
    /// Create a response to the given request.
    pub fn new(request: &CEchoRq, status: Status) -> Self {
        CEchoRsp {
            message_id_being_responded_to: request.message_id,
            affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
            status,
        }
    }

    /// Wrap this response into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CEchoRsp, false);
        if let Some(uid) = &self.affected_sop_class_uid {
            put_uid(&mut command, tags::AFFECTED_SOP_CLASS_UID, uid);
        }
        put_u16(
            &mut command,
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            self.message_id_being_responded_to,
        );
        put_u16(&mut command, tags::STATUS, self.status.code());
        Message::new(command, None)
    }

    /// Read a response back from a received message.
    pub fn from_message(message: &Message) -> Result<Self> {
        check_command_field(message, CommandField::CEchoRsp)?;
        Ok(CEchoRsp {
            message_id_being_responded_to: message
                .command
                .uint16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: optional_uid(&message.command, tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(
                message
                    .command
                    .uint16(tags::STATUS)
                    .context(InvalidCommandSnafu)?,
            ),
        })
    }
}

/// A C-STORE request.
#[derive(Debug, Clone, PartialEq)]
pub struct CStoreRq {
    /// Message ID (0000,0110)
    pub message_id: u16,
    /// Affected SOP Class UID (0000,0002)
    pub affected_sop_class_uid: String,
    /// Affected SOP Instance UID (0000,1000)
    pub affected_sop_instance_uid: String,
    /// Priority (0000,0700)
    pub priority: Priority,
    /// The composite object to store.
    pub data_set: DataSet,
}

impl CStoreRq {
    /// Wrap this request into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CStoreRq, true);
        put_uid(
            &mut command,
            tags::AFFECTED_SOP_CLASS_UID,
            &self.affected_sop_class_uid,
        );
        put_u16(&mut command, tags::MESSAGE_ID, self.message_id);
        put_u16(&mut command, tags::PRIORITY, self.priority as u16);
        put_uid(
            &mut command,
            tags::AFFECTED_SOP_INSTANCE_UID,
            &self.affected_sop_instance_uid,
        );
        Message::new(command, Some(self.data_set))
    }

    /// Read a request back from a received message.
    pub fn from_message(message: Message) -> Result<Self> {
        check_command_field(&message, CommandField::CStoreRq)?;
        let priority = message
            .command
            .uint16(tags::PRIORITY)
            .map(|code| Priority::from_code(code).unwrap_or(Priority::Medium))
            .unwrap_or(Priority::Medium);
        Ok(CStoreRq {
            message_id: message
                .command
                .uint16(tags::MESSAGE_ID)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: message
                .command
                .string(tags::AFFECTED_SOP_CLASS_UID)
                .context(InvalidCommandSnafu)?
                .to_string(),
            affected_sop_instance_uid: message
                .command
                .string(tags::AFFECTED_SOP_INSTANCE_UID)
                .context(InvalidCommandSnafu)?
                .to_string(),
            priority,
            data_set: message.data.context(MissingIdentifierSnafu)?,
        })
    }
}

/// A C-STORE response.
#[derive(Debug, Clone, PartialEq)]
pub struct CStoreRsp {
    /// Message ID Being Responded To (0000,0120)
    pub message_id_being_responded_to: u16,
    /// Affected SOP Class UID (0000,0002), when present
    pub affected_sop_class_uid: Option<String>,
    /// Affected SOP Instance UID (0000,1000), when present
    pub affected_sop_instance_uid: Option<String>,
    /// Status (0000,0900)
    pub status: Status,
}

impl CStoreRsp {
    /// Create a response to the given request.
    pub fn new(request: &CStoreRq, status: Status) -> Self {
        CStoreRsp {
            message_id_being_responded_to: request.message_id,
            affected_sop_class_uid: Some(request.affected_sop_class_uid.clone()),
            affected_sop_instance_uid: Some(request.affected_sop_instance_uid.clone()),
            status,
        }
    }

    /// Wrap this response into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CStoreRsp, false);
        if let Some(uid) = &self.affected_sop_class_uid {
            put_uid(&mut command, tags::AFFECTED_SOP_CLASS_UID, uid);
        }
        put_u16(
            &mut command,
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            self.message_id_being_responded_to,
        );
        put_u16(&mut command, tags::STATUS, self.status.code());
        if let Some(uid) = &self.affected_sop_instance_uid {
            put_uid(&mut command, tags::AFFECTED_SOP_INSTANCE_UID, uid);
        }
        Message::new(command, None)
    }

    /// Read a response back from a received message.
    pub fn from_message(message: &Message) -> Result<Self> {
        check_command_field(message, CommandField::CStoreRsp)?;
        Ok(CStoreRsp {
            message_id_being_responded_to: message
                .command
                .uint16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: optional_uid(&message.command, tags::AFFECTED_SOP_CLASS_UID)?,
            affected_sop_instance_uid: optional_uid(
                &message.command,
                tags::AFFECTED_SOP_INSTANCE_UID,
            )?,
            status: Status(
                message
                    .command
                    .uint16(tags::STATUS)
                    .context(InvalidCommandSnafu)?,
            ),
        })
    }
}

/// A C-FIND request.
#[derive(Debug, Clone, PartialEq)]
pub struct CFindRq {
    /// Message ID (0000,0110)
    pub message_id: u16,
    /// Affected SOP Class UID (0000,0002)
    pub affected_sop_class_uid: String,
    /// Priority (0000,0700)
    pub priority: Priority,
    /// The query identifier.
    pub identifier: DataSet,
}

impl CFindRq {
    /// Wrap this request into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CFindRq, true);
        put_uid(
            &mut command,
            tags::AFFECTED_SOP_CLASS_UID,
            &self.affected_sop_class_uid,
        );
        put_u16(&mut command, tags::MESSAGE_ID, self.message_id);
        put_u16(&mut command, tags::PRIORITY, self.priority as u16);
        Message::new(command, Some(self.identifier))
    }

    /// Read a request back from a received message.
    pub fn from_message(message: Message) -> Result<Self> {
        check_command_field(&message, CommandField::CFindRq)?;
        let priority = message
            .command
            .uint16(tags::PRIORITY)
            .map(|code| Priority::from_code(code).unwrap_or(Priority::Medium))
            .unwrap_or(Priority::Medium);
        Ok(CFindRq {
            message_id: message
                .command
                .uint16(tags::MESSAGE_ID)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: message
                .command
                .string(tags::AFFECTED_SOP_CLASS_UID)
                .context(InvalidCommandSnafu)?
                .to_string(),
            priority,
            identifier: message.data.context(MissingIdentifierSnafu)?,
        })
    }
}

/// A C-FIND response.
#[derive(Debug, Clone, PartialEq)]
pub struct CFindRsp {
    /// Message ID Being Responded To (0000,0120)
    pub message_id_being_responded_to: u16,
    /// Affected SOP Class UID (0000,0002), when present
    pub affected_sop_class_uid: Option<String>,
    /// Status (0000,0900)
    pub status: Status,
    /// The match identifier, present on Pending responses.
    pub identifier: Option<DataSet>,
}

impl CFindRsp {
    /// Wrap this response into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CFindRsp, self.identifier.is_some());
        if let Some(uid) = &self.affected_sop_class_uid {
            put_uid(&mut command, tags::AFFECTED_SOP_CLASS_UID, uid);
        }
        put_u16(
            &mut command,
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            self.message_id_being_responded_to,
        );
        put_u16(&mut command, tags::STATUS, self.status.code());
        Message::new(command, self.identifier)
    }

    /// Read a response back from a received message.
    pub fn from_message(message: Message) -> Result<Self> {
        check_command_field(&message, CommandField::CFindRsp)?;
        Ok(CFindRsp {
            message_id_being_responded_to: message
                .command
                .uint16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
                .context(InvalidCommandSnafu)?,
            affected_sop_class_uid: optional_uid(&message.command, tags::AFFECTED_SOP_CLASS_UID)?,
            status: Status(
                message
                    .command
                    .uint16(tags::STATUS)
                    .context(InvalidCommandSnafu)?,
            ),
            identifier: message.data,
        })
    }
}

/// A C-CANCEL request.
#[derive(Debug, Clone, PartialEq)]
pub struct CCancelRq {
    /// Message ID Being Responded To (0000,0120)
    pub message_id_being_responded_to: u16,
}

impl CCancelRq {
    /// Create a cancel request for the given original message ID.
    pub fn new(message_id_being_responded_to: u16) -> Self {
        CCancelRq {
            message_id_being_responded_to,
        }
    }

    /// Wrap this request into a message.
    pub fn into_message(self) -> Message {
        let mut command = command_set(CommandField::CCancelRq, false);
        put_u16(
            &mut command,
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            self.message_id_being_responded_to,
        );
        Message::new(command, None)
    }

    /// Read a request back from a received message.
    pub fn from_message(message: &Message) -> Result<Self> {
        check_command_field(message, CommandField::CCancelRq)?;
        Ok(CCancelRq {
            message_id_being_responded_to: message
                .command
                .uint16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
                .context(InvalidCommandSnafu)?,
        })
    }
}

/// Read a UID command field which may legitimately be absent.
fn optional_uid(command: &DataSet, tag: dimse_core::Tag) -> Result<Option<String>> {
    match command.get(tag) {
        None => Ok(None),
        Some(element) if element.is_empty() => Ok(None),
        Some(_) => Ok(Some(
            command
                .string(tag)
                .context(InvalidCommandSnafu)?
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_round_trip() {
        let rq = CEchoRq::new(5);
        let message = rq.clone().into_message();
        assert_eq!(
            message.command.uint16(tags::COMMAND_FIELD).unwrap(),
            0x0030
        );
        assert!(!message.has_data_set().unwrap());
        assert_eq!(CEchoRq::from_message(&message).unwrap(), rq);
    }

    #[test]
    fn echo_response_round_trip() {
        let rq = CEchoRq::new(5);
        let rsp = CEchoRsp::new(&rq, Status::SUCCESS);
        let message = rsp.clone().into_message();
        assert_eq!(
            message.command.uint16(tags::COMMAND_FIELD).unwrap(),
            0x8030
        );
        let back = CEchoRsp::from_message(&message).unwrap();
        assert_eq!(back, rsp);
        assert_eq!(back.message_id_being_responded_to, 5);
        assert!(back.status.is_success());
    }

    #[test]
    fn store_request_round_trip() {
        let mut ds = DataSet::new();
        ds.put(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE)
            .unwrap();
        ds.put(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4").unwrap();
        ds.put(tags::PATIENT_NAME, VR::PN, "Doe^John").unwrap();

        let rq = CStoreRq {
            message_id: 9,
            affected_sop_class_uid: uids::CT_IMAGE_STORAGE.to_string(),
            affected_sop_instance_uid: "1.2.3.4".to_string(),
            priority: Priority::High,
            data_set: ds,
        };
        let message = rq.clone().into_message();
        assert!(message.has_data_set().unwrap());
        let back = CStoreRq::from_message(message).unwrap();
        assert_eq!(back, rq);
    }

    #[test]
    fn find_response_without_identifier() {
        let rsp = CFindRsp {
            message_id_being_responded_to: 3,
            affected_sop_class_uid: None,
            status: Status::SUCCESS,
            identifier: None,
        };
        let message = rsp.clone().into_message();
        assert!(!message.has_data_set().unwrap());
        assert_eq!(CFindRsp::from_message(message).unwrap(), rsp);
    }

    #[test]
    fn wrong_command_field_is_rejected() {
        let message = CEchoRq::new(1).into_message();
        assert!(matches!(
            CEchoRsp::from_message(&message),
            Err(Error::UnexpectedCommandField {
                expected: 0x8030,
                got: 0x0030,
                ..
            })
        ));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let command = command_set(CommandField::CEchoRq, false);
        let message = Message::new(command, None);
        assert!(matches!(
            CEchoRq::from_message(&message),
            Err(Error::InvalidCommand { .. })
        ));
    }
}
