//! The DIMSE message: a command set with an optional data set.

use dimse_core::{tags, DataSet, Value, VR};
use snafu::{OptionExt, ResultExt};

use crate::error::*;

/// The command data set type value declaring that no data set follows.
pub const NO_DATA_SET: u16 = 0x0101;

/// The command data set type value declaring that a data set follows.
pub const DATA_SET_PRESENT: u16 = 0x0001;

/// The command field values of the DIMSE-C operations (PS3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandField {
    /// C-STORE-RQ
    CStoreRq = 0x0001,
    /// C-STORE-RSP
    CStoreRsp = 0x8001,
    /// C-GET-RQ
    CGetRq = 0x0010,
    /// C-GET-RSP
    CGetRsp = 0x8010,
    /// C-FIND-RQ
    CFindRq = 0x0020,
    /// C-FIND-RSP
    CFindRsp = 0x8020,
    /// C-MOVE-RQ
    CMoveRq = 0x0021,
    /// C-MOVE-RSP
    CMoveRsp = 0x8021,
    /// C-ECHO-RQ
    CEchoRq = 0x0030,
    /// C-ECHO-RSP
    CEchoRsp = 0x8030,
    /// C-CANCEL-RQ
    CCancelRq = 0x0FFF,
}

impl CommandField {
    /// Interpret a command field value.
    pub fn from_code(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(CommandField::CStoreRq),
            0x8001 => Some(CommandField::CStoreRsp),
            0x0010 => Some(CommandField::CGetRq),
            0x8010 => Some(CommandField::CGetRsp),
            0x0020 => Some(CommandField::CFindRq),
            0x8020 => Some(CommandField::CFindRsp),
            0x0021 => Some(CommandField::CMoveRq),
            0x8021 => Some(CommandField::CMoveRsp),
            0x0030 => Some(CommandField::CEchoRq),
            0x8030 => Some(CommandField::CEchoRsp),
            0x0FFF => Some(CommandField::CCancelRq),
            _ => None,
        }
    }

    /// The wire value of this command field.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The command field of the response to this request.
    ///
    /// Responses and C-CANCEL-RQ map onto themselves.
    pub fn response(self) -> CommandField {
        match self {
            CommandField::CStoreRq => CommandField::CStoreRsp,
            CommandField::CGetRq => CommandField::CGetRsp,
            CommandField::CFindRq => CommandField::CFindRsp,
            CommandField::CMoveRq => CommandField::CMoveRsp,
            CommandField::CEchoRq => CommandField::CEchoRsp,
            other => other,
        }
    }
}

/// The priority of a C-STORE, C-FIND, C-GET or C-MOVE request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Low priority (0x0002).
    Low = 0x0002,
    /// Medium priority (0x0000), the default.
    #[default]
    Medium = 0x0000,
    /// High priority (0x0001).
    High = 0x0001,
}

impl Priority {
    /// Interpret a priority field value.
    pub fn from_code(value: u16) -> Option<Self> {
        match value {
            0x0000 => Some(Priority::Medium),
            0x0001 => Some(Priority::High),
            0x0002 => Some(Priority::Low),
            _ => None,
        }
    }
}

/// A DIMSE message: a command set and an optional data set.
///
/// The command set always travels in Implicit VR Little Endian,
/// regardless of the transfer syntax negotiated for the data set.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// the command set
    pub command: DataSet,
    /// the data set, present iff the command's
    /// CommandDataSetType (0000,0800) says so
    pub data: Option<DataSet>,
}

impl Message {
    /// Create a message from its parts,
    /// fixing up the CommandDataSetType field to match.
    pub fn new(mut command: DataSet, data: Option<DataSet>) -> Self {
        let data_set_type = if data.is_some() {
            DATA_SET_PRESENT
        } else {
            NO_DATA_SET
        };
        command
            .put(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                Value::from(data_set_type),
            )
            .expect("US admits integer values");
        Message { command, data }
    }

    /// The operation which this message carries.
    pub fn command_field(&self) -> Result<CommandField> {
        let value = self
            .command
            .uint16(tags::COMMAND_FIELD)
            .context(InvalidCommandSnafu)?;
        CommandField::from_code(value).context(UnrecognizedCommandFieldSnafu { value })
    }

    /// Whether the command set declares an accompanying data set.
    pub fn has_data_set(&self) -> Result<bool> {
        let value = self
            .command
            .uint16(tags::COMMAND_DATA_SET_TYPE)
            .context(InvalidCommandSnafu)?;
        Ok(value != NO_DATA_SET)
    }
}

/// Start a command set for the given operation.
pub(crate) fn command_set(field: CommandField, has_data: bool) -> DataSet {
    let mut command = DataSet::new();
    command
        .put(tags::COMMAND_FIELD, VR::US, Value::from(field.code()))
        .expect("US admits integer values");
    let data_set_type = if has_data { DATA_SET_PRESENT } else { NO_DATA_SET };
    command
        .put(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            Value::from(data_set_type),
        )
        .expect("US admits integer values");
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_field_codes() {
        assert_eq!(CommandField::CEchoRq.code(), 0x0030);
        assert_eq!(CommandField::CEchoRq.response(), CommandField::CEchoRsp);
        assert_eq!(CommandField::CFindRq.response(), CommandField::CFindRsp);
        assert_eq!(CommandField::from_code(0x8020), Some(CommandField::CFindRsp));
        assert_eq!(CommandField::from_code(0x0FFF), Some(CommandField::CCancelRq));
        assert_eq!(CommandField::from_code(0x0FFE), None);
    }

    #[test]
    fn message_fixes_data_set_type() {
        let command = command_set(CommandField::CEchoRq, true);
        let message = Message::new(command, None);
        assert!(!message.has_data_set().unwrap());

        let command = command_set(CommandField::CFindRq, false);
        let message = Message::new(command, Some(DataSet::new()));
        assert!(message.has_data_set().unwrap());
    }
}
