//! Protocol data unit definitions.
//!
//! The types in this module map one to one onto the PDU structures of
//! PS3.8, section 9.3. Reading and writing them from byte streams is
//! the responsibility of the [`reader`] and [`writer`] submodules.

use std::fmt;

pub mod reader;
pub mod writer;

pub use reader::read_pdu;
pub use writer::write_pdu;

#[cfg(test)]
mod test;

/// The default maximum PDU length, in bytes.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The smallest maximum PDU length admitted by this implementation.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The largest maximum PDU length admitted by this implementation.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The length of the common PDU header: type, reserved byte
/// and 4-byte big endian length.
pub const PDU_HEADER_SIZE: u32 = 6;

/// A presentation context as proposed in an A-ASSOCIATE-RQ:
/// one abstract syntax with one or more transfer syntaxes offered.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationContextProposed {
    /// the presentation context identifier, an odd number between 1 and 255
    pub id: u8,
    /// the proposed abstract syntax (SOP class) UID
    pub abstract_syntax: String,
    /// the transfer syntax UIDs offered for this context
    pub transfer_syntaxes: Vec<String>,
}

/// The outcome for one presentation context in an A-ASSOCIATE-AC.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationContextResult {
    /// the presentation context identifier, echoing the proposal
    pub id: u8,
    /// the outcome for this context
    pub reason: PresentationContextResultReason,
    /// the single transfer syntax chosen by the acceptor
    /// (not significant unless the context was accepted)
    pub transfer_syntax: String,
}

/// The reason field of a presentation context outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationContextResultReason {
    /// The context was accepted with the given transfer syntax.
    Acceptance = 0,
    /// The context was rejected by the user.
    UserRejection = 1,
    /// The context was rejected by the provider for no given reason.
    NoReason = 2,
    /// The abstract syntax is not supported.
    AbstractSyntaxNotSupported = 3,
    /// None of the proposed transfer syntaxes is supported.
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    /// Interpret the wire representation of the reason field.
    pub fn from(reason: u8) -> Option<Self> {
        match reason {
            0 => Some(PresentationContextResultReason::Acceptance),
            1 => Some(PresentationContextResultReason::UserRejection),
            2 => Some(PresentationContextResultReason::NoReason),
            3 => Some(PresentationContextResultReason::AbstractSyntaxNotSupported),
            4 => Some(PresentationContextResultReason::TransferSyntaxesNotSupported),
            _ => None,
        }
    }
}

/// The result field of an A-ASSOCIATE-RJ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJResult {
    /// rejected-permanent
    Permanent = 1,
    /// rejected-transient
    Transient = 2,
}

impl AssociationRJResult {
    /// Interpret the wire representation of the result field.
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(AssociationRJResult::Permanent),
            2 => Some(AssociationRJResult::Transient),
            _ => None,
        }
    }

    /// The wire representation of the result field.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The source and reason fields of an A-ASSOCIATE-RJ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJSource {
    /// DICOM UL service-user.
    ServiceUser(AssociationRJServiceUserReason),
    /// DICOM UL service-provider, ACSE related function.
    ServiceProviderAcse(AssociationRJServiceProviderAcseReason),
    /// DICOM UL service-provider, presentation related function.
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    /// Interpret the wire representation of the source and reason fields.
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match (source, reason) {
            (1, 1) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::NoReasonGiven,
            )),
            (1, 2) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            )),
            (1, 3) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CallingAETitleNotRecognized,
            )),
            (1, 7) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            )),
            (1, reason) => Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::Reserved(reason),
            )),
            (2, 1) => Some(AssociationRJSource::ServiceProviderAcse(
                AssociationRJServiceProviderAcseReason::NoReasonGiven,
            )),
            (2, 2) => Some(AssociationRJSource::ServiceProviderAcse(
                AssociationRJServiceProviderAcseReason::ProtocolVersionNotSupported,
            )),
            (3, 1) => Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            )),
            (3, 2) => Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            )),
            (3, reason) => Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::Reserved(reason),
            )),
            _ => None,
        }
    }

    /// The wire representation of the source and reason fields.
    pub fn codes(&self) -> (u8, u8) {
        match self {
            AssociationRJSource::ServiceUser(r) => (
                1,
                match r {
                    AssociationRJServiceUserReason::NoReasonGiven => 1,
                    AssociationRJServiceUserReason::ApplicationContextNameNotSupported => 2,
                    AssociationRJServiceUserReason::CallingAETitleNotRecognized => 3,
                    AssociationRJServiceUserReason::CalledAETitleNotRecognized => 7,
                    AssociationRJServiceUserReason::Reserved(code) => *code,
                },
            ),
            AssociationRJSource::ServiceProviderAcse(r) => (
                2,
                match r {
                    AssociationRJServiceProviderAcseReason::NoReasonGiven => 1,
                    AssociationRJServiceProviderAcseReason::ProtocolVersionNotSupported => 2,
                },
            ),
            AssociationRJSource::ServiceProviderPresentation(r) => (
                3,
                match r {
                    AssociationRJServiceProviderPresentationReason::TemporaryCongestion => 1,
                    AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => 2,
                    AssociationRJServiceProviderPresentationReason::Reserved(code) => *code,
                },
            ),
        }
    }
}

impl fmt::Display for AssociationRJSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssociationRJSource::ServiceUser(r) => write!(f, "by the service user: {:?}", r),
            AssociationRJSource::ServiceProviderAcse(r) => {
                write!(f, "by the service provider (ACSE): {:?}", r)
            }
            AssociationRJSource::ServiceProviderPresentation(r) => {
                write!(f, "by the service provider (presentation): {:?}", r)
            }
        }
    }
}

/// A-ASSOCIATE-RJ reasons when the source is the service user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

/// A-ASSOCIATE-RJ reasons when the source is the service provider
/// (ACSE related function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceProviderAcseReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

/// A-ASSOCIATE-RJ reasons when the source is the service provider
/// (presentation related function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

/// A single presentation data value item of a P-DATA-TF PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct PDataValue {
    /// the identifier of the presentation context this fragment belongs to
    pub presentation_context_id: u8,
    /// whether the fragment carries command set or data set bytes
    pub value_type: PDataValueType,
    /// whether this is the last fragment of the command or data set
    pub is_last: bool,
    /// the fragment bytes
    pub data: Vec<u8>,
}

/// The kind of content carried by a presentation data value fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PDataValueType {
    /// Message command information.
    Command,
    /// Message data set information.
    Data,
}

/// The source and reason fields of an A-ABORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortRQSource {
    /// DICOM UL service-user initiated abort.
    ServiceUser,
    /// The reserved source value (1), seen in the wild.
    Reserved,
    /// DICOM UL service-provider initiated abort.
    ServiceProvider(AbortRQServiceProviderReason),
}

impl AbortRQSource {
    /// Interpret the wire representation of the source and reason fields.
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match (source, reason) {
            (0, _) => Some(AbortRQSource::ServiceUser),
            (1, _) => Some(AbortRQSource::Reserved),
            (2, 0) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::ReasonNotSpecified,
            )),
            (2, 1) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnrecognizedPdu,
            )),
            (2, 2) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnexpectedPdu,
            )),
            (2, 3) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::Reserved,
            )),
            (2, 4) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnrecognizedPduParameter,
            )),
            (2, 5) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnexpectedPduParameter,
            )),
            (2, 6) => Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::InvalidPduParameter,
            )),
            _ => None,
        }
    }

    /// The wire representation of the source and reason fields.
    pub fn codes(&self) -> (u8, u8) {
        match self {
            AbortRQSource::ServiceUser => (0, 0),
            AbortRQSource::Reserved => (1, 0),
            AbortRQSource::ServiceProvider(r) => (
                2,
                match r {
                    AbortRQServiceProviderReason::ReasonNotSpecified => 0,
                    AbortRQServiceProviderReason::UnrecognizedPdu => 1,
                    AbortRQServiceProviderReason::UnexpectedPdu => 2,
                    AbortRQServiceProviderReason::Reserved => 3,
                    AbortRQServiceProviderReason::UnrecognizedPduParameter => 4,
                    AbortRQServiceProviderReason::UnexpectedPduParameter => 5,
                    AbortRQServiceProviderReason::InvalidPduParameter => 6,
                },
            ),
        }
    }
}

/// A-ABORT reasons when the source is the service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    Reserved,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameter,
}

/// An SCP/SCU role selection negotiation sub-item (0x54).
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSelection {
    /// the SOP class the roles apply to
    pub sop_class_uid: String,
    /// whether the association requester may act as an SCU
    pub scu_role: bool,
    /// whether the association requester may act as an SCP
    pub scp_role: bool,
}

/// The user identity type of a user identity negotiation sub-item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIdentityType {
    /// Username as a string in UTF-8.
    Username = 1,
    /// Username and passcode.
    UsernamePassword = 2,
    /// Kerberos service ticket.
    KerberosServiceTicket = 3,
    /// SAML assertion.
    SamlAssertion = 4,
    /// JSON web token.
    Jwt = 5,
}

impl UserIdentityType {
    /// Interpret the wire representation of the identity type field.
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(UserIdentityType::Username),
            2 => Some(UserIdentityType::UsernamePassword),
            3 => Some(UserIdentityType::KerberosServiceTicket),
            4 => Some(UserIdentityType::SamlAssertion),
            5 => Some(UserIdentityType::Jwt),
            _ => None,
        }
    }
}

/// A user identity negotiation sub-item (0x56).
#[derive(Debug, Clone, PartialEq)]
pub struct UserIdentity {
    /// the form of user identity being provided
    pub identity_type: UserIdentityType,
    /// whether a positive server response is requested
    pub positive_response_requested: bool,
    /// the primary identity field (e.g. the username)
    pub primary_field: Vec<u8>,
    /// the secondary identity field (e.g. the passcode)
    pub secondary_field: Vec<u8>,
}

/// A sub-item of the user information item.
#[derive(Debug, Clone, PartialEq)]
pub enum UserVariableItem {
    /// Maximum length sub-item (0x51).
    MaxLength(u32),
    /// Implementation class UID sub-item (0x52).
    ImplementationClassUid(String),
    /// Implementation version name sub-item (0x55).
    ImplementationVersionName(String),
    /// SCP/SCU role selection sub-item (0x54).
    RoleSelection(RoleSelection),
    /// User identity negotiation sub-item (0x56).
    UserIdentity(UserIdentity),
    /// Any other sub-item, kept as raw bytes.
    Unknown(u8, Vec<u8>),
}

/// A variable item of an A-ASSOCIATE-RQ or A-ASSOCIATE-AC payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PduVariableItem {
    /// An item of an unsupported type.
    Unknown(u8),
    /// Application context item (0x10).
    ApplicationContext(String),
    /// Proposed presentation context item (0x20).
    PresentationContextProposed(PresentationContextProposed),
    /// Presentation context result item (0x21).
    PresentationContextResult(PresentationContextResult),
    /// User information item (0x50).
    UserVariables(Vec<UserVariableItem>),
}

/// A protocol data unit of the DICOM upper layer protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    /// Any PDU of an unrecognized type.
    Unknown {
        pdu_type: u8,
        data: Vec<u8>,
    },
    /// A-ASSOCIATE-RQ (0x01).
    AssociationRQ {
        protocol_version: u16,
        calling_ae_title: String,
        called_ae_title: String,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextProposed>,
        user_variables: Vec<UserVariableItem>,
    },
    /// A-ASSOCIATE-AC (0x02).
    AssociationAC {
        protocol_version: u16,
        application_context_name: String,
        presentation_contexts: Vec<PresentationContextResult>,
        user_variables: Vec<UserVariableItem>,
    },
    /// A-ASSOCIATE-RJ (0x03).
    AssociationRJ {
        result: AssociationRJResult,
        source: AssociationRJSource,
    },
    /// P-DATA-TF (0x04).
    PData {
        data: Vec<PDataValue>,
    },
    /// A-RELEASE-RQ (0x05).
    ReleaseRQ,
    /// A-RELEASE-RP (0x06).
    ReleaseRP,
    /// A-ABORT (0x07).
    AbortRQ {
        source: AbortRQSource,
    },
}

impl Pdu {
    /// A short name for the PDU variant, for diagnostics.
    pub fn short_description(&self) -> &'static str {
        match self {
            Pdu::Unknown { .. } => "Unknown",
            Pdu::AssociationRQ { .. } => "A-ASSOCIATE-RQ",
            Pdu::AssociationAC { .. } => "A-ASSOCIATE-AC",
            Pdu::AssociationRJ { .. } => "A-ASSOCIATE-RJ",
            Pdu::PData { .. } => "P-DATA-TF",
            Pdu::ReleaseRQ => "A-RELEASE-RQ",
            Pdu::ReleaseRP => "A-RELEASE-RP",
            Pdu::AbortRQ { .. } => "A-ABORT",
        }
    }
}
