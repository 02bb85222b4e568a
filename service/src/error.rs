//! Error types for the DIMSE message layer and services.

use dimse_core::dataset::AccessError;
use dimse_core::Tag;
use snafu::{Backtrace, Snafu};

use crate::scp::GeneratorState;

/// The main error type for DIMSE message exchange and services.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The association is not established.
    #[snafu(display("association is not established"))]
    NotAssociated { backtrace: Backtrace },

    /// No accepted presentation context matches the abstract syntax.
    #[snafu(display(
        "no accepted presentation context for abstract syntax `{}`",
        abstract_syntax
    ))]
    ContextNotFound {
        abstract_syntax: String,
        backtrace: Backtrace,
    },

    /// The local role is not supported on the matching context.
    #[snafu(display(
        "local role is not supported on the presentation context for `{}`",
        abstract_syntax
    ))]
    RoleUnsupported {
        abstract_syntax: String,
        backtrace: Backtrace,
    },

    /// The peer initiated a normal shutdown of the association.
    #[snafu(display("association released by peer"))]
    AssociationReleased { backtrace: Backtrace },

    /// The association was aborted.
    #[snafu(display("association aborted (source {}, reason {})", source, reason))]
    AssociationAborted {
        #[snafu(source(false))]
        source: u8,
        reason: u8,
        backtrace: Backtrace,
    },

    /// A PDV arrived on a different presentation context mid-message.
    #[snafu(display(
        "presentation context changed mid-message (expected {}, got {})",
        expected,
        got
    ))]
    ContextIdMismatch {
        expected: u8,
        got: u8,
        backtrace: Backtrace,
    },

    /// Command and data fragments were interleaved within one message.
    #[snafu(display("unexpected {} fragment", kind))]
    UnexpectedFragment {
        kind: &'static str,
        backtrace: Backtrace,
    },

    /// An unexpected PDU arrived while expecting P-DATA.
    #[snafu(display("unexpected {} while expecting message data", description))]
    UnexpectedPdu {
        description: &'static str,
        backtrace: Backtrace,
    },

    /// A PDV arrived on a context which was never accepted.
    #[snafu(display("no accepted presentation context with id {}", id))]
    UnknownContextId { id: u8, backtrace: Backtrace },

    /// The negotiated transfer syntax cannot be decoded.
    #[snafu(display("unsupported transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    /// A command or data set failed to decode.
    #[snafu(display("could not decode {}: {}", subject, source))]
    Decode {
        subject: &'static str,
        #[snafu(backtrace)]
        source: dimse_encoding::Error,
    },

    /// A command or data set failed to encode.
    #[snafu(display("could not encode {}: {}", subject, source))]
    Encode {
        subject: &'static str,
        #[snafu(backtrace)]
        source: dimse_encoding::Error,
    },

    /// A message is missing a required command field,
    /// or carries one of an unexpected kind.
    #[snafu(display("invalid command set: {}", source))]
    InvalidCommand {
        #[snafu(backtrace)]
        source: AccessError,
    },

    /// The command field value is not a known DIMSE operation.
    #[snafu(display("unrecognized command field {:#06x}", value))]
    UnrecognizedCommandField { value: u16, backtrace: Backtrace },

    /// The command set is not of the kind the caller expected.
    #[snafu(display("expected command field {:#06x}, got {:#06x}", expected, got))]
    UnexpectedCommandField {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// A response declares an unexpected message id.
    #[snafu(display(
        "unexpected response message id {} (expected {})",
        got,
        expected
    ))]
    UnexpectedResponseMessageId {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// A response declares an unexpected affected SOP class.
    #[snafu(display(
        "unexpected response affected SOP class `{}` (expected `{}`)",
        got,
        expected
    ))]
    UnexpectedResponseSopClass {
        expected: String,
        got: String,
        backtrace: Backtrace,
    },

    /// A data set handed to a service is missing a required attribute.
    #[snafu(display("data set is missing attribute {}", tag))]
    MissingAttribute { tag: Tag, backtrace: Backtrace },

    /// A Pending response arrived without its identifier data set.
    #[snafu(display("pending response carries no identifier"))]
    MissingIdentifier { backtrace: Backtrace },

    /// A find response generator was driven outside its contract.
    #[snafu(display("response generator is not usable in state {:?}", state))]
    InvalidGeneratorState {
        state: GeneratorState,
        backtrace: Backtrace,
    },

    /// The receive deadline was exceeded; the association was aborted.
    #[snafu(display("operation timed out"))]
    Timeout {
        source: dimse_ul::association::Error,
    },

    /// An upper layer operation failed.
    #[snafu(display("upper layer failure: {}", source))]
    Ul {
        #[snafu(backtrace)]
        source: dimse_ul::association::Error,
    },

    /// Sending message fragments on the wire failed.
    #[snafu(display("failed to send message fragments: {}", source))]
    WireSend {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Type alias for results with this crate's error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
