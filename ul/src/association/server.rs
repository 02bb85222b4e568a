//! Association acceptor module.
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity listens to incoming association
//! requests. See [`ServerAssociationOptions`]
//! for details and examples on how to create an association.

use std::borrow::Cow;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use bytes::BytesMut;
use snafu::{ensure, ResultExt};

use crate::association::{
    read_pdu_from_wire, Association, PresentationContextNegotiated, ServiceRole,
};
use crate::pdu::{
    write_pdu, AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource, Pdu,
    PresentationContextResult, PresentationContextResultReason, RoleSelection, UserIdentity,
    UserVariableItem, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE,
};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::Result;

/// Common interface for application entity access control policies.
///
/// Existing implementations include [`AcceptAny`] and
/// [`AcceptCalledAeTitle`], but users are free to implement their own.
pub trait AccessControl {
    /// Obtain the decision of whether to accept an incoming association
    /// request based on the recorded application entity titles and/or
    /// user identity.
    ///
    /// Returns `Ok(())` if the requester node should be given clearance.
    /// Otherwise, a concrete association RJ service user reason is given.
    fn check_access(
        &self,
        this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
        user_identity: Option<&UserIdentity>,
    ) -> Result<(), AssociationRJServiceUserReason>;
}

/// An access control rule that accepts any incoming association request.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(
        &self,
        _this_ae_title: &str,
        _calling_ae_title: &str,
        _called_ae_title: &str,
        _user_identity: Option<&UserIdentity>,
    ) -> Result<(), AssociationRJServiceUserReason> {
        Ok(())
    }
}

/// An access control rule that accepts association requests
/// that match the called AE title with the node's AE title.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptCalledAeTitle;

impl AccessControl for AcceptCalledAeTitle {
    fn check_access(
        &self,
        this_ae_title: &str,
        _calling_ae_title: &str,
        called_ae_title: &str,
        _user_identity: Option<&UserIdentity>,
    ) -> Result<(), AssociationRJServiceUserReason> {
        if this_ae_title == called_ae_title {
            Ok(())
        } else {
            Err(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
        }
    }
}

/// A DICOM association builder for an acceptor DICOM node,
/// often taking the role of a service class provider (SCP).
///
/// This is the standard way of negotiating and establishing
/// an association with a requesting node.
/// The outcome is an established [`Association`].
/// Unlike the [`ClientAssociationOptions`],
/// a value of this type can be reused for multiple connections.
///
/// [`ClientAssociationOptions`]: crate::association::ClientAssociationOptions
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use dimse_ul::association::server::ServerAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// # let tcp_listener: TcpListener = unimplemented!();
/// let scp_options = ServerAssociationOptions::new()
///     .ae_title("THIS-SCP")
///     .with_abstract_syntax("1.2.840.10008.1.1")
///     .with_transfer_syntax("1.2.840.10008.1.2.1");
///
/// let (stream, _address) = tcp_listener.accept()?;
/// scp_options.establish(stream)?;
/// # Ok(())
/// # }
/// ```
///
/// Access control logic is also available,
/// enabling application entities to decide on
/// whether to accept or reject the association request
/// based on the _called_ and _calling_ AE titles.
///
/// - By default, the application will accept requests from anyone
///   ([`AcceptAny`]).
/// - To only accept requests with a matching _called_ AE title,
///   add a call to [`accept_called_ae_title`](Self::accept_called_ae_title)
///   ([`AcceptCalledAeTitle`]).
/// - Any other policy can be implemented through the
///   [`AccessControl`] trait.
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions<'a, A> {
    /// the application entity access control policy
    ae_access_control: A,
    /// the AE title of this DICOM node
    ae_title: Cow<'a, str>,
    /// the expected application context name
    application_context_name: Cow<'a, str>,
    /// the list of supported abstract syntaxes
    abstract_syntax_uids: Vec<Cow<'a, str>>,
    /// the supported transfer syntaxes, in order of preference
    transfer_syntax_uids: Vec<Cow<'a, str>>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// whether to accept unknown abstract syntaxes
    promiscuous: bool,
    /// timeout for individual send/receive operations
    timeout: Option<Duration>,
}

impl Default for ServerAssociationOptions<'_, AcceptAny> {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_access_control: AcceptAny,
            ae_title: "THIS-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            promiscuous: false,
            timeout: None,
        }
    }
}

impl ServerAssociationOptions<'_, AcceptAny> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, A> ServerAssociationOptions<'a, A>
where
    A: AccessControl,
{
    /// Change the access control policy to accept any association
    /// regardless of the specified AE titles.
    ///
    /// This is the default behavior when the options are first created.
    pub fn accept_any(self) -> ServerAssociationOptions<'a, AcceptAny> {
        self.ae_access_control(AcceptAny)
    }

    /// Change the access control policy to accept an association
    /// if the called AE title matches this node's AE title.
    pub fn accept_called_ae_title(self) -> ServerAssociationOptions<'a, AcceptCalledAeTitle> {
        self.ae_access_control(AcceptCalledAeTitle)
    }

    /// Change the access control policy.
    pub fn ae_access_control<P>(self, access_control: P) -> ServerAssociationOptions<'a, P>
    where
        P: AccessControl,
    {
        let ServerAssociationOptions {
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            protocol_version,
            max_pdu_length,
            strict,
            promiscuous,
            ae_access_control: _,
            timeout,
        } = self;

        ServerAssociationOptions {
            ae_access_control: access_control,
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            protocol_version,
            max_pdu_length,
            strict,
            promiscuous,
            timeout,
        }
    }

    /// Define the application entity title referring to this DICOM node.
    ///
    /// The default is `THIS-SCP`.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Include this abstract syntax
    /// in the list of accepted abstract syntaxes.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.abstract_syntax_uids
            .push(trim_uid(abstract_syntax_uid.into()));
        self
    }

    /// Include this transfer syntax in the list of supported
    /// transfer syntaxes, after the ones already configured.
    ///
    /// Transfer syntaxes are chosen by this preference order.
    /// When none is configured, the uncompressed transfer syntaxes
    /// are supported, preferring Implicit VR Little Endian.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.transfer_syntax_uids
            .push(trim_uid(transfer_syntax_uid.into()));
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the negotiated maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override promiscuous mode:
    /// whether to accept unknown abstract syntaxes.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Set the timeout for the underlying TCP socket.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Negotiate an association with the given TCP stream.
    pub fn establish(&self, mut socket: TcpStream) -> Result<Association> {
        ensure!(
            !self.abstract_syntax_uids.is_empty() || self.promiscuous,
            super::MissingAbstractSyntaxSnafu
        );

        socket
            .set_read_timeout(self.timeout)
            .context(super::SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.timeout)
            .context(super::SetWriteTimeoutSnafu)?;

        // state: AwaitingAssociationRequest
        let mut read_buffer = BytesMut::with_capacity(MAXIMUM_PDU_SIZE as usize);
        let msg = read_pdu_from_wire(&mut socket, &mut read_buffer, MAXIMUM_PDU_SIZE, self.strict)?;

        let mut buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
        match msg {
            Pdu::AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            } => {
                if protocol_version != self.protocol_version {
                    reject(
                        &mut socket,
                        &mut buffer,
                        AssociationRJServiceUserReason::NoReasonGiven,
                    )?;
                    return super::RejectedSnafu {
                        result: AssociationRJResult::Permanent,
                        source_info: AssociationRJSource::ServiceUser(
                            AssociationRJServiceUserReason::NoReasonGiven,
                        ),
                    }
                    .fail();
                }

                if application_context_name != self.application_context_name {
                    reject(
                        &mut socket,
                        &mut buffer,
                        AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                    )?;
                    return super::RejectedSnafu {
                        result: AssociationRJResult::Permanent,
                        source_info: AssociationRJSource::ServiceUser(
                            AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                        ),
                    }
                    .fail();
                }

                let user_identity = user_variables.iter().find_map(|item| match item {
                    UserVariableItem::UserIdentity(identity) => Some(identity),
                    _ => None,
                });

                if let Err(reason) = self.ae_access_control.check_access(
                    &self.ae_title,
                    &calling_ae_title,
                    &called_ae_title,
                    user_identity,
                ) {
                    tracing::debug!(
                        "rejecting association from `{}` to `{}`: {:?}",
                        calling_ae_title,
                        called_ae_title,
                        reason
                    );
                    reject(&mut socket, &mut buffer, reason)?;
                    return super::RejectedSnafu {
                        result: AssociationRJResult::Permanent,
                        source_info: AssociationRJSource::ServiceUser(reason),
                    }
                    .fail();
                }

                // fetch the maximum PDU length the requester can receive
                let peer_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);
                // zero means no limit was specified
                let peer_max_pdu_length = if peer_max_pdu_length == 0 {
                    MAXIMUM_PDU_SIZE
                } else {
                    peer_max_pdu_length
                };

                let role_selections_rq: Vec<&RoleSelection> = user_variables
                    .iter()
                    .filter_map(|item| match item {
                        UserVariableItem::RoleSelection(role_selection) => Some(role_selection),
                        _ => None,
                    })
                    .collect();

                let mut negotiated = Vec::with_capacity(presentation_contexts.len());
                let mut results = Vec::with_capacity(presentation_contexts.len());
                for pc in &presentation_contexts {
                    let (reason, transfer_syntax) = self.decide_context(pc);
                    let roles = role_selections_rq
                        .iter()
                        .find(|rs| rs.sop_class_uid == pc.abstract_syntax);
                    results.push(PresentationContextResult {
                        id: pc.id,
                        reason,
                        transfer_syntax: transfer_syntax.clone(),
                    });
                    negotiated.push(PresentationContextNegotiated {
                        id: pc.id,
                        abstract_syntax: pc.abstract_syntax.clone(),
                        transfer_syntax,
                        reason,
                        scu_role: roles.map(|rs| rs.scu_role).unwrap_or(true),
                        scp_role: roles.map(|rs| rs.scp_role).unwrap_or(true),
                    });
                }

                let mut ac_user_variables = vec![
                    UserVariableItem::MaxLength(self.max_pdu_length),
                    UserVariableItem::ImplementationClassUid(IMPLEMENTATION_CLASS_UID.to_string()),
                    UserVariableItem::ImplementationVersionName(
                        IMPLEMENTATION_VERSION_NAME.to_string(),
                    ),
                ];
                // accept the role selections proposed on accepted contexts
                for role_selection in &role_selections_rq {
                    if negotiated
                        .iter()
                        .any(|pc| pc.is_accepted() && pc.abstract_syntax == role_selection.sop_class_uid)
                    {
                        ac_user_variables
                            .push(UserVariableItem::RoleSelection((*role_selection).clone()));
                    }
                }

                write_pdu(
                    &mut buffer,
                    &Pdu::AssociationAC {
                        protocol_version: self.protocol_version,
                        application_context_name,
                        presentation_contexts: results,
                        user_variables: ac_user_variables,
                    },
                )
                .context(super::SendPduSnafu)?;
                socket.write_all(&buffer).context(super::WireSendSnafu)?;

                // state: AwaitingAssociationRequest -> Established
                Ok(Association::new(
                    socket,
                    ServiceRole::Provider,
                    negotiated,
                    self.max_pdu_length,
                    peer_max_pdu_length,
                    calling_ae_title,
                    read_buffer,
                    self.strict,
                ))
            }
            Pdu::ReleaseRQ => {
                buffer.clear();
                write_pdu(&mut buffer, &Pdu::ReleaseRP).context(super::SendPduSnafu)?;
                let _ = socket.write_all(&buffer);
                super::UnexpectedPduSnafu {
                    pdu: Box::new(Pdu::ReleaseRQ),
                }
                .fail()
            }
            Pdu::AbortRQ { source } => {
                let (source_code, reason_code) = source.codes();
                super::AbortedSnafu {
                    source_code,
                    reason_code,
                }
                .fail()
            }
            pdu @ Pdu::Unknown { .. } => super::UnknownPduSnafu { pdu: Box::new(pdu) }.fail(),
            pdu => super::UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail(),
        }
    }

    /// Decide the outcome for one proposed presentation context.
    ///
    /// The transfer syntax is chosen honoring this acceptor's
    /// configured preference order.
    fn decide_context(
        &self,
        pc: &crate::pdu::PresentationContextProposed,
    ) -> (PresentationContextResultReason, String) {
        let fallback = "1.2.840.10008.1.2".to_string();

        if !self
            .abstract_syntax_uids
            .contains(&trim_uid(Cow::from(pc.abstract_syntax.as_str())))
            && !self.promiscuous
        {
            return (
                PresentationContextResultReason::AbstractSyntaxNotSupported,
                fallback,
            );
        }

        let preference: Vec<Cow<'_, str>> = if self.transfer_syntax_uids.is_empty() {
            vec![
                "1.2.840.10008.1.2".into(),
                "1.2.840.10008.1.2.1".into(),
                "1.2.840.10008.1.2.2".into(),
            ]
        } else {
            self.transfer_syntax_uids.clone()
        };
        for preferred in &preference {
            if let Some(ts) = pc
                .transfer_syntaxes
                .iter()
                .find(|offered| trim_uid(Cow::from(offered.as_str())) == *preferred)
            {
                return (PresentationContextResultReason::Acceptance, ts.clone());
            }
        }

        (
            PresentationContextResultReason::TransferSyntaxesNotSupported,
            fallback,
        )
    }
}

/// Strip the trailing characters which may pad a UID on the wire.
fn trim_uid(uid: Cow<'_, str>) -> Cow<'_, str> {
    if uid.ends_with(|c: char| c.is_whitespace() || c == '\0') {
        uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string()
            .into()
    } else {
        uid
    }
}

/// Send an A-ASSOCIATE-RJ with the given service user reason
/// and close the connection.
fn reject(
    socket: &mut TcpStream,
    buffer: &mut Vec<u8>,
    reason: AssociationRJServiceUserReason,
) -> Result<()> {
    buffer.clear();
    write_pdu(
        buffer,
        &Pdu::AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(reason),
        },
    )
    .context(super::SendPduSnafu)?;
    socket.write_all(buffer).context(super::WireSendSnafu)?;
    let _ = socket.shutdown(std::net::Shutdown::Both);
    Ok(())
}
