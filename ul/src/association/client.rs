//! Association requester module.
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity is the one requesting the
//! association. See [`ClientAssociationOptions`]
//! for details and examples on how to create an association.

use std::borrow::Cow;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use snafu::{ensure, ResultExt};

use crate::association::{
    read_pdu_from_wire, Association, PresentationContextNegotiated, ServiceRole,
};
use crate::pdu::{
    write_pdu, AbortRQSource, Pdu, PresentationContextProposed, RoleSelection, UserIdentity,
    UserIdentityType, UserVariableItem, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE,
};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::Result;

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

/// A DICOM association builder for a client node.
/// The final outcome is an established [`Association`].
///
/// This is the standard way of requesting and establishing
/// an association with another DICOM node,
/// that one usually taking the role of a service class provider (SCP).
///
/// At least one presentation context must be specified,
/// using [`with_presentation_context`](Self::with_presentation_context)
/// with an abstract syntax and a transfer syntax preference list,
/// or [`with_abstract_syntax`](Self::with_abstract_syntax)
/// for the default transfer syntaxes.
///
/// ```no_run
/// # use dimse_ul::association::client::ClientAssociationOptions;
/// # use std::time::Duration;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///     .calling_ae_title("THIS-SCU")
///     .called_ae_title("MAIN-STORAGE")
///     .with_presentation_context(
///         "1.2.840.10008.1.1",
///         vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"],
///     )
///     .read_timeout(Duration::from_secs(60))
///     .establish("129.168.0.5:104")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions<'a> {
    /// the calling AE title
    calling_ae_title: Cow<'a, str>,
    /// the called AE title
    called_ae_title: Option<Cow<'a, str>>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of requested presentation contexts
    presentation_contexts: Vec<(Cow<'a, str>, Vec<Cow<'a, str>>)>,
    /// the SCP/SCU role selections to propose
    role_selections: Vec<RoleSelection>,
    /// the user identity to provide, if any
    user_identity: Option<UserIdentity>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length requested for receiving PDUs
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// timeout for individual socket reads
    read_timeout: Option<Duration>,
    /// timeout for individual socket writes
    write_timeout: Option<Duration>,
    /// timeout for connection establishment
    connection_timeout: Option<Duration>,
}

impl Default for ClientAssociationOptions<'_> {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: None,
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            presentation_contexts: Vec::new(),
            role_selections: Vec::new(),
            user_identity: None,
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            read_timeout: None,
            write_timeout: None,
            connection_timeout: None,
        }
    }
}

impl<'a> ClientAssociationOptions<'a> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title for the association,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title for the association,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let cae = called_ae_title.into();
        if cae.is_empty() {
            self.called_ae_title = None;
        } else {
            self.called_ae_title = Some(cae);
        }
        self
    }

    /// Include this presentation context
    /// in the list of proposed presentation contexts.
    pub fn with_presentation_context<T>(
        mut self,
        abstract_syntax_uid: T,
        transfer_syntax_uids: Vec<T>,
    ) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let transfer_syntaxes: Vec<Cow<'a, str>> = transfer_syntax_uids
            .into_iter()
            .map(|ts| trim_uid(ts.into()))
            .collect();
        self.presentation_contexts
            .push((trim_uid(abstract_syntax_uid.into()), transfer_syntaxes));
        self
    }

    /// Helper to add this abstract syntax
    /// with the default transfer syntaxes
    /// to the list of proposed presentation contexts.
    pub fn with_abstract_syntax<T>(self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let default_transfer_syntaxes: Vec<Cow<'a, str>> =
            vec!["1.2.840.10008.1.2.1".into(), "1.2.840.10008.1.2".into()];
        self.with_presentation_context(abstract_syntax_uid.into(), default_transfer_syntaxes)
    }

    /// Propose an SCP/SCU role selection for the given SOP class.
    pub fn with_role_selection<T>(mut self, sop_class_uid: T, scu_role: bool, scp_role: bool) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.role_selections.push(RoleSelection {
            sop_class_uid: trim_uid(sop_class_uid.into()).to_string(),
            scu_role,
            scp_role,
        });
        self
    }

    /// Provide a username for user identity negotiation.
    pub fn username<T>(self, username: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let username = username.into();
        self.user_identity_item(UserIdentity {
            identity_type: UserIdentityType::Username,
            positive_response_requested: false,
            primary_field: username.as_bytes().to_vec(),
            secondary_field: Vec::new(),
        })
    }

    /// Provide a username and a passcode for user identity negotiation.
    pub fn username_password<T, U>(self, username: T, password: U) -> Self
    where
        T: Into<Cow<'a, str>>,
        U: Into<Cow<'a, str>>,
    {
        let username = username.into();
        let password = password.into();
        self.user_identity_item(UserIdentity {
            identity_type: UserIdentityType::UsernamePassword,
            positive_response_requested: false,
            primary_field: username.as_bytes().to_vec(),
            secondary_field: password.as_bytes().to_vec(),
        })
    }

    /// Provide a fully formed user identity negotiation item.
    pub fn user_identity_item(mut self, user_identity: UserIdentity) -> Self {
        self.user_identity = Some(user_identity);
        self
    }

    /// Override the maximum PDU length
    /// that this application entity will admit.
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

    /// Set the read timeout for the underlying TCP socket.
    ///
    /// The default is no timeout. When the deadline fires while
    /// receiving, the association is aborted.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout for the underlying TCP socket.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set the timeout for establishing the TCP connection.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Initiate the TCP connection to the given address
    /// and request a new DICOM association,
    /// negotiating the presentation contexts in the process.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<Association> {
        ensure!(
            !self.presentation_contexts.is_empty(),
            super::MissingAbstractSyntaxSnafu
        );

        let mut socket = self.connect(&address)?;
        socket
            .set_read_timeout(self.read_timeout)
            .context(super::SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.write_timeout)
            .context(super::SetWriteTimeoutSnafu)?;

        let called_ae_title: &str = self.called_ae_title.as_deref().unwrap_or("ANY-SCP");

        let presentation_contexts_proposed: Vec<_> = self
            .presentation_contexts
            .iter()
            .enumerate()
            .map(|(i, (abstract_syntax, transfer_syntaxes))| PresentationContextProposed {
                // odd identifiers, 1, 3, 5, ...
                id: (2 * i + 1) as u8,
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: transfer_syntaxes.iter().map(|ts| ts.to_string()).collect(),
            })
            .collect();

        let mut user_variables = vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUid(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ];
        for role_selection in &self.role_selections {
            user_variables.push(UserVariableItem::RoleSelection(role_selection.clone()));
        }
        if let Some(user_identity) = &self.user_identity {
            user_variables.push(UserVariableItem::UserIdentity(user_identity.clone()));
        }

        let a_associate_rq = Pdu::AssociationRQ {
            protocol_version: self.protocol_version,
            calling_ae_title: self.calling_ae_title.to_string(),
            called_ae_title: called_ae_title.to_string(),
            application_context_name: self.application_context_name.to_string(),
            presentation_contexts: presentation_contexts_proposed.clone(),
            user_variables,
        };

        // state: Idle -> AwaitingAssociationResponse
        let mut buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
        write_pdu(&mut buffer, &a_associate_rq).context(super::SendPduSnafu)?;
        socket.write_all(&buffer).context(super::WireSendSnafu)?;
        buffer.clear();

        let mut read_buffer = BytesMut::with_capacity(MAXIMUM_PDU_SIZE as usize);
        let msg = read_pdu_from_wire(
            &mut socket,
            &mut read_buffer,
            self.max_pdu_length,
            self.strict,
        )?;

        match msg {
            Pdu::AssociationAC {
                protocol_version: protocol_version_scp,
                application_context_name: _,
                presentation_contexts: presentation_contexts_scp,
                user_variables,
            } => {
                if self.protocol_version != protocol_version_scp {
                    abort_connection(&mut socket, &mut buffer);
                    return super::ProtocolVersionMismatchSnafu {
                        expected: self.protocol_version,
                        got: protocol_version_scp,
                    }
                    .fail();
                }

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

                let role_selections: Vec<&RoleSelection> = user_variables
                    .iter()
                    .filter_map(|item| match item {
                        UserVariableItem::RoleSelection(role_selection) => Some(role_selection),
                        _ => None,
                    })
                    .collect();

                let presentation_contexts: Vec<_> = presentation_contexts_scp
                    .into_iter()
                    .filter_map(|pc| {
                        let proposed = presentation_contexts_proposed
                            .iter()
                            .find(|proposed| proposed.id == pc.id)?;
                        let roles = role_selections
                            .iter()
                            .find(|rs| rs.sop_class_uid == proposed.abstract_syntax);
                        Some(PresentationContextNegotiated {
                            id: pc.id,
                            abstract_syntax: proposed.abstract_syntax.clone(),
                            transfer_syntax: pc.transfer_syntax,
                            reason: pc.reason,
                            scu_role: roles.map(|rs| rs.scu_role).unwrap_or(true),
                            scp_role: roles.map(|rs| rs.scp_role).unwrap_or(true),
                        })
                    })
                    .collect();

                if !presentation_contexts.iter().any(|pc| pc.is_accepted()) {
                    abort_connection(&mut socket, &mut buffer);
                    return super::NoAcceptedPresentationContextsSnafu.fail();
                }

                // state: AwaitingAssociationResponse -> Established
                Ok(Association::new(
                    socket,
                    ServiceRole::User,
                    presentation_contexts,
                    self.max_pdu_length,
                    peer_max_pdu_length,
                    called_ae_title.to_string(),
                    read_buffer,
                    self.strict,
                ))
            }
            Pdu::AssociationRJ { result, source } => {
                // state: AwaitingAssociationResponse -> Aborted
                super::RejectedSnafu {
                    result,
                    source_info: source,
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
            pdu @ Pdu::Unknown { .. } => {
                abort_connection(&mut socket, &mut buffer);
                super::UnknownPduSnafu { pdu: Box::new(pdu) }.fail()
            }
            pdu => {
                abort_connection(&mut socket, &mut buffer);
                super::UnexpectedPduSnafu { pdu: Box::new(pdu) }.fail()
            }
        }
    }

    /// Open the TCP connection, honoring the connection timeout
    /// if one was given.
    fn connect<A: ToSocketAddrs>(&self, address: &A) -> Result<TcpStream> {
        if let Some(timeout) = self.connection_timeout {
            let addresses = address.to_socket_addrs().context(super::ToAddressSnafu)?;
            let mut last = std::io::Error::from(std::io::ErrorKind::AddrNotAvailable);
            for address in addresses {
                match TcpStream::connect_timeout(&address, timeout) {
                    Ok(socket) => return Ok(socket),
                    Err(e) => last = e,
                }
            }
            Err(last).context(super::ConnectSnafu)
        } else {
            TcpStream::connect(address).context(super::ConnectSnafu)
        }
    }
}

/// Best effort abort of a connection which never became an association.
fn abort_connection(socket: &mut TcpStream, buffer: &mut Vec<u8>) {
    buffer.clear();
    if write_pdu(
        buffer,
        &Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        },
    )
    .is_ok()
    {
        let _ = socket.write_all(buffer);
    }
    let _ = socket.shutdown(std::net::Shutdown::Both);
}
