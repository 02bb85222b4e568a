//! Service class user operations.
//!
//! Each SCU borrows an established [`Association`] for the duration of
//! its operations, so that all I/O stays serialized on one owner.

use dimse_core::{tags, uids, DataSet};
use dimse_ul::Association;
use tracing::{error, warn};

use crate::commands::{CEchoRq, CEchoRsp, CFindRq, CFindRsp, CStoreRq, CStoreRsp};
use crate::error::*;
use crate::exchange::{protocol_abort, receive_message, send_message};
use crate::message::Priority;
use crate::status::Status;

/// Check that a response answers the request which was sent.
fn check_response_identity(
    association: &mut Association,
    expected_message_id: u16,
    got_message_id: u16,
    expected_sop_class: &str,
    got_sop_class: Option<&str>,
) -> Result<()> {
    if got_message_id != expected_message_id {
        return Err(protocol_abort(
            association,
            UnexpectedResponseMessageIdSnafu {
                expected: expected_message_id,
                got: got_message_id,
            }
            .build(),
        ));
    }
    if let Some(got) = got_sop_class {
        if got != expected_sop_class {
            return Err(protocol_abort(
                association,
                UnexpectedResponseSopClassSnafu {
                    expected: expected_sop_class.to_string(),
                    got: got.to_string(),
                }
                .build(),
            ));
        }
    }
    Ok(())
}

/// A service class user for the verification service (C-ECHO).
#[derive(Debug)]
pub struct EchoScu<'a> {
    association: &'a mut Association,
}

impl<'a> EchoScu<'a> {
    /// Create a verification SCU over the given association.
    ///
    /// The association must have an accepted presentation context
    /// for the Verification SOP class.
    pub fn new(association: &'a mut Association) -> Self {
        EchoScu { association }
    }

    /// Send a C-ECHO request and wait for its response,
    /// returning the response status.
    pub fn echo(&mut self) -> Result<Status> {
        let request = CEchoRq::new(self.association.next_message_id());
        let message_id = request.message_id;
        send_message(
            self.association,
            &request.into_message(),
            uids::VERIFICATION,
        )?;

        let response = receive_message(self.association)?;
        let response = CEchoRsp::from_message(&response)?;
        check_response_identity(
            self.association,
            message_id,
            response.message_id_being_responded_to,
            uids::VERIFICATION,
            response.affected_sop_class_uid.as_deref(),
        )?;
        Ok(response.status)
    }
}

/// A service class user for the storage service (C-STORE).
#[derive(Debug)]
pub struct StoreScu<'a> {
    association: &'a mut Association,
}

impl<'a> StoreScu<'a> {
    /// Create a storage SCU over the given association.
    pub fn new(association: &'a mut Association) -> Self {
        StoreScu { association }
    }

    /// Store the given composite object on the peer,
    /// returning the response status.
    ///
    /// The affected SOP class and instance are derived from the
    /// SOPClassUID (0008,0016) and SOPInstanceUID (0008,0018)
    /// attributes of the data set.
    pub fn store(&mut self, data_set: &DataSet, priority: Priority) -> Result<Status> {
        let sop_class_uid = data_set
            .string(tags::SOP_CLASS_UID)
            .map_err(|_| {
                MissingAttributeSnafu {
                    tag: tags::SOP_CLASS_UID,
                }
                .build()
            })?
            .to_string();
        let sop_instance_uid = data_set
            .string(tags::SOP_INSTANCE_UID)
            .map_err(|_| {
                MissingAttributeSnafu {
                    tag: tags::SOP_INSTANCE_UID,
                }
                .build()
            })?
            .to_string();

        let request = CStoreRq {
            message_id: self.association.next_message_id(),
            affected_sop_class_uid: sop_class_uid.clone(),
            affected_sop_instance_uid: sop_instance_uid,
            priority,
            data_set: data_set.clone(),
        };
        let message_id = request.message_id;
        send_message(self.association, &request.into_message(), &sop_class_uid)?;

        let response = receive_message(self.association)?;
        let response = CStoreRsp::from_message(&response)?;
        check_response_identity(
            self.association,
            message_id,
            response.message_id_being_responded_to,
            &sop_class_uid,
            response.affected_sop_class_uid.as_deref(),
        )?;
        Ok(response.status)
    }
}

/// A service class user for the query service (C-FIND).
#[derive(Debug)]
pub struct FindScu<'a> {
    association: &'a mut Association,
}

impl<'a> FindScu<'a> {
    /// Create a query SCU over the given association.
    pub fn new(association: &'a mut Association) -> Self {
        FindScu { association }
    }

    /// Send a C-FIND request with the given identifier and stream the
    /// matches to the callback, one identifier per Pending response.
    ///
    /// Responses with a warning status are logged and the loop
    /// continues; the loop ends at the first non-Pending response,
    /// whose status is returned. The callback owns each identifier it
    /// receives, and must not operate on this association reentrantly.
    pub fn find<F>(
        &mut self,
        abstract_syntax_uid: &str,
        identifier: &DataSet,
        mut callback: F,
    ) -> Result<Status>
    where
        F: FnMut(DataSet),
    {
        let request = CFindRq {
            message_id: self.association.next_message_id(),
            affected_sop_class_uid: abstract_syntax_uid.to_string(),
            priority: Priority::Medium,
            identifier: identifier.clone(),
        };
        let message_id = request.message_id;
        send_message(self.association, &request.into_message(), abstract_syntax_uid)?;

        loop {
            let response = receive_message(self.association)?;
            let response = CFindRsp::from_message(response)?;
            check_response_identity(
                self.association,
                message_id,
                response.message_id_being_responded_to,
                abstract_syntax_uid,
                response.affected_sop_class_uid.as_deref(),
            )?;

            let status = response.status;
            if status.is_warning() {
                warn!("C-FIND response status: {}", status);
            } else if status.is_failure() {
                error!("C-FIND response status: {}", status);
            }

            if !status.is_pending() {
                return Ok(status);
            }

            match response.identifier {
                Some(identifier) => callback(identifier),
                None => return MissingIdentifierSnafu.fail(),
            }
        }
    }

    /// Send a C-FIND request and collect every match into a vector.
    pub fn find_all(
        &mut self,
        abstract_syntax_uid: &str,
        identifier: &DataSet,
    ) -> Result<Vec<DataSet>> {
        let mut matches = Vec::new();
        self.find(abstract_syntax_uid, identifier, |identifier| {
            matches.push(identifier)
        })?;
        Ok(matches)
    }
}
