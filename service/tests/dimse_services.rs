//! End-to-end loopback tests for the DIMSE services.

use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use dimse_core::{tags, uids, DataSet, VR};
use dimse_encoding::{encode_data_set, TransferSyntax};
use dimse_service::{
    receive_message, send_message, CCancelRq, CFindRq, CFindRsp, CStoreRq, CommandField,
    Dispatcher, EchoScp, EchoScu, Error, FindScp, FindScu, Priority, Provider, ResponseGenerator,
    Status, StoreScp, StoreScu, VecResponseGenerator,
};
use dimse_ul::association::{AssociationState, ClientAssociationOptions, ServerAssociationOptions};
use dimse_ul::pdu::{AbortRQSource, PDataValue, PDataValueType, Pdu};
use dimse_ul::Association;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

static SCU_AE_TITLE: &str = "TEST-SCU";
static SCP_AE_TITLE: &str = "TEST-SCP";

static IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
static EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

fn spawn_scp<F>(
    options: ServerAssociationOptions<'static, dimse_ul::association::AcceptAny>,
    handler: F,
) -> Result<(JoinHandle<Result<()>>, SocketAddr)>
where
    F: FnOnce(Association) -> Result<()> + Send + 'static,
{
    let listener = TcpListener::bind("localhost:0")?;
    let addr = listener.local_addr()?;
    let h = std::thread::spawn(move || -> Result<()> {
        let (stream, _addr) = listener.accept()?;
        let association = options.establish(stream)?;
        handler(association)
    });
    Ok((h, addr))
}

fn connect(
    scp_addr: SocketAddr,
    abstract_syntax: &str,
    transfer_syntaxes: Vec<&str>,
) -> Association {
    ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_presentation_context(abstract_syntax, transfer_syntaxes)
        .establish(scp_addr)
        .expect("could not establish association")
}

/// S1: a complete C-ECHO round trip with a graceful release.
#[test]
fn echo_round_trip() {
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::VERIFICATION);

    let (scp_handle, scp_addr) = spawn_scp(options, |mut association| {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CEchoRq,
            Box::new(EchoScp::new(|request| {
                assert_eq!(request.message_id, 1);
                Status::SUCCESS
            })),
        );

        dispatcher.dispatch(&mut association)?;

        // the next dispatch observes the peer's release
        match dispatcher.dispatch(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        assert_eq!(association.state(), AssociationState::Released);
        assert!(association.is_closed());
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, uids::VERIFICATION, vec![IMPLICIT_VR_LE]);

    let status = EchoScu::new(&mut association).echo().unwrap();
    assert_eq!(status, Status::SUCCESS);

    association.release().unwrap();
    assert_eq!(association.state(), AssociationState::Released);

    scp_handle.join().unwrap().unwrap();
}

/// S2: C-FIND streams two Pending identifiers, then Success.
#[test]
fn find_streaming() {
    let find_model = uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND;

    let mut match_1 = DataSet::new();
    match_1
        .put(tags::PATIENT_NAME, VR::PN, "Hello^World")
        .unwrap();
    match_1.put(tags::PATIENT_ID, VR::LO, "1234").unwrap();
    let mut match_2 = DataSet::new();
    match_2.put(tags::PATIENT_NAME, VR::PN, "Doe^John").unwrap();
    match_2.put(tags::PATIENT_ID, VR::LO, "5678").unwrap();

    let identifiers = vec![match_1.clone(), match_2.clone()];

    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(find_model);

    let (scp_handle, scp_addr) = spawn_scp(options, move |mut association| {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CFindRq,
            Box::new(FindScp::new(VecResponseGenerator::new(identifiers))),
        );
        dispatcher.dispatch(&mut association)?;

        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, find_model, vec![IMPLICIT_VR_LE, EXPLICIT_VR_LE]);

    let mut query = DataSet::new();
    query.put_empty(tags::PATIENT_NAME, VR::PN);

    let mut received = Vec::new();
    let status = FindScu::new(&mut association)
        .find(find_model, &query, |identifier| received.push(identifier))
        .unwrap();

    assert_eq!(status, Status::SUCCESS);
    assert_eq!(received.len(), 2);
    assert_eq!(
        received[0].string(tags::PATIENT_NAME).unwrap(),
        "Hello^World"
    );
    assert_eq!(received[0].string(tags::PATIENT_ID).unwrap(), "1234");
    assert_eq!(received[1].string(tags::PATIENT_NAME).unwrap(), "Doe^John");
    assert_eq!(received[1].string(tags::PATIENT_ID).unwrap(), "5678");

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}

fn ct_image(pixel_data_len: usize) -> DataSet {
    let mut ds = DataSet::new();
    ds.put(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE)
        .unwrap();
    ds.put(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4").unwrap();
    ds.put(tags::MODALITY, VR::CS, "CT").unwrap();
    ds.put(tags::PATIENT_NAME, VR::PN, "Doe^John").unwrap();
    ds.put(tags::ROWS, VR::US, 64_u16).unwrap();
    ds.put(tags::COLUMNS, VR::US, 64_u16).unwrap();
    ds.put(
        tags::PIXEL_DATA,
        VR::OW,
        (0..pixel_data_len).map(|i| i as u8).collect::<Vec<u8>>(),
    )
    .unwrap();
    ds
}

/// S3: C-STORE of a data set which does not fit in one PDU.
#[test]
fn store_with_fragmentation() {
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::CT_IMAGE_STORAGE)
        .max_pdu_length(4096);

    let (patient_tx, patient_rx) = mpsc::channel();

    let (scp_handle, scp_addr) = spawn_scp(options, move |mut association| {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CStoreRq,
            Box::new(StoreScp::new(move |request: &CStoreRq| {
                assert_eq!(request.affected_sop_class_uid, uids::CT_IMAGE_STORAGE);
                assert_eq!(request.affected_sop_instance_uid, "1.2.3.4");
                let patient_name = request
                    .data_set
                    .string(tags::PATIENT_NAME)
                    .expect("stored object has a patient name")
                    .to_string();
                patient_tx.send(patient_name).unwrap();
                Status::SUCCESS
            })),
        );
        dispatcher.dispatch(&mut association)?;

        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_presentation_context(uids::CT_IMAGE_STORAGE, vec![IMPLICIT_VR_LE])
        .max_pdu_length(4096)
        .establish(scp_addr)
        .unwrap();

    // an 8 KiB pixel data payload guarantees at least two data PDUs
    // under a maximum PDU length of 4096
    let image = ct_image(8 * 1024);
    let status = StoreScu::new(&mut association)
        .store(&image, Priority::Medium)
        .unwrap();
    assert_eq!(status, Status::SUCCESS);
    assert_eq!(patient_rx.recv().unwrap(), "Doe^John");

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}

/// S4: the peer aborts while the last data fragment is pending.
#[test]
fn abort_mid_message() {
    let find_model = uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND;

    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(find_model);

    let (scp_handle, scp_addr) = spawn_scp(options, move |mut association| {
        // a pending response whose data set never finishes
        let mut identifier = DataSet::new();
        identifier
            .put(tags::PATIENT_NAME, VR::PN, "Hello^World")
            .unwrap();
        let message = CFindRsp {
            message_id_being_responded_to: 1,
            affected_sop_class_uid: Some(find_model.to_string()),
            status: Status::PENDING,
            identifier: Some(identifier),
        }
        .into_message();

        let command_bytes =
            encode_data_set(&message.command, &TransferSyntax::ImplicitVrLittleEndian)?;
        association.send(&Pdu::PData {
            data: vec![
                PDataValue {
                    presentation_context_id: 1,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: command_bytes,
                },
                PDataValue {
                    presentation_context_id: 1,
                    value_type: PDataValueType::Data,
                    is_last: false,
                    data: vec![0x10, 0x00, 0x10, 0x00],
                },
            ],
        })?;

        // and then the association goes down
        association.abort(AbortRQSource::Reserved)?;
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, find_model, vec![IMPLICIT_VR_LE]);

    match receive_message(&mut association) {
        Err(Error::AssociationAborted { source, reason, .. }) => {
            assert_eq!(source, 1);
            assert_eq!(reason, 0);
        }
        outcome => panic!("expected an aborted association, got {:?}", outcome),
    }
    assert_eq!(association.state(), AssociationState::Aborted);
    assert!(association.is_closed());

    scp_handle.join().unwrap().unwrap();
}

/// S5: sending on an abstract syntax which was never accepted
/// fails without putting anything on the wire.
#[test]
fn context_not_found() {
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::VERIFICATION);

    let (scp_handle, scp_addr) = spawn_scp(options, |mut association| {
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CEchoRq,
            Box::new(EchoScp::new(|_| Status::SUCCESS)),
        );
        dispatcher.dispatch(&mut association)?;
        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, uids::VERIFICATION, vec![IMPLICIT_VR_LE]);

    let store_rq = CStoreRq {
        message_id: 1,
        affected_sop_class_uid: uids::CT_IMAGE_STORAGE.to_string(),
        affected_sop_instance_uid: "1.2.3.4".to_string(),
        priority: Priority::Medium,
        data_set: ct_image(64),
    };
    match send_message(
        &mut association,
        &store_rq.into_message(),
        uids::CT_IMAGE_STORAGE,
    ) {
        Err(Error::ContextNotFound { abstract_syntax, .. }) => {
            assert_eq!(abstract_syntax, uids::CT_IMAGE_STORAGE);
        }
        outcome => panic!("expected ContextNotFound, got {:?}", outcome),
    }

    // nothing was written: the association is still fully usable
    let status = EchoScu::new(&mut association).echo().unwrap();
    assert_eq!(status, Status::SUCCESS);

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}

/// A generator which holds back its second response
/// until the test says so.
struct GatedGenerator {
    inner: VecResponseGenerator,
    gate: Option<mpsc::Receiver<()>>,
}

impl ResponseGenerator for GatedGenerator {
    fn initialize(&mut self, request: &CFindRq) -> dimse_service::Result<()> {
        self.inner.initialize(request)
    }

    fn done(&self) -> bool {
        self.inner.done()
    }

    fn get(&self) -> dimse_service::Result<(Status, Option<DataSet>)> {
        self.inner.get()
    }

    fn next(&mut self) -> dimse_service::Result<()> {
        if let Some(gate) = self.gate.take() {
            // wait for the cancel to be on its way, and give it time
            // to arrive at the socket before the provider polls
            let _ = gate.recv();
            std::thread::sleep(Duration::from_millis(300));
        }
        self.inner.next()
    }

    fn cancel(&mut self) {
        self.inner.cancel()
    }
}

/// S6: a C-CANCEL between pending responses ends the find
/// with a Cancel status.
#[test]
fn cancel_during_find() {
    let find_model = uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND;

    let mut match_1 = DataSet::new();
    match_1
        .put(tags::PATIENT_NAME, VR::PN, "Hello^World")
        .unwrap();
    let mut match_2 = DataSet::new();
    match_2.put(tags::PATIENT_NAME, VR::PN, "Doe^John").unwrap();

    let (gate_tx, gate_rx) = mpsc::channel();

    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(find_model);

    let (scp_handle, scp_addr) = spawn_scp(options, move |mut association| {
        let message = receive_message(&mut association)?;
        let generator = GatedGenerator {
            inner: VecResponseGenerator::new(vec![match_1, match_2]),
            gate: Some(gate_rx),
        };
        let mut provider = FindScp::new(generator);
        provider.handle(&mut association, message)?;

        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, find_model, vec![IMPLICIT_VR_LE]);

    let request = CFindRq {
        message_id: 1,
        affected_sop_class_uid: find_model.to_string(),
        priority: Priority::Medium,
        identifier: {
            let mut query = DataSet::new();
            query.put_empty(tags::PATIENT_NAME, VR::PN);
            query
        },
    };
    send_message(&mut association, &request.into_message(), find_model).unwrap();

    // first response is Pending
    let response = CFindRsp::from_message(receive_message(&mut association).unwrap()).unwrap();
    assert!(response.status.is_pending());
    assert_eq!(
        response
            .identifier
            .unwrap()
            .string(tags::PATIENT_NAME)
            .unwrap(),
        "Hello^World"
    );

    // ask for a cancel before the next response is produced
    send_message(
        &mut association,
        &CCancelRq::new(1).into_message(),
        find_model,
    )
    .unwrap();
    gate_tx.send(()).unwrap();

    let response = CFindRsp::from_message(receive_message(&mut association).unwrap()).unwrap();
    assert_eq!(response.status, Status::CANCEL);
    assert!(response.identifier.is_none());

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}

/// Commands with no registered provider are refused
/// with the unrecognized operation status.
#[test]
fn dispatcher_refuses_unknown_commands() {
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::VERIFICATION);

    let (scp_handle, scp_addr) = spawn_scp(options, |mut association| {
        // only C-ECHO is registered; the C-FIND below is refused
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CEchoRq,
            Box::new(EchoScp::new(|_| Status::SUCCESS)),
        );
        dispatcher.dispatch(&mut association)?;
        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, uids::VERIFICATION, vec![IMPLICIT_VR_LE]);

    let request = CFindRq {
        message_id: 7,
        affected_sop_class_uid: uids::VERIFICATION.to_string(),
        priority: Priority::Medium,
        identifier: DataSet::new(),
    };
    send_message(&mut association, &request.into_message(), uids::VERIFICATION).unwrap();

    let response = receive_message(&mut association).unwrap();
    assert_eq!(
        response.command.uint16(tags::COMMAND_FIELD).unwrap(),
        CommandField::CFindRsp.code()
    );
    assert_eq!(
        response
            .command
            .uint16(tags::MESSAGE_ID_BEING_RESPONDED_TO)
            .unwrap(),
        7
    );
    assert_eq!(
        Status(response.command.uint16(tags::STATUS).unwrap()),
        Status::UNRECOGNIZED_OPERATION
    );

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}

/// A receive deadline fires an abort and surfaces a timeout.
#[test]
fn receive_timeout_aborts_the_association() {
    let (stall_tx, stall_rx) = mpsc::channel::<()>();

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::VERIFICATION);
    let scp_handle = std::thread::spawn(move || -> Result<()> {
        let (stream, _addr) = listener.accept()?;
        let _association = options.establish(stream)?;
        // never answer; hold the association open until the test ends
        let _ = stall_rx.recv_timeout(Duration::from_secs(10));
        Ok(())
    });

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_presentation_context(uids::VERIFICATION, vec![IMPLICIT_VR_LE])
        .read_timeout(Duration::from_millis(100))
        .establish(addr)
        .unwrap();

    match receive_message(&mut association) {
        Err(Error::Timeout { .. }) => {}
        outcome => panic!("expected a timeout, got {:?}", outcome),
    }
    assert_eq!(association.state(), AssociationState::Aborted);
    assert!(association.is_closed());

    stall_tx.send(()).unwrap();
    scp_handle.join().unwrap().unwrap();
}

/// The message id counter yields fresh ids per request.
#[test]
fn message_ids_are_fresh_per_request() {
    let options = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(uids::VERIFICATION);

    let (scp_handle, scp_addr) = spawn_scp(options, |mut association| {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_by_handler = std::sync::Arc::clone(&seen);
        let mut dispatcher = Dispatcher::new();
        dispatcher.set_provider(
            CommandField::CEchoRq,
            Box::new(EchoScp::new(move |request: &dimse_service::CEchoRq| {
                seen_by_handler.lock().unwrap().push(request.message_id);
                Status::SUCCESS
            })),
        );
        dispatcher.dispatch(&mut association)?;
        dispatcher.dispatch(&mut association)?;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        match receive_message(&mut association) {
            Err(Error::AssociationReleased { .. }) => {}
            outcome => panic!("expected a released association, got {:?}", outcome),
        }
        Ok(())
    })
    .unwrap();

    let mut association = connect(scp_addr, uids::VERIFICATION, vec![IMPLICIT_VR_LE]);

    assert_eq!(
        EchoScu::new(&mut association).echo().unwrap(),
        Status::SUCCESS
    );
    assert_eq!(
        EchoScu::new(&mut association).echo().unwrap(),
        Status::SUCCESS
    );

    association.release().unwrap();
    scp_handle.join().unwrap().unwrap();
}
