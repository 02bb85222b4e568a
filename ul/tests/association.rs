//! Loopback tests for association negotiation, release and abort.

use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::thread::JoinHandle;

use dimse_ul::association::{
    AssociationState, ClientAssociationOptions, PresentationContextNegotiated,
    ServerAssociationOptions, ServiceRole,
};
use dimse_ul::pdu::{
    AbortRQSource, PDataValue, PDataValueType, Pdu, PresentationContextResultReason,
};
use dimse_ul::Association;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

static SCU_AE_TITLE: &str = "ECHO-SCU";
static SCP_AE_TITLE: &str = "ECHO-SCP";

static IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
static EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
static JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";
static VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
static DIGITAL_MG_STORAGE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.1.2";

const PDV_HEADER_LEN: usize = 6;

fn spawn_scp<F>(handler: F) -> Result<(JoinHandle<Result<Association>>, SocketAddr)>
where
    F: FnOnce(Association) -> Result<Association> + Send + 'static,
{
    let listener = TcpListener::bind("localhost:0")?;
    let addr = listener.local_addr()?;
    let scp = ServerAssociationOptions::new()
        .accept_called_ae_title()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(VERIFICATION_SOP_CLASS);

    let h = std::thread::spawn(move || -> Result<Association> {
        let (stream, _addr) = listener.accept()?;
        let association = scp.establish(stream)?;
        handler(association)
    });
    Ok((h, addr))
}

/// Run an SCP and an SCU concurrently,
/// negotiate an association and release it.
#[test]
fn associate_and_release() {
    let (scp_handle, scp_addr) = spawn_scp(|mut association| {
        assert_eq!(association.state(), AssociationState::Established);
        assert_eq!(association.role(), ServiceRole::Provider);
        assert_eq!(association.peer_ae_title(), SCU_AE_TITLE);

        assert_eq!(
            association.presentation_contexts(),
            &[
                PresentationContextNegotiated {
                    id: 1,
                    abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                    transfer_syntax: IMPLICIT_VR_LE.to_string(),
                    reason: PresentationContextResultReason::Acceptance,
                    scu_role: true,
                    scp_role: true,
                },
                PresentationContextNegotiated {
                    id: 3,
                    abstract_syntax: DIGITAL_MG_STORAGE_SOP_CLASS.to_string(),
                    transfer_syntax: IMPLICIT_VR_LE.to_string(),
                    reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                    scu_role: true,
                    scp_role: true,
                },
            ],
        );

        // handle the release request
        let pdu = association.receive()?;
        assert_eq!(pdu, Pdu::ReleaseRQ);
        assert_eq!(association.state(), AssociationState::Released);
        assert!(association.is_closed());
        Ok(association)
    })
    .unwrap();

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE, EXPLICIT_VR_LE])
        .with_presentation_context(
            DIGITAL_MG_STORAGE_SOP_CLASS,
            vec![IMPLICIT_VR_LE, EXPLICIT_VR_LE, JPEG_BASELINE],
        )
        .establish(scp_addr)
        .unwrap();

    assert_eq!(association.state(), AssociationState::Established);
    assert_eq!(association.role(), ServiceRole::User);

    // exactly one transfer syntax was chosen for the accepted context
    let accepted: Vec<_> = association
        .presentation_contexts()
        .iter()
        .filter(|pc| pc.is_accepted())
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].transfer_syntax, IMPLICIT_VR_LE);

    association.release().unwrap();
    assert_eq!(association.state(), AssociationState::Released);
    assert!(association.is_closed());

    scp_handle
        .join()
        .expect("SCP panicked")
        .expect("Error at the SCP");
}

/// The SCP preference order decides the accepted transfer syntax.
#[test]
fn scp_transfer_syntax_preference_wins() {
    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .with_transfer_syntax(EXPLICIT_VR_LE)
        .with_transfer_syntax(IMPLICIT_VR_LE);

    let h = std::thread::spawn(move || -> Result<Association> {
        let (stream, _addr) = listener.accept().unwrap();
        let mut association = scp.establish(stream)?;
        let pdu = association.receive()?;
        assert_eq!(pdu, Pdu::ReleaseRQ);
        Ok(association)
    });

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        // offered in the opposite order of the SCP's preference
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE, EXPLICIT_VR_LE])
        .establish(addr)
        .unwrap();

    assert_eq!(
        association.presentation_contexts()[0].transfer_syntax,
        EXPLICIT_VR_LE
    );

    association.release().unwrap();
    h.join().unwrap().unwrap();
}

/// An SCP which checks the called AE title rejects a stranger.
#[test]
fn association_rejected_on_wrong_ae_title() {
    let (scp_handle, scp_addr) = spawn_scp(|association| Ok(association)).unwrap();

    let outcome = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title("NOT-THE-SCP")
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(scp_addr);

    match outcome {
        Err(dimse_ul::association::Error::Rejected { .. }) => {}
        outcome => panic!("expected a rejection, got {:?}", outcome.map(|_| ())),
    }

    // the SCP side fails to establish
    assert!(scp_handle.join().unwrap().is_err());
}

/// Aborting the association closes both sides.
#[test]
fn abort_reaches_the_peer() {
    let (scp_handle, scp_addr) = spawn_scp(|mut association| {
        let pdu = association.receive()?;
        match pdu {
            Pdu::AbortRQ { source } => {
                assert_eq!(source.codes(), (0, 0));
            }
            pdu => panic!("expected abort, got {:?}", pdu),
        }
        assert_eq!(association.state(), AssociationState::Aborted);
        assert!(association.is_closed());
        Ok(association)
    })
    .unwrap();

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .establish(scp_addr)
        .unwrap();

    association.abort(AbortRQSource::ServiceUser).unwrap();
    assert_eq!(association.state(), AssociationState::Aborted);
    assert!(association.is_closed());

    // further use of the association is refused
    assert!(association.receive().is_err());
    assert!(association
        .send(&Pdu::PData { data: vec![] })
        .is_err());

    scp_handle
        .join()
        .expect("SCP panicked")
        .expect("Error at the SCP");
}

/// A P-DATA PDU of exactly the maximum length goes through;
/// one byte more is refused before anything is written.
#[test]
fn max_pdu_length_is_enforced_on_send() {
    let max_client_pdu: usize = 5678;
    let max_server_pdu: usize = 7890;

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp = ServerAssociationOptions::new()
        .ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .max_pdu_length(max_server_pdu as u32);

    let h = std::thread::spawn(move || -> Result<Association> {
        let (stream, _addr) = listener.accept().unwrap();
        let mut association = scp.establish(stream)?;
        assert_eq!(association.peer_max_pdu_length() as usize, max_client_pdu);

        // one full-size PDU arrives whole
        match association.receive()? {
            Pdu::PData { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].data.len(), max_server_pdu - PDV_HEADER_LEN);
            }
            pdu => panic!("expected P-Data, got {:?}", pdu),
        }

        // fragmented data arrives as two PDUs
        let mut total = Vec::new();
        for _ in 0..2 {
            match association.receive()? {
                Pdu::PData { data } => {
                    for pdv in data {
                        assert_eq!(pdv.presentation_context_id, 1);
                        total.extend_from_slice(&pdv.data);
                    }
                }
                pdu => panic!("expected P-Data, got {:?}", pdu),
            }
        }
        assert_eq!(total.len(), max_server_pdu - PDV_HEADER_LEN + 2);

        let pdu = association.receive()?;
        assert_eq!(pdu, Pdu::ReleaseRQ);
        Ok(association)
    });

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(VERIFICATION_SOP_CLASS)
        .max_pdu_length(max_client_pdu as u32)
        .establish(addr)
        .unwrap();

    assert_eq!(association.peer_max_pdu_length() as usize, max_server_pdu);

    // a P-DATA PDU with a length field of exactly the peer maximum
    let mut packet = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Command,
            is_last: true,
            data: vec![0_u8; max_server_pdu - PDV_HEADER_LEN],
        }],
    };
    association.send(&packet).expect("failed sending packet");

    // one byte more and the PDU is refused locally
    if let Pdu::PData { ref mut data } = packet {
        data[0].data.push(0);
    }
    match association.send(&packet) {
        Err(dimse_ul::association::Error::SendTooLongPdu { .. }) => (),
        e => panic!("expected SendTooLongPdu, got {:?}", e.map(|_| ())),
    }

    // send_pdata splits the same payload into two conforming PDUs
    {
        let payload = vec![0_u8; max_server_pdu - PDV_HEADER_LEN + 2];
        let mut sender = association.send_pdata(1, PDataValueType::Data);
        sender.write_all(&payload).expect("error sending fragmented data");
    }

    association.release().unwrap();
    h.join().unwrap().unwrap();
}
