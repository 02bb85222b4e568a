//! Write-then-read round trip tests for every PDU type.

use std::io::Cursor;

use crate::pdu::reader::ReadError;
use crate::pdu::*;

fn round_trip(pdu: &Pdu) -> Pdu {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, pdu).expect("writing should succeed");
    let mut cursor = Cursor::new(&bytes[..]);
    let same = read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true)
        .expect("reading should succeed")
        .expect("a whole PDU was written");
    assert_eq!(cursor.position(), bytes.len() as u64, "trailing bytes left");
    same
}

#[test]
fn association_rq_round_trip() {
    let pdu = Pdu::AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "SOME-SCU".to_string(),
        called_ae_title: "THE-SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec![
                    "1.2.840.10008.1.2.1".to_string(),
                    "1.2.840.10008.1.2".to_string(),
                ],
            },
            PresentationContextProposed {
                id: 3,
                abstract_syntax: "1.2.840.10008.5.1.4.1.1.2".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            },
        ],
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUid("2.25.137".to_string()),
            UserVariableItem::ImplementationVersionName("TEST01".to_string()),
            UserVariableItem::RoleSelection(RoleSelection {
                sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".to_string(),
                scu_role: true,
                scp_role: false,
            }),
            UserVariableItem::UserIdentity(UserIdentity {
                identity_type: UserIdentityType::UsernamePassword,
                positive_response_requested: false,
                primary_field: b"worklist".to_vec(),
                secondary_field: b"secret".to_vec(),
            }),
        ],
    };
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn association_ac_round_trip() {
    let pdu = Pdu::AssociationAC {
        protocol_version: 1,
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![
            PresentationContextResult {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: "1.2.840.10008.1.2".to_string(),
            },
            PresentationContextResult {
                id: 3,
                reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                transfer_syntax: "1.2.840.10008.1.2".to_string(),
            },
        ],
        user_variables: vec![UserVariableItem::MaxLength(8192)],
    };
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn association_rj_round_trip() {
    let pdu = Pdu::AssociationRJ {
        result: AssociationRJResult::Permanent,
        source: AssociationRJSource::ServiceUser(
            AssociationRJServiceUserReason::CalledAETitleNotRecognized,
        ),
    };
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn pdata_round_trip() {
    let pdu = Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0x08, 0x00, 0x00, 0x01],
            },
            PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Data,
                is_last: false,
                data: vec![0xAA; 64],
            },
        ],
    };
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn release_and_abort_round_trips() {
    assert_eq!(round_trip(&Pdu::ReleaseRQ), Pdu::ReleaseRQ);
    assert_eq!(round_trip(&Pdu::ReleaseRP), Pdu::ReleaseRP);

    let abort = Pdu::AbortRQ {
        source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPdu),
    };
    assert_eq!(round_trip(&abort), abort);

    let abort = Pdu::AbortRQ {
        source: AbortRQSource::ServiceUser,
    };
    assert_eq!(round_trip(&abort), abort);
}

#[test]
fn incomplete_pdu_reads_as_none() {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &Pdu::ReleaseRQ).unwrap();

    // no bytes at all
    let mut cursor = Cursor::new(&bytes[..0]);
    assert_eq!(read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true).unwrap(), None);

    // header only
    let mut cursor = Cursor::new(&bytes[..6]);
    assert_eq!(read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true).unwrap(), None);

    // partial payload
    let mut cursor = Cursor::new(&bytes[..bytes.len() - 1]);
    assert_eq!(read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true).unwrap(), None);
}

#[test]
fn oversized_pdata_is_rejected_in_strict_mode() {
    let pdu = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Data,
            is_last: true,
            data: vec![0; MINIMUM_PDU_SIZE as usize + 1],
        }],
    };
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdu).unwrap();

    let mut cursor = Cursor::new(&bytes[..]);
    let err = read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap_err();
    assert!(matches!(err, ReadError::PduTooLarge { .. }));

    // in non-strict mode the same PDU is admitted
    let mut cursor = Cursor::new(&bytes[..]);
    assert!(read_pdu(&mut cursor, MINIMUM_PDU_SIZE, false)
        .unwrap()
        .is_some());
}

#[test]
fn unknown_pdu_type_is_preserved() {
    let pdu = Pdu::Unknown {
        pdu_type: 0x42,
        data: vec![1, 2, 3, 4],
    };
    assert_eq!(round_trip(&pdu), pdu);
}
