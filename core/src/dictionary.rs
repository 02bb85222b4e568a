//! A static registry of data element attributes.
//!
//! The table is an immutable, process-wide lookup initialized at compile
//! time. Implicit VR decoding resolves the value representation of each
//! element here; tags that are not registered are read as [`VR::UN`].

use crate::tag::Tag;
use crate::tags;
use crate::vr::VR;

/// A registered data element attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    /// The attribute tag.
    pub tag: Tag,
    /// The attribute's value representation.
    pub vr: VR,
    /// The attribute keyword, in PascalCase as in the standard.
    pub keyword: &'static str,
}

const fn entry(tag: Tag, vr: VR, keyword: &'static str) -> Entry {
    Entry { tag, vr, keyword }
}

/// The dictionary entries, sorted by tag for binary search.
static ENTRIES: &[Entry] = &[
    entry(tags::COMMAND_GROUP_LENGTH, VR::UL, "CommandGroupLength"),
    entry(tags::AFFECTED_SOP_CLASS_UID, VR::UI, "AffectedSOPClassUID"),
    entry(tags::REQUESTED_SOP_CLASS_UID, VR::UI, "RequestedSOPClassUID"),
    entry(tags::COMMAND_FIELD, VR::US, "CommandField"),
    entry(tags::MESSAGE_ID, VR::US, "MessageID"),
    entry(
        tags::MESSAGE_ID_BEING_RESPONDED_TO,
        VR::US,
        "MessageIDBeingRespondedTo",
    ),
    entry(tags::MOVE_DESTINATION, VR::AE, "MoveDestination"),
    entry(tags::PRIORITY, VR::US, "Priority"),
    entry(tags::COMMAND_DATA_SET_TYPE, VR::US, "CommandDataSetType"),
    entry(tags::STATUS, VR::US, "Status"),
    entry(tags::OFFENDING_ELEMENT, VR::AT, "OffendingElement"),
    entry(tags::ERROR_COMMENT, VR::LO, "ErrorComment"),
    entry(
        tags::AFFECTED_SOP_INSTANCE_UID,
        VR::UI,
        "AffectedSOPInstanceUID",
    ),
    entry(
        tags::REQUESTED_SOP_INSTANCE_UID,
        VR::UI,
        "RequestedSOPInstanceUID",
    ),
    entry(
        tags::NUMBER_OF_REMAINING_SUBOPERATIONS,
        VR::US,
        "NumberOfRemainingSuboperations",
    ),
    entry(
        tags::NUMBER_OF_COMPLETED_SUBOPERATIONS,
        VR::US,
        "NumberOfCompletedSuboperations",
    ),
    entry(
        tags::NUMBER_OF_FAILED_SUBOPERATIONS,
        VR::US,
        "NumberOfFailedSuboperations",
    ),
    entry(
        tags::NUMBER_OF_WARNING_SUBOPERATIONS,
        VR::US,
        "NumberOfWarningSuboperations",
    ),
    entry(tags::SPECIFIC_CHARACTER_SET, VR::CS, "SpecificCharacterSet"),
    entry(tags::SOP_CLASS_UID, VR::UI, "SOPClassUID"),
    entry(tags::SOP_INSTANCE_UID, VR::UI, "SOPInstanceUID"),
    entry(tags::STUDY_DATE, VR::DA, "StudyDate"),
    entry(tags::STUDY_TIME, VR::TM, "StudyTime"),
    entry(tags::ACCESSION_NUMBER, VR::SH, "AccessionNumber"),
    entry(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "QueryRetrieveLevel"),
    entry(tags::MODALITY, VR::CS, "Modality"),
    entry(
        tags::REFERRING_PHYSICIAN_NAME,
        VR::PN,
        "ReferringPhysicianName",
    ),
    entry(
        tags::REFERENCED_IMAGE_SEQUENCE,
        VR::SQ,
        "ReferencedImageSequence",
    ),
    entry(
        tags::REFERENCED_SOP_CLASS_UID,
        VR::UI,
        "ReferencedSOPClassUID",
    ),
    entry(
        tags::REFERENCED_SOP_INSTANCE_UID,
        VR::UI,
        "ReferencedSOPInstanceUID",
    ),
    entry(tags::PATIENT_NAME, VR::PN, "PatientName"),
    entry(tags::PATIENT_ID, VR::LO, "PatientID"),
    entry(tags::PATIENT_BIRTH_DATE, VR::DA, "PatientBirthDate"),
    entry(tags::PATIENT_SEX, VR::CS, "PatientSex"),
    entry(tags::STUDY_INSTANCE_UID, VR::UI, "StudyInstanceUID"),
    entry(tags::SERIES_INSTANCE_UID, VR::UI, "SeriesInstanceUID"),
    entry(tags::STUDY_ID, VR::SH, "StudyID"),
    entry(tags::SERIES_NUMBER, VR::IS, "SeriesNumber"),
    entry(tags::INSTANCE_NUMBER, VR::IS, "InstanceNumber"),
    entry(tags::SAMPLES_PER_PIXEL, VR::US, "SamplesPerPixel"),
    entry(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        "PhotometricInterpretation",
    ),
    entry(tags::ROWS, VR::US, "Rows"),
    entry(tags::COLUMNS, VR::US, "Columns"),
    entry(tags::BITS_ALLOCATED, VR::US, "BitsAllocated"),
    entry(tags::BITS_STORED, VR::US, "BitsStored"),
    entry(tags::HIGH_BIT, VR::US, "HighBit"),
    entry(tags::PIXEL_REPRESENTATION, VR::US, "PixelRepresentation"),
    entry(tags::PIXEL_DATA, VR::OW, "PixelData"),
];

/// Look up a data element attribute by tag.
pub fn lookup(tag: Tag) -> Option<&'static Entry> {
    ENTRIES
        .binary_search_by_key(&tag, |e| e.tag)
        .ok()
        .map(|i| &ENTRIES[i])
}

/// The value representation registered for a tag,
/// falling back to UN for unregistered attributes.
pub fn vr_of(tag: Tag) -> VR {
    lookup(tag).map(|e| e.vr).unwrap_or(VR::UN)
}
