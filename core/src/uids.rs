//! Constants for the unique identifiers used by the DIMSE services.

/// Verification SOP Class
pub const VERIFICATION: &str = "1.2.840.10008.1.1";

/// Implicit VR Little Endian: Default Transfer Syntax for DICOM
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR Little Endian
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
/// Explicit VR Big Endian (retired)
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
/// JPEG Baseline (Process 1): Default Transfer Syntax for Lossy JPEG
/// 8 Bit Image Compression
pub const JPEG_BASELINE_8_BIT: &str = "1.2.840.10008.1.2.4.50";
/// JPEG 2000 Image Compression (Lossless Only)
pub const JPEG_2000_LOSSLESS: &str = "1.2.840.10008.1.2.4.90";

/// DICOM Application Context Name
pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// CT Image Storage
pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
/// MR Image Storage
pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
/// Secondary Capture Image Storage
pub const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";

/// Patient Root Query/Retrieve Information Model - FIND
pub const PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND: &str =
    "1.2.840.10008.5.1.4.1.2.1.1";
/// Study Root Query/Retrieve Information Model - FIND
pub const STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND: &str =
    "1.2.840.10008.5.1.4.1.2.2.1";
/// Modality Worklist Information Model - FIND
pub const MODALITY_WORKLIST_INFORMATION_MODEL_FIND: &str = "1.2.840.10008.5.1.4.31";
