//! Identification of the supported transfer syntaxes.

use byteordered::Endianness;
use dimse_core::uids;
use std::fmt;

/// Prefix shared by every encapsulated (compressed) transfer syntax UID.
const ENCAPSULATED_PREFIX: &str = "1.2.840.10008.1.2.4.";

/// A transfer syntax family supported by the data set codec.
///
/// Encapsulated transfer syntaxes keep their concrete UID: the data set
/// framing is the same for all of them (explicit VR little endian, pixel
/// data in items under an undefined length), while the compressed frame
/// contents remain opaque at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian, the default transfer syntax.
    ImplicitVrLittleEndian,
    /// Explicit VR Little Endian.
    ExplicitVrLittleEndian,
    /// Explicit VR Big Endian (retired, but still seen on the wire).
    ExplicitVrBigEndian,
    /// Any encapsulated transfer syntax, identified by its UID.
    Encapsulated(String),
}

impl TransferSyntax {
    /// Identify a transfer syntax from its UID.
    ///
    /// Trailing whitespace and NUL padding are ignored.
    /// Returns `None` for a UID outside the supported families.
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = trim_uid(uid);
        match uid {
            uids::IMPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ImplicitVrLittleEndian),
            uids::EXPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ExplicitVrLittleEndian),
            uids::EXPLICIT_VR_BIG_ENDIAN => Some(TransferSyntax::ExplicitVrBigEndian),
            uid if uid.starts_with(ENCAPSULATED_PREFIX) => {
                Some(TransferSyntax::Encapsulated(uid.to_string()))
            }
            _ => None,
        }
    }

    /// The UID of this transfer syntax.
    pub fn uid(&self) -> &str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrBigEndian => uids::EXPLICIT_VR_BIG_ENDIAN,
            TransferSyntax::Encapsulated(uid) => uid,
        }
    }

    /// The byte order of multi-byte values under this transfer syntax.
    pub fn endianness(&self) -> Endianness {
        match self {
            TransferSyntax::ExplicitVrBigEndian => Endianness::Big,
            _ => Endianness::Little,
        }
    }

    /// Whether element headers carry an explicit value representation.
    pub fn explicit_vr(&self) -> bool {
        !matches!(self, TransferSyntax::ImplicitVrLittleEndian)
    }

    /// Whether pixel data is encapsulated in a sequence of items.
    pub fn encapsulated(&self) -> bool {
        matches!(self, TransferSyntax::Encapsulated(_))
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.uid())
    }
}

/// Strip the trailing characters which may pad a UID on the wire.
pub fn trim_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_native_syntaxes() {
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2"),
            Some(TransferSyntax::ImplicitVrLittleEndian)
        );
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2.1"),
            Some(TransferSyntax::ExplicitVrLittleEndian)
        );
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2.2"),
            Some(TransferSyntax::ExplicitVrBigEndian)
        );
    }

    #[test]
    fn identifies_encapsulated_family() {
        let ts = TransferSyntax::from_uid("1.2.840.10008.1.2.4.50").unwrap();
        assert!(ts.encapsulated());
        assert!(ts.explicit_vr());
        assert_eq!(ts.uid(), "1.2.840.10008.1.2.4.50");
    }

    #[test]
    fn tolerates_uid_padding() {
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2\0"),
            Some(TransferSyntax::ImplicitVrLittleEndian)
        );
    }

    #[test]
    fn rejects_unknown_uids() {
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.20"), None);
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.2.5"), None);
    }
}
