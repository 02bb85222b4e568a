//! The DICOM data element type.

use snafu::{ensure, Snafu};

use crate::value::{Value, ValueKind};
use crate::vr::VR;

/// An error returned when pairing a value representation
/// with a value of an incompatible category.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(display("VR {} does not admit {} values", vr, kind))]
pub struct VrMismatchError {
    /// The offending value representation.
    pub vr: VR,
    /// The category of the rejected value.
    pub kind: ValueKind,
}

type Result<T> = std::result::Result<T, VrMismatchError>;

/// A data type that represents and owns a DICOM data element:
/// a value representation paired with a compatible value.
///
/// An element may be empty (zero values) while still carrying a VR.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    vr: VR,
    value: Value,
}

impl Element {
    /// Create an element from the given parts.
    ///
    /// Fails if the value's category is not the one admitted
    /// by the value representation.
    pub fn new(vr: VR, value: Value) -> Result<Self> {
        ensure!(
            vr.kind() == value.kind(),
            VrMismatchSnafu {
                vr,
                kind: value.kind()
            }
        );
        Ok(Element { vr, value })
    }

    /// Create an empty element of the given value representation.
    pub fn empty(vr: VR) -> Self {
        Element {
            vr,
            value: Value::empty(vr.kind()),
        }
    }

    /// Retrieve the element's value representation.
    #[inline]
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// Retrieve the element's value.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Retrieve the element's value for modification.
    ///
    /// The value's category cannot change through this reference,
    /// so the VR compatibility invariant is preserved.
    #[inline]
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Move the value out of the element, discarding the VR.
    #[inline]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Check whether the element holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The number of individual values in the element.
    #[inline]
    pub fn multiplicity(&self) -> usize {
        self.value.multiplicity()
    }
}
