//! The in-memory DICOM data set.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use num_traits::NumCast;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::element::{Element, VrMismatchError};
use crate::tag::Tag;
use crate::value::{CastValueError, Value, C};
use crate::vr::VR;

/// An error accessing an element of a data set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum AccessError {
    /// The requested element is not in the data set.
    #[snafu(display("no such data element {}", tag))]
    NoSuchDataElement { tag: Tag },
    /// The element exists, but its value is of another category.
    #[snafu(display("could not read element {}: {}", tag, source))]
    WrongKind { tag: Tag, source: CastValueError },
    /// A single value was requested from an empty element.
    #[snafu(display("element {} has no value", tag))]
    EmptyElement { tag: Tag },
    /// A narrowing conversion of an element value failed.
    #[snafu(display("value of element {} is out of range", tag))]
    OutOfRange { tag: Tag },
}

type Result<T, E = AccessError> = std::result::Result<T, E>;

/// A DICOM data set: an ordered mapping from attribute tags to elements,
/// always iterated in ascending tag order.
///
/// A data set carries the transfer syntax UID under which it was decoded
/// or is meant to be encoded. The empty string means "unspecified",
/// which is the state of an object being built in memory before it is
/// attached to a stream.
///
/// Data sets are value objects: equality compares the transfer syntax and
/// every element. Nested sequence items are shared (see [`Value::Items`]),
/// so cloning a data set does not deep-copy its items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSet {
    transfer_syntax: String,
    elements: BTreeMap<Tag, Element>,
}

impl DataSet {
    /// Create an empty data set with an unspecified transfer syntax.
    pub fn new() -> Self {
        DataSet::default()
    }

    /// Create an empty data set with the given transfer syntax UID.
    pub fn with_transfer_syntax(transfer_syntax: impl Into<String>) -> Self {
        DataSet {
            transfer_syntax: transfer_syntax.into(),
            elements: BTreeMap::new(),
        }
    }

    /// The transfer syntax UID of this data set
    /// (empty when unspecified).
    pub fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    /// Replace the transfer syntax UID of this data set.
    pub fn set_transfer_syntax(&mut self, transfer_syntax: impl Into<String>) {
        self.transfer_syntax = transfer_syntax.into();
    }

    /// The number of elements in the data set.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check whether the data set holds no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check whether an element is in the data set.
    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    /// Insert an element, replacing any element previously
    /// registered under the same tag.
    pub fn put_element(&mut self, tag: Tag, element: Element) {
        self.elements.insert(tag, element);
    }

    /// Build and insert an element from the given parts.
    ///
    /// Fails if the value's category is incompatible with the VR.
    pub fn put(
        &mut self,
        tag: Tag,
        vr: VR,
        value: impl Into<Value>,
    ) -> Result<(), VrMismatchError> {
        let element = Element::new(vr, value.into())?;
        self.elements.insert(tag, element);
        Ok(())
    }

    /// Insert an empty element of the given VR.
    pub fn put_empty(&mut self, tag: Tag, vr: VR) {
        self.elements.insert(tag, Element::empty(vr));
    }

    /// Remove an element from the data set,
    /// returning it if it was present.
    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    /// Remove all elements. The transfer syntax is kept.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Clear the value of an existing element, keeping its VR.
    pub fn clear_value(&mut self, tag: Tag) -> Result<()> {
        let element = self
            .elements
            .get_mut(&tag)
            .context(NoSuchDataElementSnafu { tag })?;
        element.value_mut().clear();
        Ok(())
    }

    /// Look up an element by tag.
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    /// Access an element by tag,
    /// failing if it is not in the data set.
    pub fn element(&self, tag: Tag) -> Result<&Element> {
        self.elements
            .get(&tag)
            .context(NoSuchDataElementSnafu { tag })
    }

    /// Access an element by tag for modification,
    /// failing if it is not in the data set.
    pub fn element_mut(&mut self, tag: Tag) -> Result<&mut Element> {
        self.elements
            .get_mut(&tag)
            .context(NoSuchDataElementSnafu { tag })
    }

    /// Iterate over the elements in ascending tag order.
    pub fn iter(&self) -> btree_map::Iter<'_, Tag, Element> {
        self.elements.iter()
    }

    /// The integer values of an existing element.
    pub fn ints(&self, tag: Tag) -> Result<&C<i64>> {
        self.element(tag)?
            .value()
            .integers()
            .context(WrongKindSnafu { tag })
    }

    /// The first integer value of an existing element.
    pub fn int(&self, tag: Tag) -> Result<i64> {
        self.ints(tag)?
            .first()
            .copied()
            .context(EmptyElementSnafu { tag })
    }

    /// The first integer value of an existing element,
    /// narrowed to the requested integer type.
    pub fn int_as<T>(&self, tag: Tag) -> Result<T>
    where
        T: NumCast,
    {
        let v = self.int(tag)?;
        NumCast::from(v).context(OutOfRangeSnafu { tag })
    }

    /// The first integer value of an existing element as a `u16`,
    /// the width of every command set numeric field.
    pub fn uint16(&self, tag: Tag) -> Result<u16> {
        self.int_as(tag)
    }

    /// The real values of an existing element.
    pub fn reals(&self, tag: Tag) -> Result<&C<f64>> {
        self.element(tag)?
            .value()
            .reals()
            .context(WrongKindSnafu { tag })
    }

    /// The first real value of an existing element.
    pub fn real(&self, tag: Tag) -> Result<f64> {
        self.reals(tag)?
            .first()
            .copied()
            .context(EmptyElementSnafu { tag })
    }

    /// The string values of an existing element.
    pub fn strings(&self, tag: Tag) -> Result<&C<String>> {
        self.element(tag)?
            .value()
            .strings()
            .context(WrongKindSnafu { tag })
    }

    /// The first string value of an existing element.
    pub fn string(&self, tag: Tag) -> Result<&str> {
        self.strings(tag)?
            .first()
            .map(String::as_str)
            .context(EmptyElementSnafu { tag })
    }

    /// The sequence items of an existing element.
    pub fn items(&self, tag: Tag) -> Result<&C<Arc<DataSet>>> {
        self.element(tag)?
            .value()
            .items()
            .context(WrongKindSnafu { tag })
    }

    /// The binary buffers of an existing element.
    pub fn binary(&self, tag: Tag) -> Result<&C<Vec<u8>>> {
        self.element(tag)?
            .value()
            .binary()
            .context(WrongKindSnafu { tag })
    }
}

impl<'a> IntoIterator for &'a DataSet {
    type Item = (&'a Tag, &'a Element);
    type IntoIter = btree_map::Iter<'a, Tag, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl IntoIterator for DataSet {
    type Item = (Tag, Element);
    type IntoIter = btree_map::IntoIter<Tag, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}
