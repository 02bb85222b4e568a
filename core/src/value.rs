//! The dynamically typed value of a DICOM element.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::Snafu;

use crate::dataset::DataSet;

/// The base set type for multi-valued attributes,
/// optimized for the common case of very few values.
pub type C<T> = SmallVec<[T; 2]>;

/// The five value categories a DICOM element value may belong to.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd)]
pub enum ValueKind {
    /// Signed 64-bit integers (IS, SL, SS, UL, US).
    Integers,
    /// 64-bit floating point numbers (DS, FL, FD).
    Reals,
    /// Text strings (all string representations, including AT as
    /// 8 hexadecimal digits).
    Strings,
    /// Nested data sets (SQ).
    Items,
    /// Raw byte buffers (OB, OD, OF, OL, OW, UN).
    Binary,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueKind::Integers => "Integers",
            ValueKind::Reals => "Reals",
            ValueKind::Strings => "Strings",
            ValueKind::Items => "Items",
            ValueKind::Binary => "Binary",
        };
        f.write_str(name)
    }
}

/// An error returned when requesting a value
/// under an incompatible category.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(display("bad value cast: requested {} but value is {}", requested, got))]
pub struct CastValueError {
    /// The value category requested by the caller.
    pub requested: ValueKind,
    /// The actual category of the value.
    pub got: ValueKind,
}

type Result<T> = std::result::Result<T, CastValueError>;

/// A DICOM element value: a tagged union with exactly one
/// active category of ordered values.
///
/// Nested data sets are held behind reference-counted handles,
/// so the same item may appear in more than one sequence
/// without a deep copy. Equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A sequence of signed 64-bit integers.
    Integers(C<i64>),
    /// A sequence of 64-bit floating point numbers.
    Reals(C<f64>),
    /// A sequence of text strings.
    Strings(C<String>),
    /// A sequence of shared nested data sets (SQ items).
    Items(C<Arc<DataSet>>),
    /// A sequence of raw byte buffers. Each buffer is one item of an
    /// encapsulated pixel data element; native binary values use
    /// exactly one buffer.
    Binary(C<Vec<u8>>),
}

impl Value {
    /// Create an empty value of the given category.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Integers => Value::Integers(C::new()),
            ValueKind::Reals => Value::Reals(C::new()),
            ValueKind::Strings => Value::Strings(C::new()),
            ValueKind::Items => Value::Items(C::new()),
            ValueKind::Binary => Value::Binary(C::new()),
        }
    }

    /// The category of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Integers(_) => ValueKind::Integers,
            Value::Reals(_) => ValueKind::Reals,
            Value::Strings(_) => ValueKind::Strings,
            Value::Items(_) => ValueKind::Items,
            Value::Binary(_) => ValueKind::Binary,
        }
    }

    /// Check whether the value holds no items.
    pub fn is_empty(&self) -> bool {
        self.multiplicity() == 0
    }

    /// The number of individual values.
    pub fn multiplicity(&self) -> usize {
        match self {
            Value::Integers(v) => v.len(),
            Value::Reals(v) => v.len(),
            Value::Strings(v) => v.len(),
            Value::Items(v) => v.len(),
            Value::Binary(v) => v.len(),
        }
    }

    /// Remove all values, keeping the category.
    pub fn clear(&mut self) {
        match self {
            Value::Integers(v) => v.clear(),
            Value::Reals(v) => v.clear(),
            Value::Strings(v) => v.clear(),
            Value::Items(v) => v.clear(),
            Value::Binary(v) => v.clear(),
        }
    }

    /// Get the integer values. An error is returned if the
    /// category is not compatible.
    pub fn integers(&self) -> Result<&C<i64>> {
        match self {
            Value::Integers(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Integers,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the integer values for modification.
    pub fn integers_mut(&mut self) -> Result<&mut C<i64>> {
        match self {
            Value::Integers(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Integers,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the real values. An error is returned if the
    /// category is not compatible.
    pub fn reals(&self) -> Result<&C<f64>> {
        match self {
            Value::Reals(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Reals,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the real values for modification.
    pub fn reals_mut(&mut self) -> Result<&mut C<f64>> {
        match self {
            Value::Reals(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Reals,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the string values. An error is returned if the
    /// category is not compatible.
    pub fn strings(&self) -> Result<&C<String>> {
        match self {
            Value::Strings(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Strings,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the string values for modification.
    pub fn strings_mut(&mut self) -> Result<&mut C<String>> {
        match self {
            Value::Strings(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Strings,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the nested data sets. An error is returned if the
    /// category is not compatible.
    pub fn items(&self) -> Result<&C<Arc<DataSet>>> {
        match self {
            Value::Items(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Items,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the nested data sets for modification.
    pub fn items_mut(&mut self) -> Result<&mut C<Arc<DataSet>>> {
        match self {
            Value::Items(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Items,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the binary buffers. An error is returned if the
    /// category is not compatible.
    pub fn binary(&self) -> Result<&C<Vec<u8>>> {
        match self {
            Value::Binary(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Binary,
                got: v.kind(),
            }
            .fail(),
        }
    }

    /// Get the binary buffers for modification.
    pub fn binary_mut(&mut self) -> Result<&mut C<Vec<u8>>> {
        match self {
            Value::Binary(v) => Ok(v),
            v => CastValueSnafu {
                requested: ValueKind::Binary,
                got: v.kind(),
            }
            .fail(),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integers(smallvec::smallvec![value])
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Integers(smallvec::smallvec![i64::from(value)])
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Reals(smallvec::smallvec![value])
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Strings(smallvec::smallvec![value.to_string()])
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Strings(smallvec::smallvec![value])
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(smallvec::smallvec![value])
    }
}

impl From<DataSet> for Value {
    fn from(value: DataSet) -> Self {
        Value::Items(smallvec::smallvec![Arc::new(value)])
    }
}

impl From<Arc<DataSet>> for Value {
    fn from(value: Arc<DataSet>) -> Self {
        Value::Items(smallvec::smallvec![value])
    }
}

impl FromIterator<i64> for Value {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Value::Integers(iter.into_iter().collect())
    }
}

impl FromIterator<f64> for Value {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Value::Reals(iter.into_iter().collect())
    }
}

impl FromIterator<String> for Value {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Value::Strings(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for Value {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Value::Strings(iter.into_iter().map(str::to_string).collect())
    }
}

impl FromIterator<Arc<DataSet>> for Value {
    fn from_iter<T: IntoIterator<Item = Arc<DataSet>>>(iter: T) -> Self {
        Value::Items(iter.into_iter().collect())
    }
}

impl FromIterator<Vec<u8>> for Value {
    fn from_iter<T: IntoIterator<Item = Vec<u8>>>(iter: T) -> Self {
        Value::Binary(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_and_multiplicity() {
        let v: Value = [1_i64, 2, 3].into_iter().collect();
        assert_eq!(v.kind(), ValueKind::Integers);
        assert_eq!(v.multiplicity(), 3);
        assert!(!v.is_empty());

        let v = Value::empty(ValueKind::Strings);
        assert_eq!(v.kind(), ValueKind::Strings);
        assert!(v.is_empty());
    }

    #[test]
    fn value_cast_checks_category() {
        let v = Value::from("Doe^John");
        assert_eq!(v.strings().unwrap().as_slice(), &["Doe^John".to_string()]);
        let e = v.integers().unwrap_err();
        assert_eq!(e.requested, ValueKind::Integers);
        assert_eq!(e.got, ValueKind::Strings);
    }

    #[test]
    fn value_clear_keeps_kind() {
        let mut v: Value = ["a", "b"].into_iter().collect();
        v.clear();
        assert!(v.is_empty());
        assert_eq!(v.kind(), ValueKind::Strings);
    }

    #[test]
    fn nested_items_are_shared() {
        let mut item = DataSet::new();
        item.put(crate::tags::PATIENT_ID, crate::VR::LO, Value::from("1234"))
            .unwrap();
        let item = Arc::new(item);

        let a: Value = [Arc::clone(&item)].into_iter().collect();
        let b: Value = [Arc::clone(&item)].into_iter().collect();
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.items().unwrap()[0], &b.items().unwrap()[0]));
    }

    #[test]
    fn value_equality_is_structural() {
        let a: Value = [1_i64, 2].into_iter().collect();
        let b: Value = [1_i64, 2].into_iter().collect();
        let c: Value = [2_i64, 1].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Value::from("1"));
    }
}
