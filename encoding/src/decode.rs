//! Decoding of data sets from their transfer syntax encoded form.

use std::io::{Cursor, Read};
use std::sync::Arc;

use byteordered::ByteOrdered;
use dimse_core::value::C;
use dimse_core::{dictionary, tags, DataSet, Element, Tag, Value, ValueKind, VR};
use snafu::{ensure, ResultExt};

use crate::error::*;
use crate::text::{DefaultCharacterSetCodec, TextCodec};
use crate::transfer_syntax::TransferSyntax;

pub(crate) const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Decode a complete data set from its encoded form
/// under the given transfer syntax.
///
/// The returned data set carries the transfer syntax UID.
/// Trailing bytes after the last element are an error.
pub fn read_data_set(bytes: &[u8], ts: &TransferSyntax) -> Result<DataSet> {
    let mut reader = DataSetReader::new(bytes, ts);
    let mut ds = DataSet::with_transfer_syntax(ts.uid());
    while reader.remaining() > 0 {
        let tag = reader.read_tag()?;
        let element = reader.read_element_body(tag)?;
        ds.put_element(tag, element);
    }
    Ok(ds)
}

struct DataSetReader<'a> {
    cursor: Cursor<&'a [u8]>,
    ts: &'a TransferSyntax,
    codec: DefaultCharacterSetCodec,
}

impl<'a> DataSetReader<'a> {
    fn new(bytes: &'a [u8], ts: &'a TransferSyntax) -> Self {
        DataSetReader {
            cursor: Cursor::new(bytes),
            ts,
            codec: DefaultCharacterSetCodec,
        }
    }

    fn remaining(&self) -> u64 {
        self.cursor.get_ref().len() as u64 - self.cursor.position()
    }

    fn read_u16(&mut self, subject: &'static str) -> Result<u16> {
        ByteOrdered::runtime(&mut self.cursor, self.ts.endianness())
            .read_u16()
            .context(ReadBytesSnafu { subject })
    }

    fn read_u32(&mut self, subject: &'static str) -> Result<u32> {
        ByteOrdered::runtime(&mut self.cursor, self.ts.endianness())
            .read_u32()
            .context(ReadBytesSnafu { subject })
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let group = self.read_u16("tag group")?;
        let element = self.read_u16("tag element")?;
        Ok(Tag(group, element))
    }

    fn read_value_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        ensure!(
            self.remaining() >= length as u64,
            UnexpectedEndOfInputSnafu {
                subject: "element value",
            }
        );
        let mut bytes = vec![0; length];
        self.cursor
            .read_exact(&mut bytes)
            .context(ReadBytesSnafu {
                subject: "element value",
            })?;
        Ok(bytes)
    }

    /// Read one element after its tag has been consumed.
    fn read_element_body(&mut self, tag: Tag) -> Result<Element> {
        let (vr, length) = if self.ts.explicit_vr() {
            let mut vr_bytes = [0_u8; 2];
            self.cursor.read_exact(&mut vr_bytes).context(ReadBytesSnafu {
                subject: "value representation",
            })?;
            // an unrecognized VR code is read as UN, as required by the
            // standard, which also puts it in the long length form
            let vr = VR::from_binary(vr_bytes).unwrap_or(VR::UN);
            let length = if vr.has_long_length() {
                self.read_u16("reserved header field")?;
                self.read_u32("element length")?
            } else {
                u32::from(self.read_u16("element length")?)
            };
            (vr, length)
        } else {
            (dictionary::vr_of(tag), self.read_u32("element length")?)
        };

        if vr == VR::SQ {
            let items = self.read_items(length)?;
            return Element::new(VR::SQ, Value::Items(items)).context(MismatchSnafu);
        }

        if length == UNDEFINED_LENGTH {
            ensure!(tag == tags::PIXEL_DATA, UnexpectedUndefinedLengthSnafu { tag });
            let fragments = self.read_fragments()?;
            return Element::new(vr, Value::Binary(fragments)).context(MismatchSnafu);
        }

        self.read_primitive(tag, vr, length)
    }

    /// Read the items of a sequence, with either an explicit byte length
    /// or an undefined length terminated by a sequence delimitation item.
    fn read_items(&mut self, length: u32) -> Result<C<Arc<DataSet>>> {
        let mut items = C::new();
        if length == UNDEFINED_LENGTH {
            loop {
                let item_tag = self.read_tag()?;
                let item_length = self.read_u32("item length")?;
                if item_tag == tags::SEQUENCE_DELIMITATION_ITEM {
                    break;
                }
                ensure!(item_tag == tags::ITEM, UnexpectedItemTagSnafu { tag: item_tag });
                items.push(Arc::new(self.read_item(item_length)?));
            }
        } else {
            let end = self.cursor.position() + u64::from(length);
            while self.cursor.position() < end {
                let item_tag = self.read_tag()?;
                let item_length = self.read_u32("item length")?;
                ensure!(item_tag == tags::ITEM, UnexpectedItemTagSnafu { tag: item_tag });
                items.push(Arc::new(self.read_item(item_length)?));
            }
        }
        Ok(items)
    }

    /// Read one sequence item, with either an explicit byte length or an
    /// undefined length terminated by an item delimitation item.
    fn read_item(&mut self, length: u32) -> Result<DataSet> {
        let mut ds = DataSet::with_transfer_syntax(self.ts.uid());
        if length == UNDEFINED_LENGTH {
            loop {
                let tag = self.read_tag()?;
                if tag == tags::ITEM_DELIMITATION_ITEM {
                    self.read_u32("item delimiter length")?;
                    break;
                }
                let element = self.read_element_body(tag)?;
                ds.put_element(tag, element);
            }
        } else {
            let end = self.cursor.position() + u64::from(length);
            ensure!(
                self.remaining() >= u64::from(length),
                UnexpectedEndOfInputSnafu {
                    subject: "sequence item",
                }
            );
            while self.cursor.position() < end {
                let tag = self.read_tag()?;
                let element = self.read_element_body(tag)?;
                ds.put_element(tag, element);
            }
        }
        Ok(ds)
    }

    /// Read the item fragments of an encapsulated pixel data element,
    /// up to and including the sequence delimitation item.
    fn read_fragments(&mut self) -> Result<C<Vec<u8>>> {
        let mut fragments = C::new();
        loop {
            let item_tag = self.read_tag()?;
            let item_length = self.read_u32("fragment length")?;
            if item_tag == tags::SEQUENCE_DELIMITATION_ITEM {
                break;
            }
            ensure!(item_tag == tags::ITEM, UnexpectedItemTagSnafu { tag: item_tag });
            ensure!(
                item_length != UNDEFINED_LENGTH,
                UnexpectedUndefinedLengthSnafu { tag: item_tag }
            );
            fragments.push(self.read_value_bytes(item_length as usize)?);
        }
        Ok(fragments)
    }

    /// Read a primitive (non-sequence) value of a known length
    /// and interpret it according to the value representation.
    fn read_primitive(&mut self, tag: Tag, vr: VR, length: u32) -> Result<Element> {
        ensure!(length % 2 == 0, OddLengthSnafu { tag, length });

        if length == 0 {
            return Ok(Element::empty(vr));
        }

        let bytes = self.read_value_bytes(length as usize)?;
        let endianness = self.ts.endianness();

        let value = match vr.kind() {
            ValueKind::Integers => match vr {
                VR::IS => {
                    let text = self.decode_text(tag, &bytes)?;
                    let mut values = C::new();
                    for part in split_multi(text.trim_matches(' ')) {
                        values.push(
                            part.trim_matches(' ')
                                .parse::<i64>()
                                .context(InvalidIntegerStringSnafu { tag })?,
                        );
                    }
                    Value::Integers(values)
                }
                _ => {
                    let width = vr.width().expect("binary integer VRs have a fixed width");
                    ensure!(
                        bytes.len() % width == 0,
                        UnalignedLengthSnafu { tag, length, width }
                    );
                    let mut source = ByteOrdered::runtime(&bytes[..], endianness);
                    let mut values = C::new();
                    for _ in 0..bytes.len() / width {
                        let v: i64 = match vr {
                            VR::US => source.read_u16().map(i64::from),
                            VR::SS => source.read_i16().map(i64::from),
                            VR::UL => source.read_u32().map(i64::from),
                            VR::SL => source.read_i32().map(i64::from),
                            _ => unreachable!("not a binary integer VR"),
                        }
                        .context(ReadBytesSnafu {
                            subject: "integer value",
                        })?;
                        values.push(v);
                    }
                    Value::Integers(values)
                }
            },
            ValueKind::Reals => match vr {
                VR::DS => {
                    let text = self.decode_text(tag, &bytes)?;
                    let mut values = C::new();
                    for part in split_multi(text.trim_matches(' ')) {
                        values.push(
                            part.trim_matches(' ')
                                .parse::<f64>()
                                .context(InvalidDecimalStringSnafu { tag })?,
                        );
                    }
                    Value::Reals(values)
                }
                VR::FL => {
                    ensure!(
                        bytes.len() % 4 == 0,
                        UnalignedLengthSnafu { tag, length, width: 4_usize }
                    );
                    let mut source = ByteOrdered::runtime(&bytes[..], endianness);
                    let mut values = C::new();
                    for _ in 0..bytes.len() / 4 {
                        values.push(f64::from(source.read_f32().context(ReadBytesSnafu {
                            subject: "real value",
                        })?));
                    }
                    Value::Reals(values)
                }
                _ => {
                    ensure!(
                        bytes.len() % 8 == 0,
                        UnalignedLengthSnafu { tag, length, width: 8_usize }
                    );
                    let mut source = ByteOrdered::runtime(&bytes[..], endianness);
                    let mut values = C::new();
                    for _ in 0..bytes.len() / 8 {
                        values.push(source.read_f64().context(ReadBytesSnafu {
                            subject: "real value",
                        })?);
                    }
                    Value::Reals(values)
                }
            },
            ValueKind::Strings => {
                if vr == VR::AT {
                    ensure!(
                        bytes.len() % 4 == 0,
                        UnalignedLengthSnafu { tag, length, width: 4_usize }
                    );
                    let mut source = ByteOrdered::runtime(&bytes[..], endianness);
                    let mut values = C::new();
                    for _ in 0..bytes.len() / 4 {
                        let group = source.read_u16().context(ReadBytesSnafu {
                            subject: "attribute tag value",
                        })?;
                        let element = source.read_u16().context(ReadBytesSnafu {
                            subject: "attribute tag value",
                        })?;
                        values.push(format!("{:04X}{:04X}", group, element));
                    }
                    Value::Strings(values)
                } else {
                    let text = self.decode_text(tag, &bytes)?;
                    let text = text.trim_end_matches(vr.padding() as char);
                    if text.is_empty() {
                        Value::Strings(C::new())
                    } else {
                        Value::Strings(text.split('\\').map(str::to_string).collect())
                    }
                }
            }
            ValueKind::Binary => Value::Binary(smallvec_one(bytes)),
            ValueKind::Items => unreachable!("sequences are handled before primitive values"),
        };

        Element::new(vr, value).context(MismatchSnafu)
    }

    fn decode_text(&self, tag: Tag, bytes: &[u8]) -> Result<String> {
        self.codec.decode(bytes).context(DecodeTextSnafu { tag })
    }
}

fn smallvec_one<T>(value: T) -> C<T> {
    let mut v = C::new();
    v.push(value);
    v
}

fn split_multi(text: &str) -> impl Iterator<Item = &str> {
    text.split('\\').filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimse_core::uids;

    // (0010,0010) PatientName, explicit VR LE, "Doe^John" padded to 8 chars
    const PATIENT_NAME_EXPLICIT_LE: &[u8] = &[
        0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x08, 0x00, b'D', b'o', b'e', b'^', b'J', b'o', b'h',
        b'n',
    ];

    #[test]
    fn read_simple_explicit_le() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let ds = read_data_set(PATIENT_NAME_EXPLICIT_LE, &ts).unwrap();
        assert_eq!(ds.string(tags::PATIENT_NAME).unwrap(), "Doe^John");
        assert_eq!(ds.transfer_syntax(), uids::EXPLICIT_VR_LITTLE_ENDIAN);
    }

    #[test]
    fn read_trims_padding() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        // "ABC " (space padded CS), then "1.2.3\0" (NUL padded UI)
        let bytes: &[u8] = &[
            0x08, 0x00, 0x60, 0x00, b'C', b'S', 0x04, 0x00, b'A', b'B', b'C', b' ', //
            0x08, 0x00, 0x18, 0x00, b'U', b'I', 0x06, 0x00, b'1', b'.', b'2', b'.', b'3', 0x00,
        ];
        let ds = read_data_set(bytes, &ts).unwrap();
        assert_eq!(ds.string(tags::MODALITY).unwrap(), "ABC");
        assert_eq!(ds.string(tags::SOP_INSTANCE_UID).unwrap(), "1.2.3");
    }

    #[test]
    fn read_multi_valued_strings() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let bytes: &[u8] = &[
            0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x08, 0x00, b'A', b'\\', b'B', b'\\', b'C', b'\\',
            b'D', b' ',
        ];
        let ds = read_data_set(bytes, &ts).unwrap();
        assert_eq!(
            ds.strings(tags::PATIENT_NAME).unwrap().as_slice(),
            &["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()]
        );
    }

    #[test]
    fn read_implicit_resolves_vr_from_dictionary() {
        let ts = TransferSyntax::ImplicitVrLittleEndian;
        // (0028,0010) Rows, length 2, value 512
        let bytes: &[u8] = &[0x28, 0x00, 0x10, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
        let ds = read_data_set(bytes, &ts).unwrap();
        assert_eq!(ds.element(tags::ROWS).unwrap().vr(), VR::US);
        assert_eq!(ds.uint16(tags::ROWS).unwrap(), 512);
    }

    #[test]
    fn read_implicit_unknown_tag_as_un() {
        let ts = TransferSyntax::ImplicitVrLittleEndian;
        let bytes: &[u8] = &[0x99, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD];
        let ds = read_data_set(bytes, &ts).unwrap();
        let element = ds.element(Tag(0x0099, 0x0001)).unwrap();
        assert_eq!(element.vr(), VR::UN);
        assert_eq!(ds.binary(Tag(0x0099, 0x0001)).unwrap()[0], vec![0xAB, 0xCD]);
    }

    #[test]
    fn read_unknown_explicit_vr_as_un() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        // VR "XX" is not in the repertoire: long form is assumed
        let bytes: &[u8] = &[
            0x99, 0x00, 0x01, 0x00, b'X', b'X', 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0xAB, 0xCD,
        ];
        let ds = read_data_set(bytes, &ts).unwrap();
        assert_eq!(ds.element(Tag(0x0099, 0x0001)).unwrap().vr(), VR::UN);
    }

    #[test]
    fn read_explicit_big_endian() {
        let ts = TransferSyntax::ExplicitVrBigEndian;
        let bytes: &[u8] = &[0x00, 0x28, 0x00, 0x10, b'U', b'S', 0x00, 0x02, 0x02, 0x00];
        let ds = read_data_set(bytes, &ts).unwrap();
        assert_eq!(ds.uint16(tags::ROWS).unwrap(), 512);
    }

    #[test]
    fn odd_length_is_an_error() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let bytes: &[u8] = &[0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x03, 0x00, b'D', b'o', b'e'];
        let err = read_data_set(bytes, &ts).unwrap_err();
        assert!(matches!(err, Error::OddLength { length: 3, .. }));
    }

    #[test]
    fn truncated_value_is_an_error() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let bytes: &[u8] = &[0x10, 0x00, 0x10, 0x00, b'P', b'N', 0x08, 0x00, b'D', b'o'];
        let err = read_data_set(bytes, &ts).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn empty_input_is_an_empty_data_set() {
        let ts = TransferSyntax::ImplicitVrLittleEndian;
        let ds = read_data_set(&[], &ts).unwrap();
        assert!(ds.is_empty());
    }

    #[test]
    fn sequence_undefined_and_explicit_lengths_decode_identically() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;

        // (0008,1140) SQ, explicit length 20, one item of explicit length 12
        // containing (0008,1150) UI "1.2" padded
        #[rustfmt::skip]
        let explicit: &[u8] = &[
            0x08, 0x00, 0x40, 0x11, b'S', b'Q', 0x00, 0x00, 0x14, 0x00, 0x00, 0x00,
            0xFE, 0xFF, 0x00, 0xE0, 0x0C, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x50, 0x11, b'U', b'I', 0x04, 0x00, b'1', b'.', b'2', 0x00,
        ];
        // same content, undefined lengths with delimitation items
        #[rustfmt::skip]
        let undefined: &[u8] = &[
            0x08, 0x00, 0x40, 0x11, b'S', b'Q', 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
            0xFE, 0xFF, 0x00, 0xE0, 0xFF, 0xFF, 0xFF, 0xFF,
            0x08, 0x00, 0x50, 0x11, b'U', b'I', 0x04, 0x00, b'1', b'.', b'2', 0x00,
            0xFE, 0xFF, 0x0D, 0xE0, 0x00, 0x00, 0x00, 0x00,
            0xFE, 0xFF, 0xDD, 0xE0, 0x00, 0x00, 0x00, 0x00,
        ];

        let a = read_data_set(explicit, &ts).unwrap();
        let b = read_data_set(undefined, &ts).unwrap();
        assert_eq!(a, b);

        let items = a.items(tags::REFERENCED_IMAGE_SEQUENCE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].string(tags::REFERENCED_SOP_CLASS_UID).unwrap(),
            "1.2"
        );
    }
}
