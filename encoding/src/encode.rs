//! Encoding of data sets into their transfer syntax encoded form.

use std::io::Write;

use byteordered::ByteOrdered;
use dimse_core::{tags, DataSet, Element, Tag, ValueKind, VR};
use num_traits::NumCast;
use snafu::{ensure, OptionExt, ResultExt};

use crate::decode::UNDEFINED_LENGTH;
use crate::error::*;
use crate::text::{DefaultCharacterSetCodec, TextCodec};
use crate::transfer_syntax::TransferSyntax;

/// Encode a data set under the given transfer syntax
/// into a freshly allocated buffer.
///
/// An empty data set encodes to zero bytes.
pub fn encode_data_set(ds: &DataSet, ts: &TransferSyntax) -> Result<Vec<u8>> {
    let mut writer = DataSetWriter::new(ts);
    let mut out = Vec::new();
    writer.write_elements(&mut out, ds)?;
    Ok(out)
}

/// Encode a data set under the given transfer syntax
/// into the given writer.
pub fn write_data_set<W: Write>(ds: &DataSet, ts: &TransferSyntax, mut to: W) -> Result<()> {
    let bytes = encode_data_set(ds, ts)?;
    to.write_all(&bytes).context(WriteBytesSnafu {
        subject: "data set",
    })
}

struct DataSetWriter<'a> {
    ts: &'a TransferSyntax,
    codec: DefaultCharacterSetCodec,
    /// data sets on the current encoding path, for cycle rejection
    stack: Vec<*const DataSet>,
}

impl<'a> DataSetWriter<'a> {
    fn new(ts: &'a TransferSyntax) -> Self {
        DataSetWriter {
            ts,
            codec: DefaultCharacterSetCodec,
            stack: Vec::new(),
        }
    }

    fn write_elements(&mut self, out: &mut Vec<u8>, ds: &DataSet) -> Result<()> {
        for (tag, element) in ds {
            self.write_element(out, *tag, element)?;
        }
        Ok(())
    }

    fn write_element(&mut self, out: &mut Vec<u8>, tag: Tag, element: &Element) -> Result<()> {
        let vr = element.vr();

        if vr == VR::SQ {
            return self.write_sequence(out, tag, element);
        }

        if tag == tags::PIXEL_DATA
            && self.ts.encapsulated()
            && element.value().kind() == ValueKind::Binary
        {
            return self.write_encapsulated_pixel_data(out, tag, element);
        }

        let mut bytes = self.primitive_bytes(tag, element)?;
        if bytes.len() % 2 != 0 {
            bytes.push(vr.padding());
        }
        self.write_header(out, tag, vr, bytes.len())?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    /// Write a sequence element with explicit lengths throughout.
    fn write_sequence(&mut self, out: &mut Vec<u8>, tag: Tag, element: &Element) -> Result<()> {
        let items = element.value().items().expect("SQ elements hold items");

        let mut sequence_bytes = Vec::new();
        for item in items {
            let ptr = std::sync::Arc::as_ptr(item);
            ensure!(!self.stack.contains(&ptr), SequenceCycleSnafu { tag });
            self.stack.push(ptr);
            let mut item_bytes = Vec::new();
            self.write_elements(&mut item_bytes, item)?;
            self.stack.pop();

            self.write_tag(&mut sequence_bytes, tags::ITEM)?;
            self.write_u32(&mut sequence_bytes, checked_length(tag, item_bytes.len())?)?;
            sequence_bytes.extend_from_slice(&item_bytes);
        }

        self.write_header(out, tag, VR::SQ, sequence_bytes.len())?;
        out.extend_from_slice(&sequence_bytes);
        Ok(())
    }

    /// Write pixel data as an undefined length element whose items
    /// are the encapsulated fragments.
    fn write_encapsulated_pixel_data(
        &mut self,
        out: &mut Vec<u8>,
        tag: Tag,
        element: &Element,
    ) -> Result<()> {
        let fragments = element.value().binary().expect("checked by value kind");

        self.write_tag(out, tag)?;
        // encapsulated syntaxes are always explicit VR
        out.extend_from_slice(&VR::OB.to_bytes());
        self.write_u16(out, 0)?;
        self.write_u32(out, UNDEFINED_LENGTH)?;

        for fragment in fragments {
            let mut bytes = fragment.clone();
            if bytes.len() % 2 != 0 {
                bytes.push(0x00);
            }
            self.write_tag(out, tags::ITEM)?;
            self.write_u32(out, checked_length(tag, bytes.len())?)?;
            out.extend_from_slice(&bytes);
        }

        self.write_tag(out, tags::SEQUENCE_DELIMITATION_ITEM)?;
        self.write_u32(out, 0)?;
        Ok(())
    }

    /// Produce the unpadded value bytes of a primitive element.
    fn primitive_bytes(&mut self, tag: Tag, element: &Element) -> Result<Vec<u8>> {
        let vr = element.vr();
        let value = element.value();
        let mut bytes = Vec::new();

        match value.kind() {
            ValueKind::Integers => {
                let integers = value.integers().expect("checked by value kind");
                match vr {
                    VR::IS => {
                        let text = integers
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join("\\");
                        bytes.extend_from_slice(text.as_bytes());
                    }
                    _ => {
                        let mut sink = ByteOrdered::runtime(&mut bytes, self.ts.endianness());
                        for v in integers {
                            match vr {
                                VR::US => {
                                    let v: u16 =
                                        NumCast::from(*v).context(ValueOutOfRangeSnafu { tag })?;
                                    sink.write_u16(v)
                                }
                                VR::SS => {
                                    let v: i16 =
                                        NumCast::from(*v).context(ValueOutOfRangeSnafu { tag })?;
                                    sink.write_i16(v)
                                }
                                VR::UL => {
                                    let v: u32 =
                                        NumCast::from(*v).context(ValueOutOfRangeSnafu { tag })?;
                                    sink.write_u32(v)
                                }
                                VR::SL => {
                                    let v: i32 =
                                        NumCast::from(*v).context(ValueOutOfRangeSnafu { tag })?;
                                    sink.write_i32(v)
                                }
                                _ => unreachable!("not a binary integer VR"),
                            }
                            .context(WriteBytesSnafu {
                                subject: "integer value",
                            })?;
                        }
                    }
                }
            }
            ValueKind::Reals => {
                let reals = value.reals().expect("checked by value kind");
                match vr {
                    VR::DS => {
                        let text = reals
                            .iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join("\\");
                        bytes.extend_from_slice(text.as_bytes());
                    }
                    VR::FL => {
                        let mut sink = ByteOrdered::runtime(&mut bytes, self.ts.endianness());
                        for v in reals {
                            sink.write_f32(*v as f32).context(WriteBytesSnafu {
                                subject: "real value",
                            })?;
                        }
                    }
                    _ => {
                        let mut sink = ByteOrdered::runtime(&mut bytes, self.ts.endianness());
                        for v in reals {
                            sink.write_f64(*v).context(WriteBytesSnafu {
                                subject: "real value",
                            })?;
                        }
                    }
                }
            }
            ValueKind::Strings => {
                let strings = value.strings().expect("checked by value kind");
                if vr == VR::AT {
                    let mut sink = ByteOrdered::runtime(&mut bytes, self.ts.endianness());
                    for s in strings {
                        let (group, element) = parse_attribute_tag(s)
                            .context(InvalidAttributeTagSnafu { tag, value: s.clone() })?;
                        sink.write_u16(group)
                            .and_then(|_| sink.write_u16(element))
                            .context(WriteBytesSnafu {
                                subject: "attribute tag value",
                            })?;
                    }
                } else {
                    let text = strings.join("\\");
                    bytes = self
                        .codec
                        .encode(&text)
                        .context(EncodeTextSnafu { tag })?;
                }
            }
            ValueKind::Binary => {
                let buffers = value.binary().expect("checked by value kind");
                match buffers.len() {
                    0 => {}
                    1 => bytes.extend_from_slice(&buffers[0]),
                    n => {
                        return MultipleBinaryBuffersSnafu { tag, count: n }.fail();
                    }
                }
            }
            ValueKind::Items => unreachable!("sequences are handled before primitive values"),
        }

        Ok(bytes)
    }

    /// Write the element header for a value of the given byte length.
    fn write_header(&mut self, out: &mut Vec<u8>, tag: Tag, vr: VR, length: usize) -> Result<()> {
        self.write_tag(out, tag)?;
        let length = checked_length(tag, length)?;
        if self.ts.explicit_vr() {
            out.extend_from_slice(&vr.to_bytes());
            if vr.has_long_length() {
                self.write_u16(out, 0)?;
                self.write_u32(out, length)?;
            } else {
                let short: u16 = NumCast::from(length).context(ValueTooLongSnafu {
                    tag,
                    length: length as usize,
                })?;
                self.write_u16(out, short)?;
            }
        } else {
            self.write_u32(out, length)?;
        }
        Ok(())
    }

    fn write_tag(&mut self, out: &mut Vec<u8>, tag: Tag) -> Result<()> {
        self.write_u16(out, tag.group())?;
        self.write_u16(out, tag.element())
    }

    fn write_u16(&mut self, out: &mut Vec<u8>, value: u16) -> Result<()> {
        ByteOrdered::runtime(out, self.ts.endianness())
            .write_u16(value)
            .context(WriteBytesSnafu {
                subject: "element header",
            })
    }

    fn write_u32(&mut self, out: &mut Vec<u8>, value: u32) -> Result<()> {
        ByteOrdered::runtime(out, self.ts.endianness())
            .write_u32(value)
            .context(WriteBytesSnafu {
                subject: "element header",
            })
    }
}

fn checked_length(tag: Tag, length: usize) -> Result<u32> {
    ensure!(
        length < UNDEFINED_LENGTH as usize,
        ValueTooLongSnafu { tag, length }
    );
    Ok(length as u32)
}

fn parse_attribute_tag(s: &str) -> Option<(u16, u16)> {
    if s.len() != 8 {
        return None;
    }
    let group = u16::from_str_radix(&s[..4], 16).ok()?;
    let element = u16::from_str_radix(&s[4..], 16).ok()?;
    Some((group, element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::read_data_set;
    use dimse_core::{uids, Value};
    use std::sync::Arc;

    fn native_syntaxes() -> [TransferSyntax; 3] {
        [
            TransferSyntax::ImplicitVrLittleEndian,
            TransferSyntax::ExplicitVrLittleEndian,
            TransferSyntax::ExplicitVrBigEndian,
        ]
    }

    fn sample(ts: &TransferSyntax) -> DataSet {
        let mut item = DataSet::with_transfer_syntax(ts.uid());
        item.put(tags::REFERENCED_SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE)
            .unwrap();
        item.put(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "1.2.3.4")
            .unwrap();

        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        ds.put(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE)
            .unwrap();
        ds.put(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3.4").unwrap();
        ds.put(tags::MODALITY, VR::CS, "CT").unwrap();
        ds.put(tags::PATIENT_NAME, VR::PN, "Doe^John").unwrap();
        ds.put(
            tags::PATIENT_ID,
            VR::LO,
            ["1234", "5678"].into_iter().collect::<Value>(),
        )
        .unwrap();
        ds.put(tags::SERIES_NUMBER, VR::IS, 7_i64).unwrap();
        ds.put(tags::INSTANCE_NUMBER, VR::IS, -13_i64).unwrap();
        ds.put(tags::ROWS, VR::US, 512_u16).unwrap();
        ds.put(
            tags::COLUMNS,
            VR::US,
            [515_i64, 516].into_iter().collect::<Value>(),
        )
        .unwrap();
        ds.put(tags::REFERENCED_IMAGE_SEQUENCE, VR::SQ, item).unwrap();
        ds.put(
            tags::PIXEL_DATA,
            VR::OW,
            (0..32).collect::<Vec<u8>>(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn empty_data_set_encodes_to_zero_bytes() {
        for ts in native_syntaxes() {
            let ds = DataSet::with_transfer_syntax(ts.uid());
            assert_eq!(encode_data_set(&ds, &ts).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn round_trip_all_native_syntaxes() {
        for ts in native_syntaxes() {
            let ds = sample(&ts);
            let bytes = encode_data_set(&ds, &ts).unwrap();
            let back = read_data_set(&bytes, &ts).unwrap();
            assert_eq!(back, ds, "round trip failed under {}", ts);
        }
    }

    #[test]
    fn round_trip_preserves_value_count_and_order() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        ds.put(
            tags::PATIENT_ID,
            VR::LO,
            ["z", "a", "m"].into_iter().collect::<Value>(),
        )
        .unwrap();
        ds.put(
            tags::COLUMNS,
            VR::US,
            [3_i64, 1, 2].into_iter().collect::<Value>(),
        )
        .unwrap();

        let back = read_data_set(&encode_data_set(&ds, &ts).unwrap(), &ts).unwrap();
        assert_eq!(
            back.strings(tags::PATIENT_ID).unwrap().as_slice(),
            &["z".to_string(), "a".to_string(), "m".to_string()]
        );
        assert_eq!(back.ints(tags::COLUMNS).unwrap().as_slice(), &[3, 1, 2]);
    }

    #[test]
    fn odd_values_are_padded_and_trimmed_back() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        // 3 characters: padded with a space on the wire
        ds.put(tags::MODALITY, VR::CS, "OCT").unwrap();
        // 5 characters: UID padded with NUL on the wire
        ds.put(tags::SOP_INSTANCE_UID, VR::UI, "1.2.3").unwrap();

        let bytes = encode_data_set(&ds, &ts).unwrap();
        assert_eq!(bytes.len() % 2, 0);
        // ascending tag order: (0008,0018) first, then (0008,0060)
        assert_eq!(&bytes[8..14], b"1.2.3\0");
        assert_eq!(&bytes[22..26], b"OCT ");

        let back = read_data_set(&bytes, &ts).unwrap();
        assert_eq!(back.string(tags::MODALITY).unwrap(), "OCT");
        assert_eq!(back.string(tags::SOP_INSTANCE_UID).unwrap(), "1.2.3");
    }

    #[test]
    fn empty_elements_round_trip() {
        for ts in native_syntaxes() {
            let mut ds = DataSet::with_transfer_syntax(ts.uid());
            ds.put_empty(tags::PATIENT_NAME, VR::PN);
            ds.put_empty(tags::REFERENCED_IMAGE_SEQUENCE, VR::SQ);
            let back = read_data_set(&encode_data_set(&ds, &ts).unwrap(), &ts).unwrap();
            assert!(back.element(tags::PATIENT_NAME).unwrap().is_empty());
            assert!(back
                .items(tags::REFERENCED_IMAGE_SEQUENCE)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn encapsulated_pixel_data_round_trip() {
        let ts = TransferSyntax::from_uid(uids::JPEG_BASELINE_8_BIT).unwrap();
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        let fragments: Value = [
            Vec::new(),
            vec![0xDE, 0xAD, 0xBE, 0xEF],
            vec![0x01, 0x02],
        ]
        .into_iter()
        .collect();
        ds.put(tags::PIXEL_DATA, VR::OB, fragments).unwrap();

        let bytes = encode_data_set(&ds, &ts).unwrap();
        let back = read_data_set(&bytes, &ts).unwrap();
        let buffers = back.binary(tags::PIXEL_DATA).unwrap();
        assert_eq!(buffers.len(), 3);
        assert_eq!(buffers[0], Vec::<u8>::new());
        assert_eq!(buffers[1], vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(buffers[2], vec![0x01, 0x02]);
    }

    #[test]
    fn multiple_buffers_in_native_form_are_rejected() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        let fragments: Value = [vec![0x00, 0x01], vec![0x02, 0x03]].into_iter().collect();
        ds.put(tags::PIXEL_DATA, VR::OW, fragments).unwrap();
        let err = encode_data_set(&ds, &ts).unwrap_err();
        assert!(matches!(err, Error::MultipleBinaryBuffers { count: 2, .. }));
    }

    #[test]
    fn shared_items_encode_without_cycles() {
        let ts = TransferSyntax::ExplicitVrLittleEndian;
        let mut item = DataSet::with_transfer_syntax(ts.uid());
        item.put(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, "1.2")
            .unwrap();
        let item = Arc::new(item);

        // the same item twice in the same sequence is sharing, not a cycle
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        ds.put(
            tags::REFERENCED_IMAGE_SEQUENCE,
            VR::SQ,
            [Arc::clone(&item), item].into_iter().collect::<Value>(),
        )
        .unwrap();

        let back = read_data_set(&encode_data_set(&ds, &ts).unwrap(), &ts).unwrap();
        assert_eq!(back.items(tags::REFERENCED_IMAGE_SEQUENCE).unwrap().len(), 2);
    }

    #[test]
    fn reals_and_attribute_tags_round_trip() {
        let ts = TransferSyntax::ExplicitVrBigEndian;
        let mut ds = DataSet::with_transfer_syntax(ts.uid());
        ds.put(
            Tag(0x0018, 0x1041),
            VR::DS,
            [1.5_f64, -0.25].into_iter().collect::<Value>(),
        )
        .unwrap();
        ds.put(tags::OFFENDING_ELEMENT, VR::AT, "00100010").unwrap();

        let back = read_data_set(&encode_data_set(&ds, &ts).unwrap(), &ts).unwrap();
        assert_eq!(
            back.reals(Tag(0x0018, 0x1041)).unwrap().as_slice(),
            &[1.5, -0.25]
        );
        assert_eq!(back.string(tags::OFFENDING_ELEMENT).unwrap(), "00100010");
    }
}
