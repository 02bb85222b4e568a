//! P-Data fragmentation support.

use std::io::Write;

use crate::pdu::{PDataValueType, PDU_HEADER_SIZE};

/// Length of the PDV item header: 4-byte length, context id
/// and message control header.
const PDV_HEADER_SIZE: u32 = 6;

/// A P-Data value writer.
///
/// This exposes an API to iteratively construct and send one DIMSE
/// command or data set to another node. Using this as a
/// [standard writer](std::io::Write) automatically splits the incoming
/// bytes into separate PDUs if they do not fit in a single one,
/// honoring the peer's maximum PDU length. The last fragment is
/// flagged once [`finish`](Self::finish) is called (or the writer is
/// dropped).
#[must_use]
pub struct PDataWriter<W: Write> {
    buffer: Vec<u8>,
    stream: W,
    max_data_len: u32,
}

impl<W> PDataWriter<W>
where
    W: Write,
{
    /// Construct a new P-Data value writer.
    ///
    /// `max_pdu_length` is the maximum value of the PDU-length property
    /// admitted by the peer.
    pub(crate) fn new(
        stream: W,
        presentation_context_id: u8,
        value_type: PDataValueType,
        max_pdu_length: u32,
    ) -> Self {
        let max_data_length = max_pdu_length - PDV_HEADER_SIZE;
        let mut buffer = Vec::with_capacity((max_data_length + PDU_HEADER_SIZE) as usize);
        // initial buffer set up; lengths are patched per PDU
        buffer.extend(&[
            // PDU-type + reserved byte
            0x04,
            0x00,
            // full PDU length, unknown at this point
            0xFF,
            0xFF,
            0xFF,
            0xFF,
            // PDV item length, unknown at this point
            0xFF,
            0xFF,
            0xFF,
            0xFF,
            // presentation context id
            presentation_context_id,
            // message control header, unknown at this point
            match value_type {
                PDataValueType::Command => 0x01,
                PDataValueType::Data => 0x00,
            },
        ]);

        PDataWriter {
            stream,
            max_data_len: max_data_length,
            buffer,
        }
    }

    /// Declare to have finished sending P-Data fragments,
    /// thus emitting the last P-Data fragment PDU.
    ///
    /// This is also done automatically once the P-Data writer is dropped.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.finish_impl()
    }

    /// Patch the PDU and PDV lengths and the last-fragment flag
    /// into the staging buffer.
    fn setup_pdata_header(&mut self, is_last: bool) {
        let data_len = (self.buffer.len() - 12) as u32;

        // full PDU length (minus PDU type and reserved byte)
        let pdu_len = data_len + PDV_HEADER_SIZE;
        let pdu_len_bytes = pdu_len.to_be_bytes();
        self.buffer[2..6].copy_from_slice(&pdu_len_bytes);

        // PDV item length (data plus context id and control header)
        let pdv_len_bytes = (data_len + 2).to_be_bytes();
        self.buffer[6..10].copy_from_slice(&pdv_len_bytes);

        // message control header: keep the command bit, set the last bit
        if is_last {
            self.buffer[11] |= 0x02;
        } else {
            self.buffer[11] &= !0x02;
        }
    }

    fn finish_impl(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            // send the last, possibly half full PDU
            self.setup_pdata_header(true);
            self.stream.write_all(&self.buffer[..])?;
            // subsequent calls to `finish_impl` send nothing more
            self.buffer.clear();
        }
        Ok(())
    }

    /// Send the current buffer content as one full PDU.
    fn dispatch_pdu(&mut self) -> std::io::Result<()> {
        debug_assert!(self.buffer.len() >= 12);
        self.setup_pdata_header(false);
        self.stream.write_all(&self.buffer)?;

        // back to just the header
        self.buffer.truncate(12);

        Ok(())
    }
}

impl<W> Write for PDataWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let total_len = self.max_data_len as usize + 12;
        if self.buffer.len() + buf.len() <= total_len {
            // accumulate into the buffer, send nothing yet
            self.buffer.extend(buf);
            Ok(buf.len())
        } else {
            // fill the rest of the buffer, send the PDU,
            // and leave the rest for subsequent writes
            let buf = &buf[..total_len - self.buffer.len()];
            self.buffer.extend(buf);
            debug_assert_eq!(self.buffer.len(), total_len);
            self.dispatch_pdu()?;
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // nothing to do: partial fragments stay buffered
        // until there is enough data for a full PDU
        Ok(())
    }
}

/// With the P-Data writer dropped, this `Drop` implementation
/// will construct and emit the last P-Data fragment PDU
/// if there is any data left to send.
impl<W> Drop for PDataWriter<W>
where
    W: Write,
{
    fn drop(&mut self) {
        let _ = self.finish_impl();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::PDataWriter;
    use crate::pdu::{read_pdu, PDataValueType, Pdu, MINIMUM_PDU_SIZE};

    const PDV_HEADER_SIZE: usize = 6;

    fn read_all_pdus(mut bytes: &[u8]) -> Vec<Pdu> {
        let mut pdus = Vec::new();
        loop {
            let mut cursor = Cursor::new(bytes);
            match read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap() {
                Some(pdu) => {
                    bytes = &bytes[cursor.position() as usize..];
                    pdus.push(pdu);
                }
                None => {
                    assert!(bytes.is_empty(), "leftover bytes which are not a PDU");
                    return pdus;
                }
            }
        }
    }

    #[test]
    fn write_pdata_and_finish() {
        let presentation_context_id = 12;

        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(
                &mut buf,
                presentation_context_id,
                PDataValueType::Data,
                MINIMUM_PDU_SIZE,
            );
            writer.write_all(&(0..64).collect::<Vec<u8>>()).unwrap();
            writer.finish().unwrap();
        }

        let pdus = read_all_pdus(&buf);
        assert_eq!(pdus.len(), 1);
        match &pdus[0] {
            Pdu::PData { data } => {
                assert_eq!(data.len(), 1);
                let pdv = &data[0];
                assert_eq!(pdv.value_type, PDataValueType::Data);
                assert!(pdv.is_last);
                assert_eq!(pdv.presentation_context_id, presentation_context_id);
                assert_eq!(pdv.data, (0..64).collect::<Vec<u8>>());
            }
            pdu => panic!("expected P-Data, got {:?}", pdu),
        }
    }

    #[test]
    fn command_fragments_carry_the_command_bit() {
        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(&mut buf, 1, PDataValueType::Command, MINIMUM_PDU_SIZE);
            writer.write_all(&[0x55; 32]).unwrap();
            writer.finish().unwrap();
        }

        let pdus = read_all_pdus(&buf);
        assert_eq!(pdus.len(), 1);
        match &pdus[0] {
            Pdu::PData { data } => {
                assert_eq!(data[0].value_type, PDataValueType::Command);
                assert!(data[0].is_last);
            }
            pdu => panic!("expected P-Data, got {:?}", pdu),
        }
    }

    #[test]
    fn large_pdata_is_split_into_multiple_pdus() {
        let my_data: Vec<_> = (0..9000_u32).map(|x| x as u8).collect();

        let mut buf = Vec::new();
        {
            let mut writer = PDataWriter::new(&mut buf, 32, PDataValueType::Data, MINIMUM_PDU_SIZE);
            writer.write_all(&my_data).unwrap();
            writer.finish().unwrap();
        }

        let pdus = read_all_pdus(&buf);
        assert_eq!(pdus.len(), 3);

        let full_fragment_len = MINIMUM_PDU_SIZE as usize - PDV_HEADER_SIZE;
        let mut all_data = Vec::new();
        for (i, pdu) in pdus.iter().enumerate() {
            match pdu {
                Pdu::PData { data } => {
                    assert_eq!(data.len(), 1);
                    let pdv = &data[0];
                    assert_eq!(pdv.presentation_context_id, 32);
                    assert_eq!(pdv.is_last, i == pdus.len() - 1);
                    if !pdv.is_last {
                        assert_eq!(pdv.data.len(), full_fragment_len);
                    }
                    all_data.extend_from_slice(&pdv.data);
                }
                pdu => panic!("expected P-Data, got {:?}", pdu),
            }
        }
        assert_eq!(all_data, my_data);
    }

    #[test]
    fn boundary_payload_fits_in_one_pdu() {
        // a payload of exactly (max - PDV header) bytes takes one PDU,
        // one more byte takes two
        for (payload_len, expected_pdus) in [
            (MINIMUM_PDU_SIZE as usize - PDV_HEADER_SIZE, 1),
            (MINIMUM_PDU_SIZE as usize - PDV_HEADER_SIZE + 1, 2),
        ] {
            let mut buf = Vec::new();
            {
                let mut writer =
                    PDataWriter::new(&mut buf, 1, PDataValueType::Data, MINIMUM_PDU_SIZE);
                writer.write_all(&vec![0_u8; payload_len]).unwrap();
                writer.finish().unwrap();
            }
            let pdus = read_all_pdus(&buf);
            assert_eq!(
                pdus.len(),
                expected_pdus,
                "payload of {} bytes should take {} PDU(s)",
                payload_len,
                expected_pdus
            );
            // no emitted PDU may exceed the maximum length
            match &pdus[0] {
                Pdu::PData { data } => {
                    assert!(
                        data[0].data.len() + PDV_HEADER_SIZE <= MINIMUM_PDU_SIZE as usize
                    );
                }
                pdu => panic!("expected P-Data, got {:?}", pdu),
            }
        }
    }
}
