// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bw64_core::errors::{size_error, structural_error, Result};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{ReadBytes, WriteBytes};

use log::warn;
use smallvec::SmallVec;

use super::{ParseChunk, WriteChunk, DS64_ID};

/// The encoded length of the fixed part: three 64-bit sizes and the 32-bit table length.
pub(crate) const DS64_BASE_LEN: u64 = 28;
/// The encoded length of one table row: an id and a 64-bit size.
pub(crate) const DS64_ROW_LEN: u64 = 12;

/// The `ds64` chunk: 64-bit sizes for the container, the data chunk, and any other chunk whose
/// size does not fit its 32-bit header field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSize64Chunk {
    bw64_size: u64,
    data_size: u64,
    dummy_size: u64,
    table: SmallVec<[(FourCc, u64); 2]>,
}

impl DataSize64Chunk {
    pub fn new(bw64_size: u64, data_size: u64) -> Self {
        DataSize64Chunk { bw64_size, data_size, ..Default::default() }
    }

    /// The size of the top-level container, excluding its 8-byte header.
    pub fn bw64_size(&self) -> u64 {
        self.bw64_size
    }

    /// The size of the data chunk payload.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Reserved. Normally 0.
    pub fn dummy_size(&self) -> u64 {
        self.dummy_size
    }

    pub fn set_bw64_size(&mut self, size: u64) {
        self.bw64_size = size;
    }

    pub fn set_data_size(&mut self, size: u64) {
        self.data_size = size;
    }

    /// Gets the size recorded for the chunk `id`, or `None` if the chunk is not tracked, in which
    /// case its own header field holds the real size.
    pub fn chunk_size(&self, id: FourCc) -> Option<u64> {
        self.table.iter().find(|(row_id, _)| *row_id == id).map(|&(_, size)| size)
    }

    /// Records the size of the chunk `id`, replacing any size already recorded for it.
    pub fn set_chunk_size(&mut self, id: FourCc, size: u64) {
        match self.table.iter_mut().find(|(row_id, _)| *row_id == id) {
            Some(row) => row.1 = size,
            None => self.table.push((id, size)),
        }
    }

    /// The number of table rows.
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// The table rows, in insertion order.
    pub fn table(&self) -> &[(FourCc, u64)] {
        &self.table
    }

    /// The encoded payload length.
    pub fn payload_len(&self) -> u64 {
        Self::payload_len_for_rows(self.table.len())
    }

    /// The payload length of a ds64 chunk with `rows` table rows.
    pub fn payload_len_for_rows(rows: usize) -> u64 {
        DS64_BASE_LEN + DS64_ROW_LEN * rows as u64
    }
}

impl ParseChunk for DataSize64Chunk {
    fn parse<B: ReadBytes>(reader: &mut B, id: FourCc, len: u64) -> Result<Self> {
        if id != DS64_ID {
            return structural_error(format!("expected a ds64 chunk, found '{}'", id));
        }

        if len < DS64_BASE_LEN || (len - DS64_BASE_LEN) % DS64_ROW_LEN != 0 {
            return size_error(format!("ds64 chunk size {} is not 28 + 12 * tableLength", len));
        }

        let rows = (len - DS64_BASE_LEN) / DS64_ROW_LEN;

        let bw64_size = reader.read_u64()?;
        let data_size = reader.read_u64()?;
        let dummy_size = reader.read_u64()?;
        let table_len = reader.read_u32()?;

        if u64::from(table_len) != rows {
            return size_error(format!(
                "ds64 tableLength is {} but the chunk holds {} rows",
                table_len, rows
            ));
        }

        let mut chunk =
            DataSize64Chunk { bw64_size, data_size, dummy_size, table: SmallVec::new() };

        for _ in 0..rows {
            let row_id = FourCc::new(reader.read_quad_bytes()?);
            let size = reader.read_u64()?;

            if chunk.chunk_size(row_id).is_some() {
                warn!("ds64 table lists '{}' more than once, keeping the last size", row_id);
            }

            chunk.set_chunk_size(row_id, size);
        }

        Ok(chunk)
    }
}

impl WriteChunk for DataSize64Chunk {
    fn id(&self) -> FourCc {
        DS64_ID
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64(self.bw64_size)?;
        writer.write_u64(self.data_size)?;
        writer.write_u64(self.dummy_size)?;
        // The row count is bounded by the 32-bit header size field.
        writer.write_u32(self.table.len() as u32)?;

        for (id, size) in &self.table {
            writer.write_quad_bytes(id.get())?;
            writer.write_u64(*size)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bw64_core::errors::Error;
    use bw64_core::io::BufReader;

    use super::*;
    use crate::chunks::{Chunk, AXML_ID, BEXT_ID};

    #[rustfmt::skip]
    const EXAMPLE: [u8; 40] = [
        0x9a, 0xc6, 0x22, 0x31, 0xa5, 0x00, 0x00, 0x00, // bw64Size = 709493966490
        0xa4, 0x25, 0x87, 0xcc, 0x86, 0x00, 0x00, 0x00, // dataSize = 578957026724
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // dummySize = 0
        0x01, 0x00, 0x00, 0x00,                         // tableLength = 1
        b'a', b'x', b'm', b'l',                         // id = axml
        0x30, 0x5a, 0xc8, 0x00, 0x00, 0x00, 0x00, 0x00, // size = 13130288
    ];

    fn parse(buf: &[u8]) -> Result<DataSize64Chunk> {
        DataSize64Chunk::parse(&mut BufReader::new(buf), DS64_ID, buf.len() as u64)
    }

    #[test]
    fn verify_parse() {
        let chunk = parse(&EXAMPLE).unwrap();
        assert_eq!(chunk.bw64_size(), 709_493_966_490);
        assert_eq!(chunk.data_size(), 578_957_026_724);
        assert_eq!(chunk.dummy_size(), 0);
        assert_eq!(chunk.table_len(), 1);
        assert_eq!(chunk.chunk_size(AXML_ID), Some(13_130_288));
        assert_eq!(chunk.chunk_size(BEXT_ID), None);
    }

    #[test]
    fn verify_round_trip() {
        let mut chunk = DataSize64Chunk::new(987_654_321, 123_456_789);
        chunk.set_chunk_size(AXML_ID, 654_321);

        let encoded = Chunk::DataSize64(chunk.clone()).encode().unwrap();
        assert_eq!(encoded.len(), 40);
        assert_eq!(encoded.len() as u64, chunk.payload_len());

        let decoded = parse(&encoded).unwrap();
        assert_eq!(decoded.bw64_size(), 987_654_321);
        assert_eq!(decoded.data_size(), 123_456_789);
        assert_eq!(decoded.table_len(), 1);
        assert_eq!(decoded.chunk_size(AXML_ID), Some(654_321));
    }

    #[test]
    fn verify_duplicate_rows_keep_last_size() {
        let mut buf = EXAMPLE.to_vec();
        buf[24] = 2;
        buf.extend_from_slice(b"axml");
        buf.extend_from_slice(&7u64.to_le_bytes());

        let chunk = parse(&buf).unwrap();
        assert_eq!(chunk.table_len(), 1);
        assert_eq!(chunk.chunk_size(AXML_ID), Some(7));
    }

    #[test]
    fn verify_parse_rejects_bad_chunks() {
        let result = DataSize64Chunk::parse(
            &mut BufReader::new(&EXAMPLE[..8]),
            FourCc::new(*b"ds65"),
            8,
        );
        assert!(matches!(result, Err(Error::StructuralMismatch(_))));

        assert!(matches!(parse(&EXAMPLE[..8]), Err(Error::SizeMismatch(_))));
        assert!(matches!(parse(&EXAMPLE[..36]), Err(Error::SizeMismatch(_))));

        // tableLength disagrees with the declared size.
        let mut buf = EXAMPLE;
        buf[24] = 3;
        assert!(matches!(parse(&buf), Err(Error::SizeMismatch(_))));

        // Declared size promises more bytes than are available.
        let result = DataSize64Chunk::parse(&mut BufReader::new(&EXAMPLE[..30]), DS64_ID, 40);
        assert!(matches!(result, Err(Error::TruncatedStream(_))));
    }
}
