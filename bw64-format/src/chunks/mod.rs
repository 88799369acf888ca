// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed chunk values and their binary codecs.
//!
//! Every codec decodes a chunk payload (the bytes following the 8-byte chunk header, excluding
//! any pad byte) and encodes a value back into a payload. Codecs know nothing of the container;
//! framing, padding and 64-bit size resolution are the reader's and writer's business.

use bw64_core::errors::Result;
use bw64_core::fourcc::FourCc;
use bw64_core::io::{BufReader, ReadBytes, WriteBytes};

mod chna;
mod ds64;
mod format;
mod unknown;

pub use chna::{AudioId, ChnaChunk};
pub use ds64::DataSize64Chunk;
pub use format::{ExtensibleFormatData, FormatInfoChunk, FormatTag};
pub use format::{SUBTYPE_IEEE_FLOAT, SUBTYPE_PCM};
pub use unknown::UnknownChunk;

/// Top-level id of a plain RIFF file.
pub const RIFF_ID: FourCc = FourCc::new(*b"RIFF");
/// Top-level id of a BW64 file (ITU-R BS.2088).
pub const BW64_ID: FourCc = FourCc::new(*b"BW64");
/// Top-level id of an RF64 file (EBU Tech 3306).
pub const RF64_ID: FourCc = FourCc::new(*b"RF64");
/// The form tag following the top-level header.
pub const WAVE_ID: FourCc = FourCc::new(*b"WAVE");

pub const FMT_ID: FourCc = FourCc::new(*b"fmt ");
pub const DATA_ID: FourCc = FourCc::new(*b"data");
pub const DS64_ID: FourCc = FourCc::new(*b"ds64");
pub const CHNA_ID: FourCc = FourCc::new(*b"chna");
pub const JUNK_ID: FourCc = FourCc::new(*b"JUNK");
pub const AXML_ID: FourCc = FourCc::new(*b"axml");
pub const BEXT_ID: FourCc = FourCc::new(*b"bext");

/// The 32-bit size value declaring that the real size is recorded in the ds64 chunk.
pub const SIZE_SENTINEL: u32 = 0xffff_ffff;

/// Returns true if `size` cannot be stored unambiguously in a 32-bit size field.
#[inline]
pub fn is_oversized(size: u64) -> bool {
    size >= u64::from(SIZE_SENTINEL)
}

/// Common trait implemented by every chunk codec to decode a payload.
pub trait ParseChunk: Sized {
    /// Decode a chunk with identifier `id` and declared payload length `len` from `reader`.
    fn parse<B: ReadBytes>(reader: &mut B, id: FourCc, len: u64) -> Result<Self>;
}

/// Common trait implemented by every chunk codec to encode a payload.
pub trait WriteChunk {
    /// The identifier written in the chunk header.
    fn id(&self) -> FourCc;

    /// Writes the payload, without header or pad byte. Fails without writing if the value
    /// cannot be encoded.
    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()>;
}

/// A decoded chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    Format(FormatInfoChunk),
    Chna(ChnaChunk),
    DataSize64(DataSize64Chunk),
    Unknown(UnknownChunk),
}

impl Chunk {
    /// Decodes a complete payload with the codec `C`.
    pub fn parse_as<C: ParseChunk + Into<Chunk>>(id: FourCc, buf: &[u8]) -> Result<Chunk> {
        let mut reader = BufReader::new(buf);
        Ok(C::parse(&mut reader, id, buf.len() as u64)?.into())
    }

    pub fn id(&self) -> FourCc {
        match self {
            Chunk::Format(chunk) => chunk.id(),
            Chunk::Chna(chunk) => chunk.id(),
            Chunk::DataSize64(chunk) => chunk.id(),
            Chunk::Unknown(chunk) => chunk.id(),
        }
    }

    /// Encodes the payload into a new buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

impl WriteChunk for Chunk {
    fn id(&self) -> FourCc {
        Chunk::id(self)
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        match self {
            Chunk::Format(chunk) => chunk.write(writer),
            Chunk::Chna(chunk) => chunk.write(writer),
            Chunk::DataSize64(chunk) => chunk.write(writer),
            Chunk::Unknown(chunk) => chunk.write(writer),
        }
    }
}

impl From<FormatInfoChunk> for Chunk {
    fn from(chunk: FormatInfoChunk) -> Self {
        Chunk::Format(chunk)
    }
}

impl From<ChnaChunk> for Chunk {
    fn from(chunk: ChnaChunk) -> Self {
        Chunk::Chna(chunk)
    }
}

impl From<DataSize64Chunk> for Chunk {
    fn from(chunk: DataSize64Chunk) -> Self {
        Chunk::DataSize64(chunk)
    }
}

impl From<UnknownChunk> for Chunk {
    fn from(chunk: UnknownChunk) -> Self {
        Chunk::Unknown(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_oversized_threshold() {
        assert!(!is_oversized(0xffff_fffe));
        assert!(is_oversized(0xffff_ffff));
        assert!(is_oversized(5 << 30));
    }

    #[test]
    fn verify_encode_dispatches_by_variant() {
        let chunk = Chunk::from(UnknownChunk::new(AXML_ID, b"<x/>".to_vec()));
        assert_eq!(chunk.id(), AXML_ID);
        assert_eq!(chunk.encode().unwrap(), b"<x/>");
    }
}
