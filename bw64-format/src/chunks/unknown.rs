// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bw64_core::errors::{limit_error, Result};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{ReadBytes, WriteBytes};

use super::{ParseChunk, WriteChunk};

/// A chunk that is carried as opaque bytes, e.g. `axml`, `bext` or `JUNK`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownChunk {
    id: FourCc,
    data: Vec<u8>,
}

impl UnknownChunk {
    pub fn new(id: FourCc, data: Vec<u8>) -> Self {
        UnknownChunk { id, data }
    }

    /// The payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn payload_len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl ParseChunk for UnknownChunk {
    fn parse<B: ReadBytes>(reader: &mut B, id: FourCc, len: u64) -> Result<Self> {
        let Ok(len) = usize::try_from(len)
        else {
            return limit_error("chunk does not fit in memory");
        };

        let data = reader.read_boxed_slice_exact(len)?.into_vec();

        Ok(UnknownChunk { id, data })
    }
}

impl WriteChunk for UnknownChunk {
    fn id(&self) -> FourCc {
        self.id
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_buf(&self.data)?;
        Ok(())
    }
}
