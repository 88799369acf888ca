// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use super::ReadBytes;

/// A `BufReader` reads little-endian fields out of a chunk payload that is already in memory.
///
/// A failed read never advances the reader.
pub struct BufReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufReader<'a> {
    /// Instantiate a new `BufReader` over `buf`, positioned at its first byte.
    pub fn new(buf: &'a [u8]) -> Self {
        BufReader { buf, pos: 0 }
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrows the next `len` bytes of the underlying buffer and steps over them.
    pub fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "chunk payload underrun"));
        }

        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    /// Borrows everything that has not been read yet, leaving the reader at the end.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

impl ReadBytes for BufReader<'_> {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        buf.copy_from_slice(self.take(buf.len())?);
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        // A count beyond usize can never fit in the buffer anyway.
        let len = usize::try_from(count).unwrap_or(usize::MAX);
        self.take(len).map(|_| ())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.pos as u64
    }
}
