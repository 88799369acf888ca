// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use crate::errors::{seek_error, Result, SeekErrorKind};

use super::{MediaSink, WriteBytes};

/// A `SinkStream` is the common `Write`r type for the container writer. It tracks the absolute
/// write position so that chunk headers may be back-patched, and refuses to seek when the inner
/// sink cannot.
pub struct SinkStream<W: MediaSink> {
    inner: W,
    pos: u64,
    seekable: bool,
}

impl<W: MediaSink> SinkStream<W> {
    pub fn new(sink: W) -> Self {
        let seekable = sink.is_seekable();
        SinkStream { inner: sink, pos: 0, seekable }
    }

    /// Returns if the inner sink is seekable.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Seeks to the absolute byte position `pos`.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        if !self.seekable {
            return seek_error(SeekErrorKind::Unseekable);
        }

        self.pos = self.inner.seek(io::SeekFrom::Start(pos))?;
        Ok(self.pos)
    }

    /// Flushes the inner sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Gets a reference to the inner sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwraps the `SinkStream`, returning the inner sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: MediaSink> WriteBytes for SinkStream<W> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_buf(&[byte])
    }

    fn write_buf(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.pos
    }
}
