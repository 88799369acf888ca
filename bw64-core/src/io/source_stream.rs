// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek};

use super::{MediaSource, ReadBytes};

const END_OF_STREAM_ERROR_STR: &str = "end of stream";

/// `SourceStreamOptions` specifies the buffering behaviour of a `SourceStream`.
pub struct SourceStreamOptions {
    /// The read-ahead buffer length. Must be > 0.
    pub buffer_len: usize,
}

impl Default for SourceStreamOptions {
    fn default() -> Self {
        SourceStreamOptions { buffer_len: 32 * 1024 }
    }
}

/// A `SourceStream` is the common `Read`er type for the container reader. By using type erasure
/// and dynamic dispatch, `SourceStream` wraps and hides the inner reader from the consumer,
/// allowing any typical `Read`er to be used in a generic way, selectable at runtime.
///
/// To amortize system call and dynamic dispatch overhead over many bytes, `SourceStream` reads
/// ahead into a fixed-length buffer. Reads larger than the buffer bypass it. A seek that lands
/// inside the buffered region does not touch the inner source.
pub struct SourceStream<'s> {
    inner: Box<dyn MediaSource + 's>,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The read position within the buffer.
    read_pos: usize,
    /// The end of the valid data within the buffer.
    end_pos: usize,
    /// Offset of the inner source, which is past the end of the buffered bytes.
    abs_pos: u64,
    /// Cached seekability of the inner stream.
    seekable: bool,
}

impl<'s> SourceStream<'s> {
    pub fn new(source: Box<dyn MediaSource + 's>, options: SourceStreamOptions) -> Self {
        assert!(options.buffer_len > 0);

        let seekable = source.is_seekable();

        SourceStream {
            inner: source,
            buf: vec![0; options.buffer_len].into_boxed_slice(),
            read_pos: 0,
            end_pos: 0,
            abs_pos: 0,
            seekable,
        }
    }

    /// Returns if the inner source is seekable.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Returns the length in bytes of the inner source, if available.
    pub fn byte_len(&self) -> Option<u64> {
        self.inner.byte_len()
    }

    /// Bytes sitting in the read-ahead buffer that have not been consumed.
    pub fn unread_buffer_len(&self) -> usize {
        self.end_pos - self.read_pos
    }

    /// Convert the `SourceStream` to the inner source.
    pub fn into_inner(self) -> Box<dyn MediaSource + 's> {
        self.inner
    }

    #[inline(always)]
    fn is_buffer_exhausted(&self) -> bool {
        self.read_pos == self.end_pos
    }

    /// Refills the read-ahead buffer once everything in it has been consumed.
    fn fetch(&mut self) -> io::Result<()> {
        if self.is_buffer_exhausted() {
            let read_len = loop {
                match self.inner.read(&mut self.buf) {
                    Ok(len) => break len,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            };

            self.read_pos = 0;
            self.end_pos = read_len;
            self.abs_pos += read_len as u64;
        }

        Ok(())
    }

    /// As `fetch`, but an empty refill is an end-of-stream error.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        self.fetch()?;

        if self.is_buffer_exhausted() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
        }

        Ok(())
    }

    /// Drops the buffered bytes. The inner source is now at `pos`.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.end_pos = 0;
        self.abs_pos = pos;
    }
}

impl io::Read for SourceStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Large reads with an empty buffer go straight to the inner source.
        if self.is_buffer_exhausted() && buf.len() >= self.buf.len() {
            let len = self.inner.read(buf)?;
            self.reset(self.abs_pos + len as u64);
            return Ok(len);
        }

        self.fetch()?;

        let len = cmp::min(self.unread_buffer_len(), buf.len());
        buf[..len].copy_from_slice(&self.buf[self.read_pos..self.read_pos + len]);
        self.read_pos += len;

        Ok(len)
    }
}

impl io::Seek for SourceStream<'_> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(target) => Some(target),
            io::SeekFrom::Current(delta) => self.pos().checked_add_signed(delta),
            io::SeekFrom::End(_) => None,
        };

        // Seek within the buffered data if possible.
        if let Some(target) = target {
            let buf_start = self.abs_pos - self.end_pos as u64;

            if target >= buf_start && target <= self.abs_pos {
                self.read_pos = (target - buf_start) as usize;
                return Ok(target);
            }
        }

        let new_pos = match target {
            Some(target) => self.inner.seek(io::SeekFrom::Start(target))?,
            None => self.inner.seek(pos)?,
        };

        self.reset(new_pos);

        Ok(new_pos)
    }
}

impl ReadBytes for SourceStream<'_> {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.is_buffer_exhausted() {
            self.fetch_or_eof()?;
        }

        let value = self.buf[self.read_pos];
        self.read_pos += 1;

        Ok(value)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        // read_exact retries interrupted reads and reports a short stream as UnexpectedEof.
        self.read_exact(buf)
    }

    fn ignore_bytes(&mut self, mut count: u64) -> io::Result<()> {
        // Skip over whatever is already buffered.
        let buffered = cmp::min(self.unread_buffer_len() as u64, count);
        self.read_pos += buffered as usize;
        count -= buffered;

        // If the stream is seekable, seek over the remainder instead of reading it.
        if count > 0 && self.seekable {
            let target = self
                .pos()
                .checked_add(count)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek overflow"))?;
            self.seek(io::SeekFrom::Start(target))?;
            return Ok(());
        }

        while count > 0 {
            self.fetch_or_eof()?;
            let discard_count = cmp::min(self.unread_buffer_len() as u64, count);
            self.read_pos += discard_count as usize;
            count -= discard_count;
        }

        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.abs_pos - self.unread_buffer_len() as u64
    }
}
