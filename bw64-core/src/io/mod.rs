// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements the byte-level plumbing shared by the container reader and
//! writer.
//!
//! Two kinds of endpoints exist:
//!  * Streams wrap an external byte source ([`MediaSource`]) or byte sink ([`MediaSink`]) and
//!    track their absolute position in it.
//!  * [`BufReader`] walks a chunk payload that has already been loaded into memory.
//!
//! Reading goes through [`ReadBytes`] and writing through [`WriteBytes`]. Every multi-byte
//! integer in a RIFF-family container is little-endian, so neither trait offers a big-endian
//! variant.

use std::io;

mod buf_reader;
mod sink_stream;
mod source_stream;

pub use buf_reader::BufReader;
pub use sink_stream::SinkStream;
pub use source_stream::{SourceStream, SourceStreamOptions};

fn unseekable_error(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{} cannot seek", what))
}

/// A `MediaSource` is anything a [`SourceStream`] can read a container from.
///
/// [`std::io::Seek`] is a supertrait so that files and cursors work as-is, but a source may
/// still refuse to seek. Callers ask [`MediaSource::is_seekable`] first.
pub trait MediaSource: io::Read + io::Seek + Send + Sync {
    /// Whether seeks on this source can succeed.
    fn is_seekable(&self) -> bool;

    /// Total length of the source in bytes, when it can be known up front.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for std::fs::File {
    /// Pipes, sockets and character devices opened as files are not seekable. The answer comes
    /// from a metadata query, so callers should cache it.
    fn is_seekable(&self) -> bool {
        self.metadata().map(|meta| meta.is_file()).unwrap_or(false)
    }

    fn byte_len(&self) -> Option<u64> {
        self.metadata().ok().map(|meta| meta.len())
    }
}

impl<T> MediaSource for io::Cursor<T>
where
    T: AsRef<[u8]> + Send + Sync,
{
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// `ReadOnlySource` adapts a plain [`std::io::Read`] into a [`MediaSource`] that reports
/// itself as unseekable. Use it for pipes and network streams.
pub struct ReadOnlySource<R: io::Read> {
    inner: R,
}

impl<R: io::Read + Send> ReadOnlySource<R> {
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read + Send + Sync> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R: io::Read> io::Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::Read> io::Seek for ReadOnlySource<R> {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(unseekable_error("read-only source"))
    }
}

/// A `MediaSink` is anything a [`SinkStream`] can write a container to.
///
/// As with [`MediaSource`], seeking is optional. Writers that need to back-patch a header
/// must check [`MediaSink::is_seekable`] before relying on it.
pub trait MediaSink: io::Write + io::Seek + Send + Sync {
    /// Whether seeks on this sink can succeed.
    fn is_seekable(&self) -> bool;
}

impl MediaSink for std::fs::File {
    fn is_seekable(&self) -> bool {
        self.metadata().map(|meta| meta.is_file()).unwrap_or(false)
    }
}

impl MediaSink for io::Cursor<Vec<u8>> {
    fn is_seekable(&self) -> bool {
        true
    }
}

impl MediaSink for io::Cursor<&mut Vec<u8>> {
    fn is_seekable(&self) -> bool {
        true
    }
}

/// `WriteOnlySink` adapts a plain [`std::io::Write`] into a [`MediaSink`] that reports itself
/// as unseekable.
pub struct WriteOnlySink<W: io::Write> {
    inner: W,
}

impl<W: io::Write + Send> WriteOnlySink<W> {
    pub fn new(inner: W) -> Self {
        WriteOnlySink { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write + Send + Sync> MediaSink for WriteOnlySink<W> {
    fn is_seekable(&self) -> bool {
        false
    }
}

impl<W: io::Write> io::Write for WriteOnlySink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: io::Write> io::Seek for WriteOnlySink<W> {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(unseekable_error("write-only sink"))
    }
}

/// `ReadBytes` reads raw bytes and little-endian integers from a positioned byte stream.
///
/// Implementors supply exact reads, skips and the current position. Running out of bytes is
/// always an [`io::ErrorKind::UnexpectedEof`] error, never a short read.
pub trait ReadBytes {
    /// Fills `buf` completely or fails.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Moves `count` bytes forward without returning them.
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()>;

    /// Absolute offset of the next byte to be read.
    fn pos(&self) -> u64;

    /// Reads a fixed number of bytes in stream order.
    #[inline(always)]
    fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut bytes = [0; N];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads four bytes in stream order, as used for chunk identifiers.
    #[inline(always)]
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        self.read_array()
    }

    #[inline(always)]
    fn read_u8(&mut self) -> io::Result<u8> {
        self.read_byte()
    }

    #[inline(always)]
    fn read_u16(&mut self) -> io::Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32(&mut self) -> io::Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_u64(&mut self) -> io::Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads exactly `len` bytes into a newly allocated slice.
    fn read_boxed_slice_exact(&mut self, len: usize) -> io::Result<Box<[u8]>> {
        let mut buf = vec![0; len].into_boxed_slice();
        self.read_buf_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        (**self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }

    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }
}

/// `WriteBytes` writes raw bytes and little-endian integers to a positioned byte sink.
pub trait WriteBytes {
    /// Writes a single byte to the stream or returns an error.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Writes the entire buffer to the stream or returns an error.
    fn write_buf(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Absolute offset the next byte will be written at.
    fn pos(&self) -> u64;

    #[inline(always)]
    fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.write_byte(value)
    }

    #[inline(always)]
    fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    #[inline(always)]
    fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    #[inline(always)]
    fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_buf(&value.to_le_bytes())
    }

    /// Writes four bytes in order, as used for chunk identifiers.
    #[inline(always)]
    fn write_quad_bytes(&mut self, bytes: [u8; 4]) -> io::Result<()> {
        self.write_buf(&bytes)
    }
}

impl<W: WriteBytes> WriteBytes for &mut W {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).write_byte(byte)
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_buf(buf)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// A `Vec<u8>` is an in-memory byte sink that only ever appends.
impl WriteBytes for Vec<u8> {
    #[inline(always)]
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }

    #[inline(always)]
    fn write_buf(&mut self, buf: &[u8]) -> io::Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Seek, SeekFrom};

    use super::{BufReader, MediaSource, ReadBytes, ReadOnlySource, WriteBytes, WriteOnlySink};

    #[test]
    fn verify_written_integers_read_back() {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u16(0xfffe).unwrap();
        buf.write_u32(48000).unwrap();
        buf.write_u64(709_493_966_490).unwrap();
        buf.write_quad_bytes(*b"ds64").unwrap();

        assert_eq!(&buf[..6], &[0xfe, 0xff, 0x80, 0xbb, 0x00, 0x00]);

        let mut reader = BufReader::new(&buf);
        assert_eq!(reader.read_u16().unwrap(), 0xfffe);
        assert_eq!(reader.read_u32().unwrap(), 48000);
        assert_eq!(reader.read_u64().unwrap(), 709_493_966_490);
        assert_eq!(&reader.read_quad_bytes().unwrap(), b"ds64");
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn verify_adapters_refuse_to_seek() {
        let mut source = ReadOnlySource::new(Cursor::new(vec![1, 2, 3]));
        assert!(!source.is_seekable());
        assert_eq!(source.byte_len(), None);
        assert!(source.seek(SeekFrom::Start(1)).is_err());

        let mut byte = [0];
        source.read_exact(&mut byte).unwrap();
        assert_eq!(byte, [1]);

        let mut sink = WriteOnlySink::new(Vec::new());
        assert!(!super::MediaSink::is_seekable(&sink));
        assert!(sink.seek(SeekFrom::End(0)).is_err());
    }
}
