// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bw64_core::errors::{invariant_error, limit_error, seek_error, size_error};
use bw64_core::errors::{Error, Result, SeekErrorKind};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{MediaSink, SinkStream, WriteBytes};

use log::{debug, error, warn};

use crate::chunks::*;

/// The largest number of ds64 table rows the writer will reserve.
const MAX_RESERVED_ROWS: usize = 1 << 20;

/// `WriterOptions` is a common set of options that the writer uses.
#[derive(Copy, Clone, Debug, Default)]
pub struct WriterOptions {
    /// The number of ds64 table rows to reserve, in addition to those needed for chunks that are
    /// already too large for a 32-bit size field. Only used when streaming.
    pub ds64_reservation: usize,
}

/// A chunk encoded up front, ready to be framed.
struct EncodedChunk {
    id: FourCc,
    payload: Vec<u8>,
}

impl EncodedChunk {
    fn encode(chunk: &Chunk) -> Result<Self> {
        Ok(EncodedChunk { id: chunk.id(), payload: chunk.encode()? })
    }

    fn payload_len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The length of the header, payload and pad byte.
    fn framed_len(&self) -> u64 {
        8 + padded(self.payload_len())
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        write_chunk_header(writer, self.id, self.payload_len())?;
        writer.write_buf(&self.payload)?;

        if self.payload.len() & 1 == 1 {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

#[inline]
fn padded(len: u64) -> u64 {
    len + (len & 1)
}

/// The value of a 32-bit size field for a `size` that may not fit.
#[inline]
fn size_field(size: u64) -> u32 {
    if is_oversized(size) {
        SIZE_SENTINEL
    }
    else {
        size as u32
    }
}

fn write_chunk_header<W: WriteBytes>(writer: &mut W, id: FourCc, size: u64) -> Result<()> {
    writer.write_quad_bytes(id.get())?;
    writer.write_u32(size_field(size))?;
    Ok(())
}

fn write_zeros<W: WriteBytes>(writer: &mut W, mut len: u64) -> Result<()> {
    let zeros = [0u8; 1024];

    while len > 0 {
        let n = len.min(zeros.len() as u64) as usize;
        writer.write_buf(&zeros[..n])?;
        len -= n as u64;
    }
    Ok(())
}

fn checked_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::LimitError("container size overflows 64 bits"))
}

/// Decides whether a container needs a ds64 chunk. One is needed if the container size or the
/// data size overflows a 32-bit size field, or if any other chunk (`rows`) does.
fn plan_ds64(riff_size: u64, data_size: u64, rows: &[(FourCc, u64)]) -> Option<DataSize64Chunk> {
    if !is_oversized(riff_size) && !is_oversized(data_size) && rows.is_empty() {
        return None;
    }

    let mut ds64 = DataSize64Chunk::new(riff_size, data_size);

    for &(id, size) in rows {
        ds64.set_chunk_size(id, size);
    }

    Some(ds64)
}

/// The chunks of a container, encoded.
struct PreparedChunks {
    format: EncodedChunk,
    leading: Vec<EncodedChunk>,
    trailing: Vec<EncodedChunk>,
    /// Chunks, other than data, whose size needs a ds64 table row.
    oversized: Vec<(FourCc, u64)>,
}

/// Where the sizes of a container come from.
#[derive(Copy, Clone, Debug)]
enum Layout {
    /// Sizes are back-patched at finalisation. A JUNK chunk with room for `junk_rows` ds64
    /// table rows is reserved at `junk_pos`.
    Streaming { junk_pos: u64, junk_rows: usize },
    /// Sizes were written up front for a data chunk of exactly `data_len` bytes.
    Announced { data_len: u64 },
}

/// Logs a warning if a writer is dropped before its sizes are written.
struct FinalizeGuard {
    armed: bool,
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!("writer dropped before finalisation, container sizes are placeholders");
        }
    }
}

/// Builds a BW64 container from a format chunk and an ordered list of further chunks.
///
/// The fmt, ds64 and data chunks are always written by the writer itself. A ds64 chunk is only
/// written, and the container only becomes a BW64 container, if some size overflows its 32-bit
/// field. Otherwise the result is a plain RIFF/WAVE file.
pub struct ContainerBuilder {
    format: FormatInfoChunk,
    leading: Vec<Chunk>,
    trailing: Vec<Chunk>,
    options: WriterOptions,
}

impl ContainerBuilder {
    pub fn new(format: FormatInfoChunk) -> Self {
        ContainerBuilder {
            format,
            leading: Vec::new(),
            trailing: Vec::new(),
            options: Default::default(),
        }
    }

    pub fn with_options(&mut self, options: WriterOptions) -> &mut Self {
        self.options = options;
        self
    }

    fn check_chunk(chunk: &Chunk) -> Result<()> {
        match chunk.id() {
            id @ (FMT_ID | DS64_ID | DATA_ID) => {
                invariant_error(format!("the '{}' chunk is written by the writer itself", id))
            }
            _ => Ok(()),
        }
    }

    /// Adds a chunk to be written before the data chunk, after any chunk already added.
    pub fn add_chunk(&mut self, chunk: impl Into<Chunk>) -> Result<&mut Self> {
        let chunk = chunk.into();
        Self::check_chunk(&chunk)?;
        self.leading.push(chunk);
        Ok(self)
    }

    /// Adds a chunk to be written after the data chunk, after any trailing chunk already added.
    pub fn add_trailing_chunk(&mut self, chunk: impl Into<Chunk>) -> Result<&mut Self> {
        let chunk = chunk.into();
        Self::check_chunk(&chunk)?;
        self.trailing.push(chunk);
        Ok(self)
    }

    /// Encodes every chunk, so no chunk can fail to encode after writing has started.
    fn prepare(&self) -> Result<PreparedChunks> {
        let format = EncodedChunk::encode(&Chunk::Format(self.format.clone()))?;
        let leading = self.leading.iter().map(EncodedChunk::encode).collect::<Result<Vec<_>>>()?;
        let trailing = self.trailing.iter().map(EncodedChunk::encode).collect::<Result<Vec<_>>>()?;

        let mut oversized: Vec<(FourCc, u64)> = Vec::new();

        for chunk in leading.iter().chain(&trailing) {
            if is_oversized(chunk.payload_len()) {
                if oversized.iter().any(|&(id, _)| id == chunk.id) {
                    return invariant_error(format!(
                        "more than one '{}' chunk is too large for a 32-bit size",
                        chunk.id
                    ));
                }
                oversized.push((chunk.id, chunk.payload_len()));
            }
        }

        Ok(PreparedChunks { format, leading, trailing, oversized })
    }

    /// Starts writing a container whose data length is not known in advance. The sizes are
    /// back-patched by [`Bw64Writer::finalize`], so `sink` must be seekable.
    pub fn build<W: MediaSink>(&self, sink: W) -> Result<Bw64Writer<W>> {
        let mut writer = SinkStream::new(sink);

        if !writer.is_seekable() {
            error!("streaming a container requires a seekable sink, announce the data length");
            return seek_error(SeekErrorKind::Unseekable);
        }

        let prepared = self.prepare()?;

        let Some(junk_rows) = self
            .options
            .ds64_reservation
            .checked_add(prepared.oversized.len())
            .filter(|&rows| rows <= MAX_RESERVED_ROWS)
        else {
            return limit_error("ds64 reservation is too large");
        };

        writer.write_quad_bytes(RIFF_ID.get())?;
        writer.write_u32(0)?;
        writer.write_quad_bytes(WAVE_ID.get())?;

        // Room for the ds64 chunk finalisation may need.
        let junk_pos = writer.pos();
        let junk_len = DataSize64Chunk::payload_len_for_rows(junk_rows);
        write_chunk_header(&mut writer, JUNK_ID, junk_len)?;
        write_zeros(&mut writer, junk_len)?;

        prepared.format.write(&mut writer)?;

        for chunk in &prepared.leading {
            chunk.write(&mut writer)?;
        }

        write_chunk_header(&mut writer, DATA_ID, 0)?;
        let data_pos = writer.pos();

        debug!("streaming container, {} ds64 rows reserved, data at {}", junk_rows, data_pos);

        Ok(Bw64Writer {
            writer,
            frame_len: u64::from(self.format.block_alignment()),
            layout: Layout::Streaming { junk_pos, junk_rows },
            oversized: prepared.oversized,
            trailing: prepared.trailing,
            data_pos,
            data_len: 0,
            guard: FinalizeGuard { armed: true },
        })
    }

    /// Starts writing a container with a data chunk of exactly `data_len` bytes. Every size is
    /// written up front and the writer never seeks, so `sink` need not be seekable.
    pub fn build_with_data_len<W: MediaSink>(
        &self,
        sink: W,
        data_len: u64,
    ) -> Result<Bw64Writer<W>> {
        let frame_len = u64::from(self.format.block_alignment());

        if data_len % frame_len != 0 {
            return invariant_error(format!(
                "announced data length {} is not a whole number of {}-byte frames",
                data_len, frame_len
            ));
        }

        let prepared = self.prepare()?;

        // Form tag, fmt chunk and data chunk header.
        let mut riff_size = 4 + prepared.format.framed_len() + 8;

        for chunk in prepared.leading.iter().chain(&prepared.trailing) {
            riff_size = checked_add(riff_size, chunk.framed_len())?;
        }

        riff_size = checked_add(riff_size, checked_add(data_len, data_len & 1)?)?;

        let ds64 = match plan_ds64(riff_size, data_len, &prepared.oversized) {
            Some(mut ds64) => {
                riff_size = checked_add(riff_size, 8 + ds64.payload_len())?;
                ds64.set_bw64_size(riff_size);
                Some(ds64)
            }
            None => None,
        };

        let mut writer = SinkStream::new(sink);

        let top_id = if ds64.is_some() { BW64_ID } else { RIFF_ID };

        writer.write_quad_bytes(top_id.get())?;
        writer.write_u32(size_field(riff_size))?;
        writer.write_quad_bytes(WAVE_ID.get())?;

        if let Some(ds64) = ds64 {
            EncodedChunk::encode(&Chunk::DataSize64(ds64))?.write(&mut writer)?;
        }

        prepared.format.write(&mut writer)?;

        for chunk in &prepared.leading {
            chunk.write(&mut writer)?;
        }

        write_chunk_header(&mut writer, DATA_ID, data_len)?;
        let data_pos = writer.pos();

        debug!("{} container of {} bytes, data at {}", top_id, riff_size + 8, data_pos);

        Ok(Bw64Writer {
            writer,
            frame_len,
            layout: Layout::Announced { data_len },
            oversized: prepared.oversized,
            trailing: prepared.trailing,
            data_pos,
            data_len: 0,
            guard: FinalizeGuard { armed: true },
        })
    }

    /// Streams a container into `sink`, calling `write_frames` to write the audio payload, and
    /// then finalises it.
    pub fn write<W, F>(&self, sink: W, write_frames: F) -> Result<W>
    where
        W: MediaSink,
        F: FnOnce(&mut Bw64Writer<W>) -> Result<()>,
    {
        let mut writer = self.build(sink)?;
        write_frames(&mut writer)?;
        writer.finalize()
    }
}

/// BW64 container writer.
///
/// A `Bw64Writer` is created by a [`ContainerBuilder`] with every chunk before the data chunk
/// already written. Frames are then appended with [`Bw64Writer::write_frames`] and the
/// container completed with [`Bw64Writer::finalize`].
pub struct Bw64Writer<W: MediaSink> {
    writer: SinkStream<W>,
    frame_len: u64,
    layout: Layout,
    oversized: Vec<(FourCc, u64)>,
    trailing: Vec<EncodedChunk>,
    data_pos: u64,
    data_len: u64,
    guard: FinalizeGuard,
}

impl<W: MediaSink> Bw64Writer<W> {
    /// Appends whole frames to the data chunk. Returns the number of frames written.
    pub fn write_frames(&mut self, buf: &[u8]) -> Result<u64> {
        let len = buf.len() as u64;

        if len % self.frame_len != 0 {
            return invariant_error(format!(
                "{} bytes is not a whole number of {}-byte frames",
                len, self.frame_len
            ));
        }

        let data_len = checked_add(self.data_len, len)?;

        if let Layout::Announced { data_len: announced } = self.layout {
            if data_len > announced {
                return size_error(format!(
                    "writing {} bytes exceeds the announced data length {}",
                    len, announced
                ));
            }
        }

        self.writer.write_buf(buf)?;
        self.data_len = data_len;

        Ok(len / self.frame_len)
    }

    /// The number of frames written.
    pub fn frames_written(&self) -> u64 {
        self.data_len / self.frame_len
    }

    /// The number of audio bytes written.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Gets a reference to the sink.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    /// Back-patches the sizes of a streamed container. Rewrites the JUNK reservation as a ds64
    /// chunk if any size overflows.
    fn patch_sizes(&mut self, junk_pos: u64, junk_rows: usize) -> Result<()> {
        let end = self.writer.pos();
        let riff_size = end - 8;

        match plan_ds64(riff_size, self.data_len, &self.oversized) {
            Some(ds64) => {
                // The ds64 chunk takes the place of the reservation, so the container size
                // holds.
                let spare_rows = junk_rows - ds64.table_len();

                self.writer.seek(0)?;
                self.writer.write_quad_bytes(BW64_ID.get())?;
                self.writer.write_u32(size_field(riff_size))?;

                self.writer.seek(junk_pos)?;
                EncodedChunk::encode(&Chunk::DataSize64(ds64))?.write(&mut self.writer)?;

                // Spare rows become a smaller JUNK chunk. Its payload is already zeroed.
                if spare_rows > 0 {
                    write_chunk_header(&mut self.writer, JUNK_ID, 12 * spare_rows as u64 - 8)?;
                }

                debug!("reservation rewritten as ds64, {} spare rows", spare_rows);
            }
            None => {
                self.writer.seek(4)?;
                self.writer.write_u32(size_field(riff_size))?;
            }
        }

        self.writer.seek(self.data_pos - 4)?;
        self.writer.write_u32(size_field(self.data_len))?;
        self.writer.seek(end)?;

        Ok(())
    }

    /// Completes the container: pads the data chunk, writes any trailing chunks and the final
    /// sizes. Returns the sink.
    pub fn finalize(mut self) -> Result<W> {
        if self.data_len & 1 == 1 {
            self.writer.write_u8(0)?;
        }

        for chunk in &self.trailing {
            chunk.write(&mut self.writer)?;
        }

        match self.layout {
            Layout::Announced { data_len } => {
                if self.data_len != data_len {
                    return size_error(format!(
                        "{} bytes of audio written but {} announced",
                        self.data_len, data_len
                    ));
                }
            }
            Layout::Streaming { junk_pos, junk_rows } => self.patch_sizes(junk_pos, junk_rows)?,
        }

        self.writer.flush()?;
        self.guard.armed = false;

        debug!(
            "finalised container with {} frames, {} bytes",
            self.frames_written(),
            self.writer.pos()
        );

        Ok(self.writer.into_inner())
    }
}
