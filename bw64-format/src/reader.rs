// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::io::{Seek, SeekFrom};

use bw64_core::errors::{limit_error, seek_error, size_error, structural_error, truncated_error};
use bw64_core::errors::{Result, SeekErrorKind};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{ReadBytes, SourceStream};

use log::{debug, error, info, warn};

use crate::chunks::*;
use crate::registry::ChunkRegistry;
use crate::stream::FrameCursor;

/// The top-level container variants sharing the WAVE form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    /// A plain RIFF file. Sizes are 32-bit unless a ds64 chunk is present.
    Riff,
    /// A BW64 file, with a mandatory ds64 chunk.
    Bw64,
    /// An RF64 file, with a mandatory ds64 chunk.
    Rf64,
}

impl ContainerKind {
    pub fn from_id(id: FourCc) -> Option<Self> {
        match id {
            RIFF_ID => Some(ContainerKind::Riff),
            BW64_ID => Some(ContainerKind::Bw64),
            RF64_ID => Some(ContainerKind::Rf64),
            _ => None,
        }
    }

    /// The top-level identifier.
    pub fn id(self) -> FourCc {
        match self {
            ContainerKind::Riff => RIFF_ID,
            ContainerKind::Bw64 => BW64_ID,
            ContainerKind::Rf64 => RF64_ID,
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id(), f)
    }
}

/// The location and resolved size of a chunk in the container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    /// The chunk identifier.
    pub id: FourCc,
    /// The payload size, resolved through the ds64 chunk if the header declared the sentinel.
    pub size: u64,
    /// The absolute position of the first payload byte.
    pub position: u64,
}

/// `ReaderOptions` is a common set of options that the reader uses while walking a container.
#[derive(Copy, Clone, Debug)]
pub struct ReaderOptions {
    /// The largest chunk, other than the data chunk, that will be read into memory. Larger chunks
    /// fail with a limit error.
    pub max_chunk_len: u64,
    /// Require the ds64 chunk to be the first chunk of a BW64 or RF64 container.
    pub require_ds64_first: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions { max_chunk_len: 64 * 1024 * 1024, require_ds64_first: true }
    }
}

/// The states of the container walk. An error at any state ends the walk.
enum State {
    ExpectTopHeader,
    ExpectFormTag,
    IterateChunks,
    Done,
}

/// Everything learned about the container while walking it.
#[derive(Default)]
struct ContainerWalk {
    kind: Option<ContainerKind>,
    top_size: u32,
    file_size: Option<u64>,
    stream_len: Option<u64>,
    ds64: Option<DataSize64Chunk>,
    format: Option<FormatInfoChunk>,
    data: Option<ChunkHeader>,
    headers: Vec<ChunkHeader>,
    chunks: Vec<Chunk>,
}

impl ContainerWalk {
    fn read_top_header(&mut self, reader: &mut SourceStream<'_>) -> Result<State> {
        let id = FourCc::new(reader.read_quad_bytes()?);

        let Some(kind) = ContainerKind::from_id(id)
        else {
            error!("unknown container id '{}'", id);
            return structural_error(format!("expected RIFF, BW64 or RF64, found '{}'", id));
        };

        self.kind = Some(kind);
        self.top_size = reader.read_u32()?;
        self.stream_len = reader.byte_len();

        debug!("{} container, size field {:#x}", kind, self.top_size);

        Ok(State::ExpectFormTag)
    }

    fn read_form_tag(&mut self, reader: &mut SourceStream<'_>) -> Result<State> {
        let form = FourCc::new(reader.read_quad_bytes()?);

        if form != WAVE_ID {
            error!("container form is not WAVE ({})", form);
            return structural_error(format!("expected the WAVE form, found '{}'", form));
        }

        if self.top_size != SIZE_SENTINEL {
            if self.top_size < 4 {
                return size_error(format!("container size {} is too small", self.top_size));
            }
            self.file_size = Some(u64::from(self.top_size));
        }

        Ok(State::IterateChunks)
    }

    /// Resolves the 64-bit size of the chunk `id` with the header size field `size`.
    fn resolve_size(&self, id: FourCc, size: u32) -> Result<u64> {
        match &self.ds64 {
            Some(ds64) if id == DATA_ID => {
                if size != SIZE_SENTINEL && u64::from(size) != ds64.data_size() {
                    warn!(
                        "data chunk size field {} disagrees with ds64 dataSize {}",
                        size,
                        ds64.data_size()
                    );
                }
                Ok(ds64.data_size())
            }
            _ if size != SIZE_SENTINEL => Ok(u64::from(size)),
            Some(ds64) => match ds64.chunk_size(id) {
                Some(size) => {
                    debug!("ds64 resolves '{}' chunk size to {}", id, size);
                    Ok(size)
                }
                None => {
                    error!("'{}' chunk declares a 0xFFFFFFFF size but is not in ds64", id);
                    structural_error(format!("'{}' chunk size is not listed in the ds64 table", id))
                }
            },
            None => {
                error!("'{}' chunk declares a 0xFFFFFFFF size without a ds64 chunk", id);
                structural_error(format!("'{}' chunk size needs a preceding ds64 chunk", id))
            }
        }
    }

    fn skip_pad(&self, reader: &mut SourceStream<'_>, id: FourCc, size: u64) -> Result<()> {
        if size & 0x1 == 1 {
            let pos = reader.pos();
            let in_container = self.file_size.map_or(true, |len| pos < len.saturating_add(8));
            let in_stream = self.stream_len.map_or(true, |len| pos < len);

            if in_container && in_stream {
                reader.read_u8()?;
            }
            else {
                info!("odd sized '{}' chunk ends the stream without a pad byte", id);
            }
        }
        Ok(())
    }

    fn next_chunk(
        &mut self,
        reader: &mut SourceStream<'_>,
        opts: &ReaderOptions,
        registry: &ChunkRegistry,
    ) -> Result<State> {
        let pos = reader.pos();
        let kind = self.kind.unwrap_or(ContainerKind::Riff);

        // The end of the container, if known.
        let container_end = self.file_size.map(|size| size.saturating_add(8));

        if let Some(end) = container_end {
            if pos >= end {
                return Ok(State::Done);
            }
            if end - pos < 8 {
                info!("ignoring {} trailing bytes at the end of the container", end - pos);
                return Ok(State::Done);
            }
        }

        if let Some(len) = self.stream_len {
            if pos >= len {
                if let Some(end) = container_end {
                    warn!("container size exceeds the stream length by {} bytes", end - len);
                }
                return Ok(State::Done);
            }
        }

        let id = FourCc::new(reader.read_quad_bytes()?);
        let size_field = reader.read_u32()?;
        let position = reader.pos();

        if id == DS64_ID {
            if self.ds64.is_some() {
                error!("second ds64 chunk at {}", position);
                return structural_error("container holds more than one ds64 chunk");
            }
            if self.data.is_some() {
                error!("ds64 chunk at {} follows the data chunk", position);
                return structural_error("ds64 chunk must precede the data chunk");
            }
            if kind != ContainerKind::Riff && opts.require_ds64_first && !self.headers.is_empty() {
                error!("ds64 chunk at {} is not the first chunk", position);
                return structural_error("ds64 chunk must be the first chunk");
            }
            if kind == ContainerKind::Riff {
                warn!("ds64 chunk in a RIFF container");
            }
        }
        else {
            if kind != ContainerKind::Riff && opts.require_ds64_first && self.ds64.is_none() {
                error!("{} container does not begin with a ds64 chunk", kind);
                return structural_error(format!("{} container must begin with a ds64 chunk", kind));
            }
            if self.file_size.is_none() {
                error!("container size is 0xFFFFFFFF and no ds64 chunk precedes '{}'", id);
                return structural_error("container size needs a preceding ds64 chunk");
            }
        }

        let size = self.resolve_size(id, size_field)?;

        debug!("chunk '{}' at {}, {} bytes", id, position, size);

        // The container end is unknown only before the ds64 chunk resolves it.
        if let Some(end) = container_end {
            // Formulated so the untrusted size cannot overflow.
            if end - position < size {
                error!("'{}' chunk of {} bytes exceeds the container", id, size);
                return size_error(format!("'{}' chunk exceeds the container size", id));
            }
        }

        if let Some(len) = self.stream_len {
            if len.saturating_sub(position) < size {
                return truncated_error(format!(
                    "'{}' chunk of {} bytes exceeds the stream length {}",
                    id, size, len
                ));
            }
        }

        let header = ChunkHeader { id, size, position };
        self.headers.push(header);

        // The data chunk is not read. Only its location is recorded.
        if id == DATA_ID {
            if self.data.is_some() {
                error!("second data chunk at {}", position);
                return structural_error("container holds more than one data chunk");
            }
            if self.format.is_none() {
                error!("data chunk at {} precedes the fmt chunk", position);
                return structural_error("fmt chunk must precede the data chunk");
            }

            self.data = Some(header);

            if !reader.is_seekable() {
                info!("source is not seekable, chunks after the data chunk are not read");
                return Ok(State::Done);
            }

            reader.ignore_bytes(size)?;
            self.skip_pad(reader, id, size)?;

            return Ok(State::IterateChunks);
        }

        if size > opts.max_chunk_len {
            error!("'{}' chunk of {} bytes exceeds the maximum chunk length", id, size);
            return limit_error("chunk exceeds the maximum chunk length");
        }

        // The size is bounded by max_chunk_len.
        let buf = reader.read_boxed_slice_exact(size as usize)?;

        // The fmt and ds64 chunks drive the walk, so they always use their own codecs.
        let chunk = match id {
            FMT_ID => Chunk::parse_as::<FormatInfoChunk>(id, &buf)?,
            DS64_ID => Chunk::parse_as::<DataSize64Chunk>(id, &buf)?,
            _ => registry.parse(id, &buf)?,
        };

        match &chunk {
            Chunk::Format(format) => {
                if self.format.is_some() {
                    error!("second fmt chunk at {}", position);
                    return structural_error("container holds more than one fmt chunk");
                }
                self.format = Some(format.clone());
            }
            Chunk::DataSize64(ds64) => {
                if self.top_size != SIZE_SENTINEL && u64::from(self.top_size) != ds64.bw64_size() {
                    warn!(
                        "container size field {} disagrees with ds64 bw64Size {}",
                        self.top_size,
                        ds64.bw64_size()
                    );
                }
                debug!("ds64 resolves the container size to {}", ds64.bw64_size());

                self.file_size = Some(ds64.bw64_size());
                self.ds64 = Some(ds64.clone());
            }
            Chunk::Unknown(_) => {
                info!("carrying '{}' chunk of {} bytes opaquely", id, size);
            }
            Chunk::Chna(_) => (),
        }

        self.chunks.push(chunk);
        self.skip_pad(reader, id, size)?;

        Ok(State::IterateChunks)
    }
}

/// BW64 container reader.
///
/// `Bw64Reader` walks the chunks of a `RIFF`, `BW64` or `RF64` WAVE container, decodes every
/// chunk except the data chunk, and then provides frame-accurate access to the audio payload.
pub struct Bw64Reader<'s> {
    reader: SourceStream<'s>,
    kind: ContainerKind,
    file_size: u64,
    headers: Vec<ChunkHeader>,
    chunks: Vec<Chunk>,
    format: FormatInfoChunk,
    data: ChunkHeader,
    cursor: FrameCursor,
}

impl<'s> Bw64Reader<'s> {
    /// Walk the container in `source`, decoding chunks with the default chunk registry.
    pub fn try_new(source: SourceStream<'s>, opts: &ReaderOptions) -> Result<Self> {
        Self::try_new_with_registry(source, opts, crate::default::get_registry())
    }

    /// Walk the container in `source`, decoding chunks with `registry`.
    pub fn try_new_with_registry(
        mut reader: SourceStream<'s>,
        opts: &ReaderOptions,
        registry: &ChunkRegistry,
    ) -> Result<Self> {
        let mut walk = ContainerWalk::default();
        let mut state = State::ExpectTopHeader;

        loop {
            state = match state {
                State::ExpectTopHeader => walk.read_top_header(&mut reader)?,
                State::ExpectFormTag => walk.read_form_tag(&mut reader)?,
                State::IterateChunks => walk.next_chunk(&mut reader, opts, registry)?,
                State::Done => break,
            };
        }

        let Some(data) = walk.data
        else {
            error!("container has no data chunk");
            return structural_error("missing data chunk");
        };

        // The data chunk is only accepted after the fmt chunk and, for a sentinel container
        // size, after the ds64 chunk. These are always set here.
        let (Some(format), Some(kind), Some(file_size)) = (walk.format, walk.kind, walk.file_size)
        else {
            return structural_error("missing fmt chunk");
        };

        let cursor = FrameCursor::new(data.position, data.size, format.block_alignment())?;

        if data.size % cursor.frame_len() != 0 {
            warn!(
                "data chunk of {} bytes ends with a partial frame of {} bytes",
                data.size,
                data.size % cursor.frame_len()
            );
        }

        if reader.is_seekable() {
            reader.seek(SeekFrom::Start(data.position))?;
        }

        debug!(
            "{} frames of {} bytes at {}, {} chunks",
            cursor.num_frames(),
            cursor.frame_len(),
            data.position,
            walk.headers.len()
        );

        Ok(Bw64Reader {
            reader,
            kind,
            file_size,
            headers: walk.headers,
            chunks: walk.chunks,
            format,
            data,
            cursor,
        })
    }

    /// The top-level container variant.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The resolved top-level size: the length of the file excluding the 8-byte top-level
    /// header.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn format(&self) -> &FormatInfoChunk {
        &self.format
    }

    pub fn format_tag(&self) -> FormatTag {
        self.format.format_tag()
    }

    pub fn channels(&self) -> u16 {
        self.format.channel_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate()
    }

    pub fn bit_depth(&self) -> u16 {
        self.format.bits_per_sample()
    }

    /// The number of whole frames in the data chunk.
    pub fn num_frames(&self) -> u64 {
        self.cursor.num_frames()
    }

    /// The chunk directory, in file order. Includes the data chunk and any chunk after it.
    pub fn headers(&self) -> &[ChunkHeader] {
        &self.headers
    }

    /// The header of the data chunk.
    pub fn data_header(&self) -> &ChunkHeader {
        &self.data
    }

    /// Returns true if the container holds a chunk `id`.
    pub fn has_chunk(&self, id: FourCc) -> bool {
        self.headers.iter().any(|header| header.id == id)
    }

    /// The decoded chunks, in file order. The data chunk is not included.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The first decoded chunk `id`.
    pub fn chunk(&self, id: FourCc) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.id() == id)
    }

    pub fn chna(&self) -> Option<&ChnaChunk> {
        self.chunks.iter().find_map(|chunk| match chunk {
            Chunk::Chna(chna) => Some(chna),
            _ => None,
        })
    }

    pub fn ds64(&self) -> Option<&DataSize64Chunk> {
        self.chunks.iter().find_map(|chunk| match chunk {
            Chunk::DataSize64(ds64) => Some(ds64),
            _ => None,
        })
    }

    /// The index of the next frame to be read.
    pub fn tell(&self) -> u64 {
        self.cursor.tell()
    }

    /// Reads exactly `count` frames. Fails, without reading, if fewer frames remain.
    pub fn read_frames(&mut self, count: u64) -> Result<Vec<u8>> {
        let len = self.cursor.byte_len(count)?;

        let Ok(len) = usize::try_from(len)
        else {
            return limit_error("requested frames do not fit in memory");
        };

        let mut buf = vec![0; len];
        self.reader.read_buf_exact(&mut buf)?;
        self.cursor.advance(count);

        Ok(buf)
    }

    /// Reads up-to `max` frames, or returns `None` once every frame has been read.
    pub fn next_frames(&mut self, max: u64) -> Result<Option<Vec<u8>>> {
        if self.cursor.remaining() == 0 {
            return Ok(None);
        }

        let count = max.min(self.cursor.remaining());
        self.read_frames(count).map(Some)
    }

    /// Reads as many whole frames as fit in `buf`, and returns the number of frames read.
    pub fn read_frames_into(&mut self, buf: &mut [u8]) -> Result<u64> {
        let count = (buf.len() as u64 / self.cursor.frame_len()).min(self.cursor.remaining());

        // count frames fit in buf, so the length fits in usize.
        let len = self.cursor.byte_len(count)? as usize;
        self.reader.read_buf_exact(&mut buf[..len])?;
        self.cursor.advance(count);

        Ok(count)
    }

    /// Seeks to a frame. The target is clamped to `[0, num_frames]`. Returns the frame seeked
    /// to.
    ///
    /// An unseekable source can only be seeked forward.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let frame = self.cursor.resolve(pos);
        let byte_pos = self.cursor.byte_pos(frame);

        if self.reader.is_seekable() {
            self.reader.seek(SeekFrom::Start(byte_pos))?;
        }
        else {
            let current = self.reader.pos();
            if byte_pos >= current {
                self.reader.ignore_bytes(byte_pos - current)?;
            }
            else {
                return seek_error(SeekErrorKind::ForwardOnly);
            }
        }

        self.cursor.set(frame);

        debug!("seeked to frame {}", frame);

        Ok(frame)
    }

    /// Consumes the reader, returning the source stream.
    pub fn into_inner(self) -> SourceStream<'s> {
        self.reader
    }
}
