// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A registry mapping chunk identifiers to the codecs that decode them.

use bw64_core::errors::Result;
use bw64_core::fourcc::FourCc;

use hashbrown::HashMap;
use log::debug;

use crate::chunks::*;

/// Description of a chunk type a codec decodes.
#[derive(Copy, Clone, Debug)]
pub struct SupportedChunk {
    /// The chunk identifier.
    pub id: FourCc,
    /// A short, human-readable, name of the chunk type.
    pub name: &'static str,
}

/// To support registration in a chunk registry, a chunk codec must implement the
/// `RegisterableChunk` trait.
pub trait RegisterableChunk: ParseChunk + Into<Chunk> {
    fn supported_chunk() -> SupportedChunk;
}

/// Chunk parse function. Decodes a complete payload into a `Chunk`.
pub type ChunkParseFn = fn(FourCc, &[u8]) -> Result<Chunk>;

/// Registration details of a chunk codec.
#[derive(Copy, Clone)]
pub struct RegisteredChunk {
    /// Chunk details.
    pub chunk: SupportedChunk,
    /// Function to decode a payload of the chunk type.
    pub parse: ChunkParseFn,
}

/// A `ChunkRegistry` maps chunk identifiers to codecs. Identifiers without a registered codec
/// decode as [`UnknownChunk`], so lookup never fails.
#[derive(Default)]
pub struct ChunkRegistry {
    chunks: HashMap<FourCc, RegisteredChunk>,
}

impl ChunkRegistry {
    /// Instantiate an empty `ChunkRegistry`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Get the registration details of the codec for the chunk `id`, if one was registered.
    pub fn get(&self, id: FourCc) -> Option<&RegisteredChunk> {
        self.chunks.get(&id)
    }

    /// Register the codec `C`. Returns the registration it replaced, if any.
    pub fn register<C: RegisterableChunk>(&mut self) -> Option<RegisteredChunk> {
        let chunk = C::supported_chunk();
        let reg = RegisteredChunk { chunk, parse: Chunk::parse_as::<C> };
        self.chunks.insert(chunk.id, reg)
    }

    /// Get the parse function for the chunk `id`, falling back to the opaque codec.
    pub fn lookup(&self, id: FourCc) -> ChunkParseFn {
        match self.chunks.get(&id) {
            Some(reg) => reg.parse,
            None => Chunk::parse_as::<UnknownChunk>,
        }
    }

    /// Decode the payload `buf` of the chunk `id` with the registered codec.
    pub fn parse(&self, id: FourCc, buf: &[u8]) -> Result<Chunk> {
        if let Some(reg) = self.get(id) {
            debug!("decoding '{}' chunk ({} bytes) as {}", id, buf.len(), reg.chunk.name);
        }

        (self.lookup(id))(id, buf)
    }
}

impl RegisterableChunk for FormatInfoChunk {
    fn supported_chunk() -> SupportedChunk {
        SupportedChunk { id: FMT_ID, name: "format" }
    }
}

impl RegisterableChunk for ChnaChunk {
    fn supported_chunk() -> SupportedChunk {
        SupportedChunk { id: CHNA_ID, name: "track uid table" }
    }
}

impl RegisterableChunk for DataSize64Chunk {
    fn supported_chunk() -> SupportedChunk {
        SupportedChunk { id: DS64_ID, name: "data size 64" }
    }
}

/// Register every chunk codec of this crate with `registry`.
pub fn register_standard_chunks(registry: &mut ChunkRegistry) {
    registry.register::<FormatInfoChunk>();
    registry.register::<ChnaChunk>();
    registry.register::<DataSize64Chunk>();
}
