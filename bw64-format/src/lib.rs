// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # BW64
//!
//! A reader and writer for BW64 (ITU-R BS.2088), RF64 (EBU Tech 3306) and plain RIFF/WAVE
//! containers.
//!
//! Reading walks the container with a [`Bw64Reader`], which decodes every chunk except the
//! audio payload and then reads whole frames on demand. Writing starts from a
//! [`ContainerBuilder`], which produces a [`Bw64Writer`] that frames are appended to.
//!
//! Sizes that overflow a 32-bit size field are resolved through, or recorded in, the `ds64`
//! chunk. A file written with no such size stays a plain RIFF/WAVE file.

pub mod chunks;
pub mod registry;

mod reader;
mod stream;
mod writer;

pub use reader::{Bw64Reader, ChunkHeader, ContainerKind, ReaderOptions};
pub use stream::FrameCursor;
pub use writer::{Bw64Writer, ContainerBuilder, WriterOptions};

pub mod default {
    //! The `default` module provides a lazily built [`ChunkRegistry`] holding every chunk codec
    //! of this crate.

    use lazy_static::lazy_static;

    use crate::registry::{register_standard_chunks, ChunkRegistry};

    lazy_static! {
        static ref CHUNK_REGISTRY: ChunkRegistry = {
            let mut registry = ChunkRegistry::new();
            register_standard_chunks(&mut registry);
            registry
        };
    }

    /// Gets the default `ChunkRegistry`. The registry is not built until the first call to this
    /// function.
    pub fn get_registry() -> &'static ChunkRegistry {
        &CHUNK_REGISTRY
    }
}
