// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::SeekFrom;

use bw64_core::errors::{invariant_error, Error, Result};

/// A frame-addressable cursor over the byte range of a data chunk.
///
/// The cursor holds no sample data. It converts between frame indices and absolute byte
/// positions, and keeps every position within `[0, num_frames]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameCursor {
    data_start: u64,
    data_len: u64,
    frame_len: u64,
    frame: u64,
}

impl FrameCursor {
    /// Instantiate a cursor over `data_len` bytes starting at the absolute position `data_start`.
    pub fn new(data_start: u64, data_len: u64, frame_len: u16) -> Result<Self> {
        if frame_len == 0 {
            return invariant_error("frame length must be nonzero");
        }

        Ok(FrameCursor { data_start, data_len, frame_len: u64::from(frame_len), frame: 0 })
    }

    /// The length of one frame in bytes.
    pub fn frame_len(&self) -> u64 {
        self.frame_len
    }

    /// The number of whole frames in the data chunk. A trailing partial frame is not counted.
    pub fn num_frames(&self) -> u64 {
        self.data_len / self.frame_len
    }

    /// The index of the next frame.
    pub fn tell(&self) -> u64 {
        self.frame
    }

    /// The number of frames after the cursor.
    pub fn remaining(&self) -> u64 {
        self.num_frames() - self.frame
    }

    /// The absolute byte position of the frame `frame`.
    pub fn byte_pos(&self, frame: u64) -> u64 {
        // frame <= num_frames, so the product is at most data_len.
        self.data_start + frame * self.frame_len
    }

    /// The byte length of `count` frames, if the cursor can advance over them.
    pub fn byte_len(&self, count: u64) -> Result<u64> {
        if count > self.remaining() {
            return Err(Error::TruncatedStream(format!(
                "{} frames requested but only {} remain in the data chunk",
                count,
                self.remaining()
            )));
        }

        Ok(count * self.frame_len)
    }

    /// Moves the cursor forward by `count` frames, which must not exceed `remaining()`.
    pub fn advance(&mut self, count: u64) {
        debug_assert!(count <= self.remaining());
        self.frame += count;
    }

    /// Resolves a seek in frames to a target frame, clamped to `[0, num_frames]`.
    pub fn resolve(&self, pos: SeekFrom) -> u64 {
        let num_frames = self.num_frames();

        let target = match pos {
            SeekFrom::Start(frame) => return frame.min(num_frames),
            SeekFrom::Current(delta) => i128::from(self.frame) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(num_frames) + i128::from(delta),
        };

        target.clamp(0, i128::from(num_frames)) as u64
    }

    /// Sets the cursor to `frame`, clamped to `num_frames`.
    pub fn set(&mut self, frame: u64) {
        self.frame = frame.min(self.num_frames());
    }
}
