// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Cursor, SeekFrom};

use bw64_core::io::SourceStream;
use bw64_format::{Bw64Reader, ReaderOptions};

/// Walks the container in `data` and, if it opens, reads and seeks through every frame.
pub fn fuzz_reader(data: Vec<u8>) {
    let stream = SourceStream::new(Box::new(Cursor::new(data)), Default::default());

    // Keep allocations bounded, whatever the input claims.
    let opts = ReaderOptions { max_chunk_len: 1 << 20, ..Default::default() };

    if let Ok(mut reader) = Bw64Reader::try_new(stream, &opts) {
        while let Ok(Some(_)) = reader.next_frames(1024) {}

        let _ = reader.seek(SeekFrom::End(-1));
        let _ = reader.seek(SeekFrom::Current(i64::MIN));
        let _ = reader.read_frames(1);
    }
}
