#![no_main]
use bw64_format::chunks::{Chunk, ChnaChunk, DataSize64Chunk, FormatInfoChunk, UnknownChunk};
use bw64_format::chunks::{CHNA_ID, DS64_ID, FMT_ID};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: Vec<u8>| {
    if data.is_empty() {
        return;
    }

    // Use the first byte to select the codec, and the rest as the payload.
    let payload = &data[1..];

    let chunk = match data[0] % 4 {
        0 => Chunk::parse_as::<FormatInfoChunk>(FMT_ID, payload),
        1 => Chunk::parse_as::<ChnaChunk>(CHNA_ID, payload),
        2 => Chunk::parse_as::<DataSize64Chunk>(DS64_ID, payload),
        _ => Chunk::parse_as::<UnknownChunk>(FMT_ID, payload),
    };

    if let Ok(chunk) = chunk {
        let _ = chunk.encode();
    }
});
