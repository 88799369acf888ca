// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{Cursor, SeekFrom};

use bw64_core::channels::Channels;
use bw64_core::errors::{invariant_error, Error, Result};
use bw64_core::io::{ReadOnlySource, SourceStream, SourceStreamOptions, WriteOnlySink};
use bw64_format::chunks::*;
use bw64_format::{Bw64Reader, ContainerBuilder, ContainerKind, WriterOptions};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_frames(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut buf = vec![0; len];
    rng.fill(&mut buf[..]);
    buf
}

fn open(buf: Vec<u8>) -> Result<Bw64Reader<'static>> {
    let stream = SourceStream::new(Box::new(Cursor::new(buf)), Default::default());
    Bw64Reader::try_new(stream, &Default::default())
}

fn chna() -> ChnaChunk {
    let mut chna = ChnaChunk::new();
    chna.add_audio_id(AudioId::new(1, "ATU_00000001", "AT_00010001_01", "AP_00010002").unwrap())
        .add_audio_id(AudioId::new(2, "ATU_00000002", "AT_00010002_01", "AP_00010002").unwrap());
    chna
}

#[test]
fn streamed_container_round_trips() {
    // 1000 stereo 24-bit frames, written in uneven batches.
    let format = FormatInfoChunk::new(2, 48000, 24, None).unwrap();
    let frames = random_frames(1000 * 6, 1);

    let mut builder = ContainerBuilder::new(format.clone());
    builder
        .add_chunk(chna())
        .unwrap()
        .add_chunk(UnknownChunk::new(AXML_ID, b"<ebuCoreMain/>".to_vec()))
        .unwrap()
        .add_trailing_chunk(UnknownChunk::new(BEXT_ID, vec![7; 5]))
        .unwrap();

    let sink = builder
        .write(Cursor::new(Vec::new()), |writer| {
            for batch in frames.chunks(6 * 333) {
                writer.write_frames(batch)?;
            }
            assert_eq!(writer.frames_written(), 1000);
            Ok(())
        })
        .unwrap();

    let buf = sink.into_inner();
    let len = buf.len() as u64;

    let mut reader = open(buf).unwrap();
    assert_eq!(reader.kind(), ContainerKind::Riff);
    assert_eq!(reader.file_size(), len - 8);
    assert_eq!(reader.format(), &format);
    assert_eq!(reader.num_frames(), 1000);
    assert_eq!(reader.chna(), Some(&chna()));
    assert!(reader.ds64().is_none());

    let ids: Vec<_> = reader.headers().iter().map(|header| header.id).collect();
    assert_eq!(ids, vec![JUNK_ID, FMT_ID, CHNA_ID, AXML_ID, DATA_ID, BEXT_ID]);

    match reader.chunk(AXML_ID) {
        Some(Chunk::Unknown(axml)) => assert_eq!(axml.data(), b"<ebuCoreMain/>"),
        other => panic!("unexpected axml chunk {:?}", other),
    }
    match reader.chunk(BEXT_ID) {
        Some(Chunk::Unknown(bext)) => assert_eq!(bext.data(), &[7; 5]),
        other => panic!("unexpected bext chunk {:?}", other),
    }

    let mut read = Vec::new();
    while let Some(batch) = reader.next_frames(256).unwrap() {
        read.extend_from_slice(&batch);
    }
    assert_eq!(read, frames);
}

#[test]
fn announced_container_round_trips_through_unseekable_streams() {
    let format = FormatInfoChunk::new(1, 44100, 16, None).unwrap();
    let frames = random_frames(2 * 4800, 2);

    let mut builder = ContainerBuilder::new(format);
    builder.add_chunk(chna()).unwrap();

    let sink = WriteOnlySink::new(Vec::new());
    let mut writer = builder.build_with_data_len(sink, frames.len() as u64).unwrap();
    assert_eq!(writer.write_frames(&frames[..4000]).unwrap(), 2000);
    assert_eq!(writer.write_frames(&frames[4000..]).unwrap(), 2800);
    let buf = writer.finalize().unwrap().into_inner();

    // No reservation is written when the sizes are known.
    assert_eq!(&buf[12..16], b"fmt ");

    let source = ReadOnlySource::new(Cursor::new(buf));
    let stream = SourceStream::new(Box::new(source), SourceStreamOptions { buffer_len: 1024 });
    let mut reader = Bw64Reader::try_new(stream, &Default::default()).unwrap();

    assert_eq!(reader.sample_rate(), 44100);
    assert_eq!(reader.channels(), 1);
    assert_eq!(reader.bit_depth(), 16);
    assert_eq!(reader.num_frames(), 4800);
    assert_eq!(reader.chna().map(ChnaChunk::num_tracks), Some(2));

    // Skip forward, then read the rest.
    assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);
    assert_eq!(reader.read_frames(4700).unwrap(), &frames[200..]);
    assert!(reader.next_frames(1).unwrap().is_none());
}

#[test]
fn odd_sized_data_chunk_is_padded() {
    // Mono 8-bit frames are a single byte each.
    let format = FormatInfoChunk::new(1, 8000, 8, None).unwrap();
    let frames = random_frames(13, 3);

    let mut builder = ContainerBuilder::new(format);
    builder.add_trailing_chunk(UnknownChunk::new(AXML_ID, b"<adm/>".to_vec())).unwrap();

    let buf = builder
        .write(Cursor::new(Vec::new()), |writer| writer.write_frames(&frames).map(|_| ()))
        .unwrap()
        .into_inner();

    assert_eq!(buf.len() % 2, 0);

    let mut reader = open(buf).unwrap();
    assert_eq!(reader.num_frames(), 13);
    assert_eq!(reader.data_header().size, 13);
    assert!(reader.has_chunk(AXML_ID));
    assert_eq!(reader.read_frames(13).unwrap(), frames);
}

#[test]
fn extensible_format_round_trips() {
    let extra = ExtensibleFormatData::new(
        20,
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        SUBTYPE_PCM,
    );
    let format = FormatInfoChunk::new(2, 96000, 24, Some(extra)).unwrap();

    let buf = ContainerBuilder::new(format.clone())
        .write(Cursor::new(Vec::new()), |writer| writer.write_frames(&[0; 12]).map(|_| ()))
        .unwrap()
        .into_inner();

    let reader = open(buf).unwrap();
    assert_eq!(reader.format_tag(), FormatTag::Extensible);
    assert_eq!(reader.format(), &format);

    let extra = reader.format().extra_data().unwrap();
    assert_eq!(extra.valid_bits_per_sample(), 20);
    assert_eq!(extra.channel_mask().count(), 2);
    assert_eq!(extra.sub_format(), SUBTYPE_PCM);
    assert!(extra.has_standard_sub_format_suffix());
}

#[test]
fn reservation_stays_junk_without_large_sizes() {
    let format = FormatInfoChunk::new(2, 48000, 16, None).unwrap();

    let buf = ContainerBuilder::new(format)
        .with_options(WriterOptions { ds64_reservation: 3 })
        .write(Cursor::new(Vec::new()), |writer| writer.write_frames(&[1; 16]).map(|_| ()))
        .unwrap()
        .into_inner();

    // WAVE, JUNK with three reserved rows, fmt and data.
    assert_eq!(buf.len(), 8 + 4 + (8 + 28 + 36) + (8 + 16) + (8 + 16));

    let reader = open(buf).unwrap();
    assert_eq!(reader.kind(), ContainerKind::Riff);
    assert_eq!(reader.headers()[0].id, JUNK_ID);
    assert_eq!(reader.headers()[0].size, 64);
    assert_eq!(reader.num_frames(), 4);
}

#[test]
fn seek_and_tell_are_clamped() {
    let format = FormatInfoChunk::new(2, 44100, 16, None).unwrap();
    let frames = random_frames(22050 * 4, 4);

    let buf = ContainerBuilder::new(format)
        .write(Cursor::new(Vec::new()), |writer| writer.write_frames(&frames).map(|_| ()))
        .unwrap()
        .into_inner();

    let mut reader = open(buf).unwrap();
    assert_eq!(reader.tell(), 0);
    assert_eq!(reader.seek(SeekFrom::Start(22060)).unwrap(), 22050);
    assert_eq!(reader.seek(SeekFrom::Current(i64::from(i32::MIN))).unwrap(), 0);
    assert_eq!(reader.seek(SeekFrom::End(-11025)).unwrap(), 11025);

    let mut buf = [0; 40];
    assert_eq!(reader.read_frames_into(&mut buf).unwrap(), 10);
    assert_eq!(&buf[..], &frames[11025 * 4..11035 * 4]);
    assert_eq!(reader.tell(), 11035);

    // Backwards seeks work on seekable sources.
    assert_eq!(reader.seek(SeekFrom::Current(-35)).unwrap(), 11000);
    assert_eq!(reader.read_frames(1).unwrap(), &frames[44000..44004]);
}

#[test]
fn frame_writer_errors_propagate() {
    let format = FormatInfoChunk::new(1, 48000, 16, None).unwrap();

    let result = ContainerBuilder::new(format)
        .write(Cursor::new(Vec::new()), |_| invariant_error("no frames available"));

    assert!(matches!(result, Err(Error::InvariantViolation(_))));
}

#[test]
fn malformed_containers_are_rejected() {
    assert!(matches!(open(Vec::new()), Err(Error::TruncatedStream(_))));

    // A container with no chunks at all.
    let empty = b"RIFF\x04\x00\x00\x00WAVE".to_vec();
    assert!(matches!(open(empty), Err(Error::StructuralMismatch(_))));

    let aiff = b"FORM\x04\x00\x00\x00AIFF".to_vec();
    assert!(matches!(open(aiff), Err(Error::StructuralMismatch(_))));
}
