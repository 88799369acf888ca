// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bw64_core::errors::{invariant_error, size_error, structural_error, Result};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{ReadBytes, WriteBytes};

use hashbrown::HashSet;

use super::{ParseChunk, WriteChunk, CHNA_ID};

const UID_LEN: usize = 12;
const TRACK_REF_LEN: usize = 14;
const PACK_REF_LEN: usize = 11;

/// The encoded length of one `AudioId`: index, three identifiers and a reserved byte.
const AUDIO_ID_LEN: u64 = 2 + (UID_LEN + TRACK_REF_LEN + PACK_REF_LEN) as u64 + 1;

/// The encoded length of the `numTracks` and `numUids` header.
const HEADER_LEN: u64 = 4;

/// One entry of the track-UID table: binds a physical track to an audio track UID and the track
/// format and pack format it references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioId {
    track_index: u16,
    uid: String,
    track_ref: String,
    pack_ref: String,
}

fn check_identifier(name: &str, value: &str, width: usize) -> Result<()> {
    if !value.is_ascii() {
        return invariant_error(format!("{} '{}' is not ASCII", name, value));
    }
    if value.len() > width {
        return invariant_error(format!("{} '{}' is longer than {} bytes", name, value, width));
    }
    Ok(())
}

/// Reads a fixed-width identifier. The identifier ends at the first NUL, if any.
fn read_identifier<B: ReadBytes>(reader: &mut B, name: &str, width: usize) -> Result<String> {
    let mut field = [0u8; TRACK_REF_LEN];
    let field = &mut field[..width];
    reader.read_buf_exact(field)?;

    let len = field.iter().position(|&b| b == 0).unwrap_or(width);

    match std::str::from_utf8(&field[..len]) {
        Ok(value) if value.is_ascii() => Ok(value.to_string()),
        _ => invariant_error(format!("{} is not ASCII", name)),
    }
}

fn write_identifier<W: WriteBytes>(writer: &mut W, value: &str, width: usize) -> Result<()> {
    let mut field = [0u8; TRACK_REF_LEN];
    field[..value.len()].copy_from_slice(value.as_bytes());
    writer.write_buf(&field[..width])?;
    Ok(())
}

impl AudioId {
    /// Instantiate an entry. Identifiers must be ASCII and fit their field widths (12 bytes for
    /// `uid`, 14 for `track_ref` and 11 for `pack_ref`). Shorter identifiers are NUL-padded.
    ///
    /// A `track_index` of 0 is accepted here but cannot be encoded.
    pub fn new(track_index: u16, uid: &str, track_ref: &str, pack_ref: &str) -> Result<Self> {
        check_identifier("uid", uid, UID_LEN)?;
        check_identifier("trackRef", track_ref, TRACK_REF_LEN)?;
        check_identifier("packRef", pack_ref, PACK_REF_LEN)?;

        Ok(AudioId {
            track_index,
            uid: uid.to_string(),
            track_ref: track_ref.to_string(),
            pack_ref: pack_ref.to_string(),
        })
    }

    /// The 1-based index of the physical track in the data chunk.
    pub fn track_index(&self) -> u16 {
        self.track_index
    }

    /// The audio track UID, e.g. `ATU_00000001`.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The referenced audio track format, e.g. `AT_00031001_01`.
    pub fn track_ref(&self) -> &str {
        &self.track_ref
    }

    /// The referenced audio pack format, e.g. `AP_00031001`.
    pub fn pack_ref(&self) -> &str {
        &self.pack_ref
    }

    fn read<B: ReadBytes>(reader: &mut B) -> Result<Self> {
        let track_index = reader.read_u16()?;
        let uid = read_identifier(reader, "uid", UID_LEN)?;
        let track_ref = read_identifier(reader, "trackRef", TRACK_REF_LEN)?;
        let pack_ref = read_identifier(reader, "packRef", PACK_REF_LEN)?;
        // Reserved.
        let _ = reader.read_u8()?;

        Ok(AudioId { track_index, uid, track_ref, pack_ref })
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16(self.track_index)?;
        write_identifier(writer, &self.uid, UID_LEN)?;
        write_identifier(writer, &self.track_ref, TRACK_REF_LEN)?;
        write_identifier(writer, &self.pack_ref, PACK_REF_LEN)?;
        writer.write_u8(0)?;
        Ok(())
    }
}

/// The `chna` chunk: the track-UID table of an ADM file.
///
/// `numTracks` and `numUids` are not stored; they are derived from the entries whenever they
/// are needed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChnaChunk {
    audio_ids: Vec<AudioId>,
}

impl ChnaChunk {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_audio_ids(audio_ids: Vec<AudioId>) -> Self {
        ChnaChunk { audio_ids }
    }

    pub fn add_audio_id(&mut self, audio_id: AudioId) -> &mut Self {
        self.audio_ids.push(audio_id);
        self
    }

    /// The entries, in table order.
    pub fn audio_ids(&self) -> &[AudioId] {
        &self.audio_ids
    }

    /// The number of distinct track indices.
    pub fn num_tracks(&self) -> usize {
        self.audio_ids.iter().map(|id| id.track_index).collect::<HashSet<u16>>().len()
    }

    /// The number of entries.
    pub fn num_uids(&self) -> usize {
        self.audio_ids.len()
    }

    /// The encoded payload length.
    pub fn payload_len(&self) -> u64 {
        HEADER_LEN + AUDIO_ID_LEN * self.audio_ids.len() as u64
    }
}

impl ParseChunk for ChnaChunk {
    fn parse<B: ReadBytes>(reader: &mut B, id: FourCc, len: u64) -> Result<Self> {
        if id != CHNA_ID {
            return structural_error(format!("expected a chna chunk, found '{}'", id));
        }

        if len < HEADER_LEN || (len - HEADER_LEN) % AUDIO_ID_LEN != 0 {
            return size_error(format!("chna chunk size {} is not 4 + 40 * numUids", len));
        }

        let num_tracks = reader.read_u16()?;
        let num_uids = reader.read_u16()?;

        let slots = (len - HEADER_LEN) / AUDIO_ID_LEN;

        if u64::from(num_uids) > slots {
            return size_error(format!(
                "chna numUids is {} but the chunk only has room for {} entries",
                num_uids, slots
            ));
        }

        let mut audio_ids = Vec::with_capacity(usize::from(num_uids));

        for _ in 0..num_uids {
            audio_ids.push(AudioId::read(reader)?);
        }

        // Writers may reserve more slots than they fill. Unused slots are zeroed.
        let mut slot = [0; AUDIO_ID_LEN as usize];

        for _ in u64::from(num_uids)..slots {
            reader.read_buf_exact(&mut slot)?;

            if slot.iter().any(|&byte| byte != 0) {
                return size_error(format!(
                    "chna numUids is {} but the chunk holds more entries",
                    num_uids
                ));
            }
        }

        let chunk = ChnaChunk { audio_ids };

        if chunk.num_tracks() != usize::from(num_tracks) {
            return size_error(format!(
                "chna numTracks is {} but the entries reference {} distinct tracks",
                num_tracks,
                chunk.num_tracks()
            ));
        }

        Ok(chunk)
    }
}

impl WriteChunk for ChnaChunk {
    fn id(&self) -> FourCc {
        CHNA_ID
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        if let Some(audio_id) = self.audio_ids.iter().find(|id| id.track_index == 0) {
            return invariant_error(format!("trackIndex of '{}' must not be 0", audio_id.uid));
        }

        let Ok(num_uids) = u16::try_from(self.num_uids())
        else {
            return invariant_error("chna chunk holds more than 65535 entries");
        };

        // At most num_uids distinct tracks, so this conversion cannot fail after the one above.
        let num_tracks = self.num_tracks() as u16;

        writer.write_u16(num_tracks)?;
        writer.write_u16(num_uids)?;

        for audio_id in &self.audio_ids {
            audio_id.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bw64_core::errors::Error;
    use bw64_core::io::BufReader;

    use super::*;
    use crate::chunks::Chunk;

    fn example_chunk() -> Vec<u8> {
        let mut buf = vec![0x01, 0x00, 0x01, 0x00, 0x01, 0x00];
        buf.extend_from_slice(b"ATU_00000001");
        buf.extend_from_slice(b"AT_00031001_01");
        buf.extend_from_slice(b"AP_00031001");
        buf.push(0);
        buf
    }

    fn parse(buf: &[u8]) -> Result<ChnaChunk> {
        ChnaChunk::parse(&mut BufReader::new(buf), CHNA_ID, buf.len() as u64)
    }

    #[test]
    fn verify_parse() {
        let buf = example_chunk();
        assert_eq!(buf.len(), 44);

        let chunk = parse(&buf).unwrap();
        assert_eq!(chunk.num_tracks(), 1);
        assert_eq!(chunk.num_uids(), 1);

        let audio_id = &chunk.audio_ids()[0];
        assert_eq!(audio_id.track_index(), 1);
        assert_eq!(audio_id.uid(), "ATU_00000001");
        assert_eq!(audio_id.track_ref(), "AT_00031001_01");
        assert_eq!(audio_id.pack_ref(), "AP_00031001");
    }

    #[test]
    fn verify_round_trip_derives_counts() {
        let mut chunk = ChnaChunk::new();
        for (track, n) in [(1, 1), (1, 2), (2, 3)] {
            let uid = format!("ATU_0000000{}", n);
            let track_ref = format!("AT_0003100{}_01", n);
            let pack_ref = format!("AP_0003100{}", n);
            chunk.add_audio_id(AudioId::new(track, &uid, &track_ref, &pack_ref).unwrap());
        }

        let encoded = Chunk::Chna(chunk.clone()).encode().unwrap();
        assert_eq!(encoded.len() as u64, chunk.payload_len());
        assert_eq!(encoded.len(), 124);
        assert_eq!(&encoded[..4], &[2, 0, 3, 0]);

        let decoded = parse(&encoded).unwrap();
        assert_eq!(decoded.num_tracks(), 2);
        assert_eq!(decoded.num_uids(), 3);
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn verify_short_identifiers_are_padded() {
        let chunk = ChnaChunk::from_audio_ids(vec![AudioId::new(3, "ATU_1", "", "AP").unwrap()]);
        let encoded = Chunk::Chna(chunk.clone()).encode().unwrap();
        assert_eq!(encoded.len(), 44);
        assert_eq!(&encoded[6..12], b"ATU_1\0");
        assert_eq!(parse(&encoded).unwrap(), chunk);
    }

    #[test]
    fn verify_parse_rejects_bad_chunks() {
        let buf = example_chunk();

        let result = ChnaChunk::parse(&mut BufReader::new(&buf), FourCc::new(*b"chni"), 44);
        assert!(matches!(result, Err(Error::StructuralMismatch(_))));

        assert!(matches!(parse(&[0, 0]), Err(Error::SizeMismatch(_))));
        assert!(matches!(parse(&buf[..43]), Err(Error::SizeMismatch(_))));

        // numTracks = 2.
        let mut bad = buf.clone();
        bad[0] = 2;
        assert!(matches!(parse(&bad), Err(Error::SizeMismatch(_))));

        // numUids = 2.
        let mut bad = buf.clone();
        bad[2] = 2;
        assert!(matches!(parse(&bad), Err(Error::SizeMismatch(_))));
    }

    #[test]
    fn verify_zeroed_reserved_slots_are_skipped() {
        // One entry in a chunk reserved for 1024.
        let mut buf = example_chunk();
        buf.resize(4 + 40 * 1024, 0);

        let chunk = parse(&buf).unwrap();
        assert_eq!(chunk.num_uids(), 1);
        assert_eq!(chunk.num_tracks(), 1);
        assert_eq!(chunk.audio_ids()[0].uid(), "ATU_00000001");

        // A populated slot past numUids is an under-declared count.
        let mut bad = buf.clone();
        bad[44 + 40 * 7 + 2] = b'A';
        assert!(matches!(parse(&bad), Err(Error::SizeMismatch(_))));

        // No entries at all, every slot reserved.
        let mut empty = vec![0; 4 + 40 * 4];
        assert_eq!(parse(&empty).unwrap().num_uids(), 0);
        empty[4] = 1;
        assert!(matches!(parse(&empty), Err(Error::SizeMismatch(_))));
    }

    #[test]
    fn verify_zero_track_index_fails_to_encode() {
        let chunk = ChnaChunk::from_audio_ids(vec![
            AudioId::new(1, "ATU_00000001", "AT_00031001_01", "AP_00031001").unwrap(),
            AudioId::new(0, "ATU_00000002", "AT_00031002_01", "AP_00031002").unwrap(),
        ]);

        let mut buf = Vec::new();
        assert!(matches!(chunk.write(&mut buf), Err(Error::InvariantViolation(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn verify_identifier_validation() {
        assert!(AudioId::new(1, "ATU_000000001", "", "").is_err());
        assert!(AudioId::new(1, "", "AT_00031001_01x", "").is_err());
        assert!(AudioId::new(1, "", "", "AP_000310011").is_err());
        assert!(AudioId::new(1, "ATU_0000000é", "", "").is_err());
    }
}
