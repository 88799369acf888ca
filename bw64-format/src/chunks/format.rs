// BW64
// Copyright (c) 2024 The Project BW64 Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use bw64_core::channels::Channels;
use bw64_core::errors::{invariant_error, size_error, structural_error, Error, Result};
use bw64_core::fourcc::FourCc;
use bw64_core::io::{ReadBytes, WriteBytes};

use log::info;

use super::{ParseChunk, WriteChunk, FMT_ID};

// The definition of these format identifiers can be found in mmreg.h of the Microsoft Windows
// Platform SDK.
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// The size of the extension block following `cbSize` in an extensible format chunk.
const EXTENSION_LEN: u16 = 22;

/// The fixed tail of every `KSDATAFORMAT_SUBTYPE_*` GUID defined in ksmedia.h of the Microsoft
/// Windows Platform SDK. The first four bytes of the GUID hold the subtype code.
#[rustfmt::skip]
const KSDATAFORMAT_SUBTYPE_SUFFIX: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

/// The subtype code of `KSDATAFORMAT_SUBTYPE_PCM`.
pub const SUBTYPE_PCM: u32 = 0x0001;
/// The subtype code of `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT`.
pub const SUBTYPE_IEEE_FLOAT: u32 = 0x0003;

/// The two format tags a BW64 format chunk may carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatTag {
    /// Integer PCM, described by the 16-byte `WAVEFORMAT` layout.
    Pcm,
    /// `WAVEFORMATEXTENSIBLE`, with the 22-byte extension block.
    Extensible,
}

impl FormatTag {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            WAVE_FORMAT_PCM => Some(FormatTag::Pcm),
            WAVE_FORMAT_EXTENSIBLE => Some(FormatTag::Extensible),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            FormatTag::Pcm => WAVE_FORMAT_PCM,
            FormatTag::Extensible => WAVE_FORMAT_EXTENSIBLE,
        }
    }
}

/// The extension block of a `WAVEFORMATEXTENSIBLE` format chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensibleFormatData {
    valid_bits_per_sample: u16,
    channel_mask: Channels,
    sub_format: [u8; 16],
}

impl ExtensibleFormatData {
    /// Instantiate the extension block for the subtype `sub_format`, e.g. [`SUBTYPE_PCM`].
    pub fn new(valid_bits_per_sample: u16, channel_mask: Channels, sub_format: u32) -> Self {
        let mut guid = [0u8; 16];
        guid[..4].copy_from_slice(&sub_format.to_le_bytes());
        guid[4..].copy_from_slice(&KSDATAFORMAT_SUBTYPE_SUFFIX);

        ExtensibleFormatData { valid_bits_per_sample, channel_mask, sub_format: guid }
    }

    /// The number of bits of precision in each sample.
    pub fn valid_bits_per_sample(&self) -> u16 {
        self.valid_bits_per_sample
    }

    /// The speaker positions of the channels.
    pub fn channel_mask(&self) -> Channels {
        self.channel_mask
    }

    /// The subtype code held in the first four bytes of the subFormat GUID.
    pub fn sub_format(&self) -> u32 {
        let mut code = [0u8; 4];
        code.copy_from_slice(&self.sub_format[..4]);
        u32::from_le_bytes(code)
    }

    /// The complete subFormat GUID as stored in the stream.
    pub fn sub_format_guid(&self) -> &[u8; 16] {
        &self.sub_format
    }

    /// Returns true if the subFormat GUID ends with the standard `KSDATAFORMAT_SUBTYPE_*` tail.
    pub fn has_standard_sub_format_suffix(&self) -> bool {
        self.sub_format[4..] == KSDATAFORMAT_SUBTYPE_SUFFIX
    }

    fn read<B: ReadBytes>(reader: &mut B) -> Result<Self> {
        let valid_bits_per_sample = reader.read_u16()?;
        let channel_mask = Channels::from_bits_retain(reader.read_u32()?);

        let mut sub_format = [0u8; 16];
        reader.read_buf_exact(&mut sub_format)?;

        let data = ExtensibleFormatData { valid_bits_per_sample, channel_mask, sub_format };

        if !data.has_standard_sub_format_suffix() {
            info!("fmt subFormat {:x?} has a non-standard suffix", &data.sub_format);
        }

        Ok(data)
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16(EXTENSION_LEN)?;
        writer.write_u16(self.valid_bits_per_sample)?;
        writer.write_u32(self.channel_mask.bits())?;
        writer.write_buf(&self.sub_format)?;
        Ok(())
    }
}

/// The `fmt ` chunk: describes the sample layout of the data chunk.
///
/// The derived fields `block_alignment` and `bytes_per_second` are always consistent with the
/// channel count, sample rate and bit depth, both for constructed and for decoded values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatInfoChunk {
    format_tag: FormatTag,
    channel_count: u16,
    sample_rate: u32,
    bytes_per_second: u32,
    block_alignment: u16,
    bits_per_sample: u16,
    extra_data: Option<ExtensibleFormatData>,
}

/// `channel_count * bits_per_sample / 8`, if it fits the 16-bit field.
fn derive_block_alignment(channel_count: u16, bits_per_sample: u16) -> Option<u16> {
    u16::try_from(u32::from(channel_count) * u32::from(bits_per_sample) / 8).ok()
}

impl FormatInfoChunk {
    /// Instantiate a format chunk. The chunk is PCM if `extra_data` is `None`, and extensible
    /// otherwise.
    pub fn new(
        channel_count: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        extra_data: Option<ExtensibleFormatData>,
    ) -> Result<Self> {
        if channel_count == 0 {
            return invariant_error("channelCount must be nonzero");
        }
        if sample_rate == 0 {
            return invariant_error("sampleRate must be nonzero");
        }
        if bits_per_sample == 0 {
            return invariant_error("bitsPerSample must be nonzero");
        }

        let block_alignment =
            derive_block_alignment(channel_count, bits_per_sample).ok_or_else(|| {
                Error::InvariantViolation(
                    "channelCount and bitsPerSample would overflow blockAlignment".to_string(),
                )
            })?;

        if block_alignment == 0 {
            return invariant_error("channelCount and bitsPerSample give a zero blockAlignment");
        }

        let bytes_per_second =
            sample_rate.checked_mul(u32::from(block_alignment)).ok_or_else(|| {
                Error::InvariantViolation(
                    "sampleRate, channelCount and bitsPerSample would overflow bytesPerSecond"
                        .to_string(),
                )
            })?;

        let format_tag =
            if extra_data.is_some() { FormatTag::Extensible } else { FormatTag::Pcm };

        Ok(FormatInfoChunk {
            format_tag,
            channel_count,
            sample_rate,
            bytes_per_second,
            block_alignment,
            bits_per_sample,
            extra_data,
        })
    }

    pub fn format_tag(&self) -> FormatTag {
        self.format_tag
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    /// The length of one frame in bytes.
    pub fn block_alignment(&self) -> u16 {
        self.block_alignment
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn extra_data(&self) -> Option<&ExtensibleFormatData> {
        self.extra_data.as_ref()
    }

    /// The encoded payload length.
    pub fn payload_len(&self) -> u64 {
        if self.extra_data.is_some() {
            40
        }
        else {
            16
        }
    }
}

impl ParseChunk for FormatInfoChunk {
    fn parse<B: ReadBytes>(reader: &mut B, id: FourCc, len: u64) -> Result<Self> {
        if id != FMT_ID {
            return structural_error(format!("expected a fmt chunk, found '{}'", id));
        }

        // WAVEFORMAT, WAVEFORMATEX without extension, or WAVEFORMATEXTENSIBLE.
        if len != 16 && len != 18 && len != 40 {
            return size_error(format!("fmt chunk must be 16, 18 or 40 bytes, not {}", len));
        }

        let format_tag = reader.read_u16()?;
        let channel_count = reader.read_u16()?;
        let sample_rate = reader.read_u32()?;
        let bytes_per_second = reader.read_u32()?;
        let block_alignment = reader.read_u16()?;
        let bits_per_sample = reader.read_u16()?;

        let cb_size = if len > 16 { Some(reader.read_u16()?) } else { None };
        let extra_data = if len == 40 { Some(ExtensibleFormatData::read(reader)?) } else { None };

        let Some(format_tag) = FormatTag::from_code(format_tag)
        else {
            return invariant_error(format!(
                "formatTag must be PCM (0x0001) or extensible (0xfffe), not {:#06x}",
                format_tag
            ));
        };

        if channel_count == 0 {
            return invariant_error("channelCount must be nonzero");
        }
        if sample_rate == 0 {
            return invariant_error("sampleRate must be nonzero");
        }
        if bits_per_sample == 0 {
            return invariant_error("bitsPerSample must be nonzero");
        }

        let expected_bytes_per_second = u64::from(sample_rate) * u64::from(block_alignment);

        if u64::from(bytes_per_second) != expected_bytes_per_second {
            return invariant_error(format!(
                "bytesPerSecond is {} but sampleRate * blockAlignment is {}",
                bytes_per_second, expected_bytes_per_second
            ));
        }

        let expected_block_alignment = u32::from(channel_count) * u32::from(bits_per_sample) / 8;

        if u32::from(block_alignment) != expected_block_alignment {
            return invariant_error(format!(
                "blockAlignment is {} but channelCount * bitsPerSample / 8 is {}",
                block_alignment, expected_block_alignment
            ));
        }

        if block_alignment == 0 {
            return invariant_error("blockAlignment must be nonzero");
        }

        match (len, cb_size) {
            (18, Some(cb_size)) if cb_size != 0 => {
                return size_error(format!("cbSize is {} in an 18 byte fmt chunk", cb_size));
            }
            (40, Some(cb_size)) if cb_size != EXTENSION_LEN => {
                return size_error(format!("cbSize is {} in a 40 byte fmt chunk", cb_size));
            }
            _ => (),
        }

        match (format_tag, &extra_data) {
            (FormatTag::Pcm, Some(_)) => {
                return size_error("PCM fmt chunk must not carry the 22 byte extension");
            }
            (FormatTag::Extensible, None) => {
                return size_error("extensible fmt chunk is missing the 22 byte extension");
            }
            _ => (),
        }

        Ok(FormatInfoChunk {
            format_tag,
            channel_count,
            sample_rate,
            bytes_per_second,
            block_alignment,
            bits_per_sample,
            extra_data,
        })
    }
}

impl WriteChunk for FormatInfoChunk {
    fn id(&self) -> FourCc {
        FMT_ID
    }

    fn write<W: WriteBytes>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16(self.format_tag.code())?;
        writer.write_u16(self.channel_count)?;
        writer.write_u32(self.sample_rate)?;
        writer.write_u32(self.bytes_per_second)?;
        writer.write_u16(self.block_alignment)?;
        writer.write_u16(self.bits_per_sample)?;

        if let Some(extra_data) = &self.extra_data {
            extra_data.write(writer)?;
        }

        Ok(())
    }
}

impl fmt::Display for FormatInfoChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FormatInfoChunk {{")?;
        writeln!(f, "\tformat_tag: {:#06x},", self.format_tag.code())?;
        writeln!(f, "\tchannel_count: {},", self.channel_count)?;
        writeln!(f, "\tsample_rate: {} Hz,", self.sample_rate)?;
        writeln!(f, "\tbytes_per_second: {},", self.bytes_per_second)?;
        writeln!(f, "\tblock_alignment: {},", self.block_alignment)?;
        writeln!(f, "\tbits_per_sample: {},", self.bits_per_sample)?;

        if let Some(ext) = &self.extra_data {
            writeln!(f, "\textra_data: {{")?;
            writeln!(f, "\t\tvalid_bits_per_sample: {},", ext.valid_bits_per_sample)?;
            writeln!(f, "\t\tchannel_mask: {},", ext.channel_mask)?;
            writeln!(f, "\t\tsub_format: {:#x},", ext.sub_format())?;
            writeln!(f, "\t}}")?;
        }

        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use bw64_core::channels::Channels;
    use bw64_core::errors::Error;

    use super::*;
    use crate::chunks::Chunk;

    #[rustfmt::skip]
    const PCM_MONO_16: [u8; 16] = [
        0x01, 0x00, 0x01, 0x00, // formatTag = 1, channelCount = 1
        0x80, 0xbb, 0x00, 0x00, // sampleRate = 48000
        0x00, 0x77, 0x01, 0x00, // bytesPerSecond = 96000
        0x02, 0x00, 0x10, 0x00, // blockAlignment = 2, bitsPerSample = 16
    ];

    #[rustfmt::skip]
    const EXTENSIBLE_MONO_16: [u8; 40] = [
        0xfe, 0xff, 0x01, 0x00, // formatTag = 0xfffe, channelCount = 1
        0x80, 0xbb, 0x00, 0x00, // sampleRate = 48000
        0x00, 0x77, 0x01, 0x00, // bytesPerSecond = 96000
        0x02, 0x00, 0x10, 0x00, // blockAlignment = 2, bitsPerSample = 16
        0x16, 0x00, 0x10, 0x00, // cbSize = 22, validBitsPerSample = 16
        0x04, 0x00, 0x00, 0x00, // channelMask = FRONT_CENTER
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00,
        0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
    ];

    fn parse(buf: &[u8]) -> Result<FormatInfoChunk> {
        let mut reader = bw64_core::io::BufReader::new(buf);
        FormatInfoChunk::parse(&mut reader, FMT_ID, buf.len() as u64)
    }

    fn with_bytes(offset: usize, bytes: &[u8]) -> Vec<u8> {
        let mut buf = PCM_MONO_16.to_vec();
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        buf
    }

    fn invariant_message(err: Error) -> String {
        match err {
            Error::InvariantViolation(msg) => msg,
            other => panic!("expected an invariant violation, got {:?}", other),
        }
    }

    #[test]
    fn verify_parse_pcm() {
        let chunk = parse(&PCM_MONO_16).unwrap();
        assert_eq!(chunk.format_tag(), FormatTag::Pcm);
        assert_eq!(chunk.channel_count(), 1);
        assert_eq!(chunk.sample_rate(), 48000);
        assert_eq!(chunk.bytes_per_second(), 96000);
        assert_eq!(chunk.block_alignment(), 2);
        assert_eq!(chunk.bits_per_sample(), 16);
        assert!(chunk.extra_data().is_none());
    }

    #[test]
    fn verify_parse_rejects_bad_fields() {
        // Size outside of {16, 18, 40}.
        let mut buf = PCM_MONO_16.to_vec();
        buf.extend_from_slice(&[0; 4]);
        assert!(matches!(parse(&buf), Err(Error::SizeMismatch(_))));

        // formatTag = 2.
        assert!(matches!(parse(&with_bytes(0, &[2, 0])), Err(Error::InvariantViolation(_))));
        // channelCount = 0.
        assert!(matches!(parse(&with_bytes(2, &[0, 0])), Err(Error::InvariantViolation(_))));
        // sampleRate = 0.
        assert!(matches!(parse(&with_bytes(4, &[0; 4])), Err(Error::InvariantViolation(_))));
        // bytesPerSecond = 96001.
        let err = parse(&with_bytes(8, &[0x01, 0x77, 0x01, 0x00])).unwrap_err();
        assert!(invariant_message(err).contains("bytesPerSecond"));
        // blockAlignment = 4, with bytesPerSecond consistent with it.
        let mut buf = with_bytes(12, &[4, 0]);
        buf[8..12].copy_from_slice(&192000u32.to_le_bytes());
        let err = parse(&buf).unwrap_err();
        assert!(invariant_message(err).contains("blockAlignment"));
    }

    #[test]
    fn verify_parse_cb_size() {
        let mut buf = PCM_MONO_16.to_vec();
        buf.extend_from_slice(&[0, 0]);
        let chunk = parse(&buf).unwrap();
        assert!(chunk.extra_data().is_none());

        // cbSize = 22 does not fit an 18 byte chunk.
        buf[16] = 22;
        assert!(matches!(parse(&buf), Err(Error::SizeMismatch(_))));
    }

    #[test]
    fn verify_parse_extensible_round_trip() {
        let chunk = parse(&EXTENSIBLE_MONO_16).unwrap();
        assert_eq!(chunk.format_tag(), FormatTag::Extensible);

        let extra = chunk.extra_data().unwrap();
        assert_eq!(extra.valid_bits_per_sample(), 16);
        assert_eq!(extra.channel_mask(), Channels::FRONT_CENTER);
        assert_eq!(extra.sub_format(), SUBTYPE_PCM);
        assert!(extra.has_standard_sub_format_suffix());

        let encoded = Chunk::Format(chunk).encode().unwrap();
        assert_eq!(&encoded[..], &EXTENSIBLE_MONO_16[..]);
    }

    #[test]
    fn verify_parse_rejects_pcm_with_extension() {
        let mut buf = EXTENSIBLE_MONO_16;
        buf[0] = 0x01;
        buf[1] = 0x00;
        assert!(matches!(parse(&buf), Err(Error::SizeMismatch(_))));
    }

    #[test]
    fn verify_parse_truncated() {
        let mut reader = bw64_core::io::BufReader::new(&PCM_MONO_16[..10]);
        let result = FormatInfoChunk::parse(&mut reader, FMT_ID, 16);
        assert!(matches!(result, Err(Error::TruncatedStream(_))));
    }

    #[test]
    fn verify_new_round_trip() {
        for &(channels, rate, bits) in &[(1, 48000, 16), (2, 48000, 24), (64, 96000, 32)] {
            let chunk = FormatInfoChunk::new(channels, rate, bits, None).unwrap();
            let encoded = Chunk::Format(chunk.clone()).encode().unwrap();
            assert_eq!(encoded.len(), 16);
            assert_eq!(parse(&encoded).unwrap(), chunk);
        }

        let extra = ExtensibleFormatData::new(24, Channels::FRONT_LEFT | Channels::FRONT_RIGHT, 1);
        let chunk = FormatInfoChunk::new(2, 44100, 24, Some(extra)).unwrap();
        assert_eq!(chunk.block_alignment(), 6);
        assert_eq!(chunk.bytes_per_second(), 264600);
        let encoded = Chunk::Format(chunk.clone()).encode().unwrap();
        assert_eq!(encoded.len(), 40);
        assert_eq!(parse(&encoded).unwrap(), chunk);
    }

    #[test]
    fn verify_new_reports_overflowing_field() {
        // 0xffff * 16 / 8 = 131070.
        let err = FormatInfoChunk::new(0xffff, 48000, 16, None).unwrap_err();
        assert_eq!(
            invariant_message(err),
            "channelCount and bitsPerSample would overflow blockAlignment"
        );

        let err = FormatInfoChunk::new(0xffff, 48000, 24, None).unwrap_err();
        assert_eq!(
            invariant_message(err),
            "channelCount and bitsPerSample would overflow blockAlignment"
        );

        let err = FormatInfoChunk::new(0x1000, 0xffff_ffff, 16, None).unwrap_err();
        assert_eq!(
            invariant_message(err),
            "sampleRate, channelCount and bitsPerSample would overflow bytesPerSecond"
        );

        assert!(FormatInfoChunk::new(0, 48000, 16, None).is_err());
        assert!(FormatInfoChunk::new(1, 0, 16, None).is_err());
        assert!(FormatInfoChunk::new(1, 48000, 0, None).is_err());
    }
}
