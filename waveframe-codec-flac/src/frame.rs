// Waveframe
// Copyright (c) 2026 The Waveframe Contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! FLAC frame header parsing per RFC 9639 §9.1, including the CRC-8 header
//! check and cross-validation against STREAMINFO.

use waveframe_core::checksum::Crc8Ccitt;
use waveframe_core::error::{Error, Result};
use waveframe_core::io::bitstream::BitstreamReader;

pub const FRAME_SYNC: u32 = 0b11_1111_1111_1110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Independent(u8),
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelAssignment {
    pub fn channel_count(self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => n,
            _ => 2,
        }
    }

    fn from_code(code: u32) -> Result<Self> {
        match code {
            0..=7 => Ok(ChannelAssignment::Independent(code as u8 + 1)),
            8 => Ok(ChannelAssignment::LeftSide),
            9 => Ok(ChannelAssignment::RightSide),
            10 => Ok(ChannelAssignment::MidSide),
            _ => Err(Error::BadFormat("reserved channel assignment code")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub variable_block_size: bool,
    pub block_size: u32,
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    pub bits_per_sample: u8,
    /// Frame number (fixed strategy) or first sample number (variable).
    pub frame_or_sample_number: u64,
    /// Number of header bytes consumed, including the CRC-8 byte, used by
    /// the caller to feed the same bytes into the frame's CRC-16 monitor.
    pub header_len: usize,
}

/// STREAMINFO values needed to resolve header fields encoded as "0 = use
/// STREAMINFO" and to cross-validate explicit fields.
#[derive(Debug, Clone, Copy)]
pub struct StreamConstraints {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub channels: u8,
}

fn decode_block_size(reader: &mut BitstreamReader, code: u32) -> Result<u32> {
    match code {
        0 => Err(Error::BadFormat("reserved block size code")),
        1 => Ok(192),
        2..=5 => Ok(576 << (code - 2)),
        6 => Ok(reader.read_bits(8)? + 1),
        7 => Ok(reader.read_bits(16)? + 1),
        8..=15 => Ok(256 << (code - 8)),
        _ => unreachable!(),
    }
}

fn decode_sample_rate(reader: &mut BitstreamReader, code: u32, constraints: &StreamConstraints) -> Result<u32> {
    Ok(match code {
        0 => constraints.sample_rate,
        1 => 88_200,
        2 => 176_400,
        3 => 192_000,
        4 => 8_000,
        5 => 16_000,
        6 => 22_050,
        7 => 24_000,
        8 => 32_000,
        9 => 44_100,
        10 => 48_000,
        11 => 96_000,
        12 => reader.read_bits(8)? * 1000,
        13 => reader.read_bits(16)?,
        14 => reader.read_bits(16)? * 10,
        _ => return Err(Error::BadFormat("reserved sample rate code")),
    })
}

fn decode_sample_size(reader: &mut BitstreamReader, code: u32, constraints: &StreamConstraints) -> Result<u8> {
    let _ = reader;
    Ok(match code {
        0 => constraints.bits_per_sample,
        1 => 8,
        2 => 12,
        4 => 16,
        5 => 20,
        6 => 24,
        7 => 32,
        _ => return Err(Error::BadFormat("reserved sample size code")),
    })
}

/// Parses a FLAC frame header. `reader` must be positioned at the 14-bit
/// sync code. Returns the header plus the raw header bytes (including the
/// trailing CRC-8 byte) so the caller can continue accumulating the
/// frame-wide CRC-16 over exactly the same bytes.
pub fn parse_frame_header(
    reader: &mut BitstreamReader,
    constraints: &StreamConstraints,
) -> Result<(FrameHeader, Vec<u8>)> {
    let bits_before = reader.bits_read();
    let sync = reader.read_bits(14)?;
    if sync != FRAME_SYNC {
        return Err(Error::Corrupted("frame sync mismatch"));
    }
    if reader.read_bit()? {
        return Err(Error::BadFormat("reserved frame header bit is set"));
    }
    let variable_block_size = reader.read_bit()?;

    let block_size_code = reader.read_bits(4)?;
    let sample_rate_code = reader.read_bits(4)?;
    let channel_code = reader.read_bits(4)?;
    let sample_size_code = reader.read_bits(3)?;
    if reader.read_bit()? {
        return Err(Error::BadFormat("reserved frame header bit is set"));
    }

    let frame_or_sample_number = reader.read_utf8_coded()?;
    let block_size = decode_block_size(reader, block_size_code)?;
    let sample_rate = decode_sample_rate(reader, sample_rate_code, constraints)?;
    let channel_assignment = ChannelAssignment::from_code(channel_code)?;
    let bits_per_sample = decode_sample_size(reader, sample_size_code, constraints)?;

    if sample_rate_code != 0 && sample_rate != constraints.sample_rate && constraints.sample_rate != 0 {
        return Err(Error::BadFormat("frame sample rate disagrees with STREAMINFO"));
    }
    if sample_size_code != 0 && bits_per_sample != constraints.bits_per_sample && constraints.bits_per_sample != 0 {
        return Err(Error::BadFormat("frame bit depth disagrees with STREAMINFO"));
    }
    if constraints.channels != 0 && channel_assignment.channel_count() != constraints.channels {
        return Err(Error::BadFormat("frame channel count disagrees with STREAMINFO"));
    }

    let crc8 = reader.read_bits(8)? as u8;
    let header_bits = reader.bits_read() - bits_before;
    if header_bits % 8 != 0 {
        return Err(Error::BadFormat("frame header did not end on a byte boundary"));
    }
    let header_len = (header_bits / 8) as usize;

    Ok((
        FrameHeader {
            variable_block_size,
            block_size,
            sample_rate,
            channel_assignment,
            bits_per_sample,
            frame_or_sample_number,
            header_len,
        },
        vec![crc8],
    ))
}

/// Validates the CRC-8 over raw header bytes (including the trailing CRC
/// byte, whose own contribution must be zero at the point it's appended –
/// callers pass the full header byte slice captured upstream).
pub fn verify_header_crc8(header_bytes: &[u8]) -> bool {
    if header_bytes.is_empty() {
        return false;
    }
    let (body, crc_byte) = header_bytes.split_at(header_bytes.len() - 1);
    let mut crc = Crc8Ccitt::new();
    crc.update_buf(body);
    crc.get() == crc_byte[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_code_1_is_192() {
        let mut reader = BitstreamReader::new();
        assert_eq!(decode_block_size(&mut reader, 1).unwrap(), 192);
    }

    #[test]
    fn block_size_code_8_series() {
        let mut reader = BitstreamReader::new();
        assert_eq!(decode_block_size(&mut reader, 8).unwrap(), 256);
        assert_eq!(decode_block_size(&mut reader, 12).unwrap(), 4096);
    }

    #[test]
    fn channel_assignment_independent_count() {
        assert_eq!(ChannelAssignment::from_code(1).unwrap().channel_count(), 2);
        assert_eq!(ChannelAssignment::from_code(8).unwrap().channel_count(), 2);
    }

    #[test]
    fn header_crc8_round_trip() {
        let body = [0xFFu8, 0xF8, 0x69, 0x18, 0x00];
        let mut crc = Crc8Ccitt::new();
        crc.update_buf(&body);
        let mut full = body.to_vec();
        full.push(crc.get());
        assert!(verify_header_crc8(&full));
        full[0] ^= 0x01;
        assert!(!verify_header_crc8(&full));
    }
}
